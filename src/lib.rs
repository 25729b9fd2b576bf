//! Document upload and metadata service.
//!
//! An axum service that issues presigned upload URLs, stores uploaded
//! objects, and appends document metadata to a shared JSON catalogue,
//! plus the client-side uploader that drives the whole flow.

pub mod client;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
