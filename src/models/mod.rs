//! Core data models.
//!
//! `bucket` and `object` map to SQLite tables via `sqlx::FromRow`;
//! `document` and `upload` are the JSON shapes exchanged with clients.

pub mod bucket;
pub mod document;
pub mod object;
pub mod upload;
