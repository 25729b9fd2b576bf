pub mod issuer;
pub mod metadata_store;
pub mod presign;
pub mod recorder;
pub mod storage_service;
