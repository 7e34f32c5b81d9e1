//! HTTP bindings for the block and metadata services.

pub mod block_api;
pub mod metadata_api;
