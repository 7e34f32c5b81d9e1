//! Service layer: protocol logic sitting between the HTTP handlers and the
//! storage/metadata backends.

pub mod metadata_service;
