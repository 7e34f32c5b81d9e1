// src/lib.rs

pub mod error;
pub mod hash;
pub mod routing;
pub mod storage;
pub mod metadata;
pub mod service;
pub mod client;
pub mod api;
pub mod app_state;
pub mod config;

pub use error::{Result, StoreError};
