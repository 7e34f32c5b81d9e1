//! Block service HTTP endpoints

use actix_web::{get, head, put, web, HttpResponse};
use log::debug;

use crate::app_state::BlockAppState;
use crate::error::StoreError;
use crate::hash::ContentHash;

fn parse_hash(raw: String) -> Result<ContentHash, StoreError> {
    let hash: ContentHash = raw.parse()?;
    log_mdc::insert("hash", hash.short());
    Ok(hash)
}

#[put("/blocks/{hash}")]
pub async fn store_block(
    path: web::Path<String>,
    body: web::Bytes,
    state: web::Data<BlockAppState>,
) -> Result<HttpResponse, StoreError> {
    let hash = parse_hash(path.into_inner())?;
    debug!("Store block {} ({} bytes)", hash.short(), body.len());
    state.store.store(&hash, body).await?;
    Ok(HttpResponse::Ok().finish())
}

#[get("/blocks/{hash}")]
pub async fn get_block(path: web::Path<String>, state: web::Data<BlockAppState>) -> Result<HttpResponse, StoreError> {
    let hash = parse_hash(path.into_inner())?;
    let bytes = state.store.get(&hash).await?;
    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .body(bytes))
}

#[head("/blocks/{hash}")]
pub async fn has_block(path: web::Path<String>, state: web::Data<BlockAppState>) -> Result<HttpResponse, StoreError> {
    let hash = parse_hash(path.into_inner())?;
    if state.store.has(&hash).await? {
        Ok(HttpResponse::Ok().finish())
    } else {
        Ok(HttpResponse::NotFound().finish())
    }
}

/// Register the block service routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(store_block).service(get_block).service(has_block);
}
