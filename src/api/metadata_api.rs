//! Metadata service HTTP endpoints
//!
//! Protocol outcomes, including version conflicts and missing blocks, are
//! answered with 200 and a tagged JSON body. Non-2xx statuses mean a
//! `StoreError`.

use actix_web::{get, post, web, HttpResponse};

use crate::app_state::MetadataAppState;
use crate::error::StoreError;
use crate::metadata::{AffinityResponse, CommitRequest, DeleteRequest};

#[get("/files")]
pub async fn list_files(state: web::Data<MetadataAppState>) -> Result<HttpResponse, StoreError> {
    let files = state.service.list_files().await?;
    Ok(HttpResponse::Ok().json(files))
}

#[get("/files/{filename}")]
pub async fn read_file(path: web::Path<String>, state: web::Data<MetadataAppState>) -> Result<HttpResponse, StoreError> {
    let filename = path.into_inner();
    log_mdc::insert("file", &filename);
    let version = state.service.read(&filename).await?;
    Ok(HttpResponse::Ok().json(version))
}

#[post("/files/{filename}/commit")]
pub async fn commit_file(
    path: web::Path<String>,
    request: web::Json<CommitRequest>,
    state: web::Data<MetadataAppState>,
) -> Result<HttpResponse, StoreError> {
    let filename = path.into_inner();
    log_mdc::insert("file", &filename);
    let CommitRequest { version, hash_list, shard_hint } = request.into_inner();
    let outcome = state.service.commit(&filename, version, hash_list, shard_hint).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[post("/files/{filename}/delete")]
pub async fn delete_file(
    path: web::Path<String>,
    request: web::Json<DeleteRequest>,
    state: web::Data<MetadataAppState>,
) -> Result<HttpResponse, StoreError> {
    let filename = path.into_inner();
    log_mdc::insert("file", &filename);
    let outcome = state.service.delete(&filename, request.version).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[get("/files/{filename}/affinity")]
pub async fn affinity_shard(path: web::Path<String>, state: web::Data<MetadataAppState>) -> Result<HttpResponse, StoreError> {
    let filename = path.into_inner();
    let shard = state.service.affinity_shard(&filename).await?;
    Ok(HttpResponse::Ok().json(AffinityResponse { shard }))
}

/// Register the metadata service routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_files)
        .service(read_file)
        .service(commit_file)
        .service(delete_file)
        .service(affinity_shard);
}
