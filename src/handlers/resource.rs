//! Resource CRUD handlers: list, create, read, update, delete.

use crate::config::{Operation, ResolvedResource};
use crate::error::AppError;
use crate::response::{success_created, success_data, success_message, success_updated};
use crate::service::{CrudService, RequestValidator};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{Map, Value};

fn resource<'a>(state: &'a AppState, path_segment: &str) -> Result<&'a ResolvedResource, AppError> {
    state.model.resource_by_path(path_segment).ok_or(AppError::RouteNotFound)
}

fn parse_id(resource: &ResolvedResource, id_str: &str) -> Result<Value, AppError> {
    resource
        .id_strategy
        .parse_id(id_str)
        .ok_or_else(|| AppError::BadRequest("invalid id".into()))
}

fn body_to_map(body: Result<Json<Value>, JsonRejection>) -> Result<Map<String, Value>, AppError> {
    let Json(value) = body.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::BadRequest(e.body_text())
        }
    })?;
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

pub async fn list(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    let rows = CrudService::new(state.store.as_ref(), &state.model, resource)
        .list()
        .await
        .map_err(|e| e.context(format!("Error fetching {}", resource.plural_name)))?;
    Ok(success_data(rows))
}

pub async fn create(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    let body = body_to_map(body)?;
    let fields = RequestValidator::validate(&body, resource.rules(Operation::Create))?;
    let row = CrudService::new(state.store.as_ref(), &state.model, resource)
        .create(fields)
        .await
        .map_err(|e| e.context(format!("Error creating {}", resource.display_name)))?;
    Ok(success_created(format!("{} created successfully", resource.display_name), row))
}

pub async fn read(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    let id = parse_id(resource, &id_str)?;
    let row = CrudService::new(state.store.as_ref(), &state.model, resource)
        .read(&id)
        .await
        .map_err(|e| e.context(format!("Error fetching {}", resource.display_name)))?;
    Ok(success_data(row))
}

pub async fn update(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    let id = parse_id(resource, &id_str)?;
    let body = body_to_map(body)?;
    let fields = RequestValidator::validate(&body, resource.rules(Operation::Update))?;
    let row = CrudService::new(state.store.as_ref(), &state.model, resource)
        .update(&id, fields)
        .await
        .map_err(|e| e.context(format!("Error updating {}", resource.display_name)))?;
    Ok(success_updated(format!("{} updated successfully", resource.display_name), row))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    let id = parse_id(resource, &id_str)?;
    CrudService::new(state.store.as_ref(), &state.model, resource)
        .delete(&id)
        .await
        .map_err(|e| e.context(format!("Error deleting {}", resource.display_name)))?;
    Ok(success_message(format!("{} deleted successfully", resource.display_name)))
}

/// Any path no route matched.
pub async fn not_found() -> AppError {
    AppError::RouteNotFound
}
