//! Generic collection handlers. Each route carries its [`Entity`] as an
//! `Extension`, so one set of handlers serves every collection.

use crate::constants;
use crate::error::{ApiError, FieldErrors, Result, NON_FIELD_ERRORS};
use crate::metrics::{record_error, record_request};
use crate::ordering::parse_ordering;
use crate::schema::{Entity, ENTITIES};
use crate::server::AppState;
use crate::storage::{ListQuery, Record};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub ordering: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

fn parse_count(name: &str, raw: Option<&str>) -> Result<Option<u32>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s.parse().map(Some).map_err(|_| {
            ApiError::BadRequest(format!("{name} must be a non-negative integer, got '{s}'"))
        }),
    }
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.trim().parse().map_err(|_| ApiError::NotFound)
}

fn parse_body(body: &Bytes) -> Result<Map<String, Value>> {
    if body.is_empty() {
        return Ok(Map::new());
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("JSON parse error - {e}")))?;
    match value {
        Value::Object(map) => Ok(map),
        other => {
            let kind = match other {
                Value::Array(_) => "list",
                Value::String(_) => "str",
                Value::Number(_) => "number",
                Value::Bool(_) => "bool",
                _ => "null",
            };
            let mut errors = FieldErrors::new();
            errors.add(
                NON_FIELD_ERRORS,
                format!("Invalid data. Expected a dictionary, but got {kind}."),
            );
            Err(ApiError::Validation(errors))
        }
    }
}

/// Count failures per collection before handing the error to axum.
fn tally<T>(entity: &'static Entity, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        record_error(entity.name, e.status().as_u16());
    }
    result
}

pub async fn list(
    State(state): State<AppState>,
    Extension(entity): Extension<&'static Entity>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Record>>> {
    record_request(entity.name, "list");
    let result = async {
        let query = ListQuery {
            ordering: parse_ordering(entity, params.ordering.as_deref()),
            limit: parse_count("limit", params.limit.as_deref())?,
            offset: parse_count("offset", params.offset.as_deref())?,
        };
        debug!(entity = entity.name, ?query, "listing");
        state.storage.list(entity, &query).await
    }
    .await;
    tally(entity, result).map(Json)
}

pub async fn create(
    State(state): State<AppState>,
    Extension(entity): Extension<&'static Entity>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    record_request(entity.name, "create");
    let result = async {
        let payload = parse_body(&body)?;
        state.storage.create(entity, &payload).await
    }
    .await;
    let record = tally(entity, result)?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn retrieve(
    State(state): State<AppState>,
    Extension(entity): Extension<&'static Entity>,
    Path(id): Path<String>,
) -> Result<Json<Record>> {
    record_request(entity.name, "retrieve");
    let result = async {
        let id = parse_id(&id)?;
        state.storage.get(entity, id).await?.ok_or(ApiError::NotFound)
    }
    .await;
    tally(entity, result).map(Json)
}

async fn write(
    state: AppState,
    entity: &'static Entity,
    id: String,
    body: Bytes,
    partial: bool,
) -> Result<Json<Record>> {
    record_request(entity.name, if partial { "partial_update" } else { "update" });
    let result = async {
        let id = parse_id(&id)?;
        let payload = parse_body(&body)?;
        state.storage.update(entity, id, &payload, partial).await
    }
    .await;
    tally(entity, result).map(Json)
}

pub async fn update(
    State(state): State<AppState>,
    Extension(entity): Extension<&'static Entity>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Record>> {
    write(state, entity, id, body, false).await
}

pub async fn partial_update(
    State(state): State<AppState>,
    Extension(entity): Extension<&'static Entity>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Record>> {
    write(state, entity, id, body, true).await
}

pub async fn destroy(
    State(state): State<AppState>,
    Extension(entity): Extension<&'static Entity>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    record_request(entity.name, "destroy");
    let result = async {
        let id = parse_id(&id)?;
        state.storage.delete(entity, id).await
    }
    .await;
    tally(entity, result).map(|_| StatusCode::NO_CONTENT)
}

/// `GET /sale/api/`: every collection and its URL.
pub async fn api_root(headers: HeaderMap) -> Json<Map<String, Value>> {
    let base = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|host| format!("http://{host}"))
        .unwrap_or_default();
    let mut root = Map::new();
    for entity in ENTITIES {
        root.insert(
            entity.name.to_string(),
            Value::String(format!("{base}{}", constants::collection_path(entity.name))),
        );
    }
    Json(root)
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "sale-backend",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_must_be_non_negative_integers() {
        assert_eq!(parse_count("limit", None).unwrap(), None);
        assert_eq!(parse_count("limit", Some("")).unwrap(), None);
        assert_eq!(parse_count("limit", Some("10")).unwrap(), Some(10));
        assert!(matches!(
            parse_count("limit", Some("-1")),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn non_numeric_ids_are_not_found() {
        assert!(matches!(parse_id("abc"), Err(ApiError::NotFound)));
        assert_eq!(parse_id("42").unwrap(), 42);
    }

    #[test]
    fn body_must_be_an_object() {
        assert!(parse_body(&Bytes::new()).unwrap().is_empty());
        assert!(matches!(
            parse_body(&Bytes::from_static(b"{oops")),
            Err(ApiError::BadRequest(_))
        ));
        match parse_body(&Bytes::from_static(b"[1]")) {
            Err(ApiError::Validation(errors)) => assert_eq!(
                errors.get(NON_FIELD_ERRORS).unwrap()[0],
                "Invalid data. Expected a dictionary, but got list."
            ),
            other => panic!("unexpected {other:?}"),
        }
    }
}
