//! API handlers for the Vigil server.
//!
//! Listing endpoints accept the query parameters `owner`, `p`, `pageSize`,
//! `field`, `value`, `sortField` and `sortOrder` and hand them, unvalidated,
//! to a [`vigil_db::QuerySession`]; the session drops anything it cannot
//! apply safely.

use crate::AppState;
use axum::{
    extract::{Extension, Json, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use vigil_db::{DbError, Entity, QuerySpec, NO_PAGINATION};
use vigil_types::Record;

/// Query parameters shared by the listing endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Exact owner to match.
    pub owner: Option<String>,
    /// 1-based page number.
    pub p: Option<String>,
    /// Rows per page.
    pub page_size: Option<String>,
    /// Field to substring-match.
    pub field: Option<String>,
    /// Substring to look for.
    pub value: Option<String>,
    /// Field to sort by.
    pub sort_field: Option<String>,
    /// `ascend` or `descend`.
    pub sort_order: Option<String>,
}

impl ListQuery {
    /// Converts the request into a query spec.
    ///
    /// Paging applies only when both `p` and `pageSize` are positive.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::BadRequest` if either paging value is not an integer.
    pub fn to_spec(&self) -> Result<QuerySpec, ApiError> {
        let page = parse_paging("p", self.p.as_deref())?;
        let page_size = parse_paging("pageSize", self.page_size.as_deref())?;

        let (offset, limit) = match (page, page_size) {
            (Some(page), Some(size)) if page > 0 && size > 0 => (
                (page - 1).saturating_mul(size),
                size,
            ),
            _ => (NO_PAGINATION, NO_PAGINATION),
        };

        Ok(QuerySpec {
            owner: self.owner.clone().unwrap_or_default(),
            offset,
            limit,
            field: self.field.clone().unwrap_or_default(),
            value: self.value.clone().unwrap_or_default(),
            sort_field: self.sort_field.clone().unwrap_or_default(),
            sort_order: self.sort_order.clone().unwrap_or_default(),
        })
    }
}

fn parse_paging(name: &str, raw: Option<&str>) -> Result<Option<i64>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("invalid {name}: {s}"))),
        None => Ok(None),
    }
}

/// Response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// `ok` or `error`.
    pub status: String,
    /// Human-readable message; empty on success.
    pub msg: String,
    /// Payload.
    pub data: T,
    /// Total matching rows, present on paged listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data2: Option<i64>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            status: "ok".to_string(),
            msg: String::new(),
            data,
            data2: None,
        }
    }
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        if err.is_unique_violation() {
            return ApiError::Conflict("an entry with this owner and name already exists".into());
        }
        tracing::error!("database request failed: {}", err);
        ApiError::InternalServerError("database error".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "status": "error",
            "msg": message
        }));

        (status, body).into_response()
    }
}

/// Handler for the `GET /api/get-*` listing endpoints.
///
/// Returns every matching row, or one page plus the total in `data2` when
/// paging parameters are given.
pub async fn list_handler<E>(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<E>>>, ApiError>
where
    E: Entity + Serialize,
{
    let spec = params.to_spec()?;
    let session = state.db.session::<E>(&spec);

    let rows = session.fetch().await?;
    let mut response = ApiResponse::ok(rows);
    if session.plan().page().is_some() {
        response.data2 = Some(session.count().await?);
    }
    Ok(Json(response))
}

/// Handler for `POST /api/add-record`.
pub async fn add_record_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(mut record): Json<Record>,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    if record.owner.is_empty() || record.name.is_empty() {
        return Err(ApiError::BadRequest("owner and name are required".into()));
    }
    if record.created_time.is_empty() {
        record.created_time = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    }

    state.db.insert(&record).await?;
    tracing::debug!(owner = %record.owner, name = %record.name, "added record");
    Ok(Json(ApiResponse::ok("Affected".to_string())))
}
