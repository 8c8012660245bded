//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while wiring the fetch-spec registry at startup.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("unknown entity type: '{0}'")]
    UnknownEntityType(String),
    #[error("relation '{relation}' on '{entity}' targets unknown entity type '{target}'")]
    UnknownRelationTarget {
        entity: String,
        relation: String,
        target: String,
    },
    #[error("duplicate field '{field}' on '{entity}'")]
    DuplicateField { entity: String, field: String },
    #[error("duplicate entity type '{0}'")]
    DuplicateEntityType(String),
}

/// Errors raised during view compilation or path resolution. These indicate a
/// mismatch between an endpoint's declared view and the entity's fetch spec,
/// never bad user input.
#[derive(Error, Debug)]
pub enum ViewError {
    #[error("view references unknown field '{field}' (view: {view})")]
    InvalidViewField { field: String, view: String },
    #[error("invalid path '{path}': {reason} at '{at}'")]
    InvalidPath {
        path: String,
        reason: &'static str,
        at: String,
    },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    View(#[from] ViewError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            // A spec or view error is a defect in an endpoint's declared view,
            // not user input to validate.
            AppError::Spec(_) => (StatusCode::INTERNAL_SERVER_ERROR, "spec_error"),
            AppError::View(_) => (StatusCode::INTERNAL_SERVER_ERROR, "view_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
