use std::io::Cursor;

use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use serde_json::json;
use thiserror::Error;

use crate::mdx::CompileError;

/// Error taxonomy for every JSON endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Conflict { field: &'static str, message: String },

    #[error("Authentication required")]
    Unauthorized,

    #[error("You do not have permission to do that")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Too many requests. Please try again later.")]
    RateLimited,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::Validation(_) | ApiError::Conflict { .. } => Status::BadRequest,
            ApiError::Unauthorized => Status::Unauthorized,
            ApiError::Forbidden => Status::Forbidden,
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::MethodNotAllowed => Status::MethodNotAllowed,
            ApiError::RateLimited => Status::TooManyRequests,
            ApiError::Internal(_) => Status::InternalServerError,
        }
    }

    pub fn body(&self) -> serde_json::Value {
        match self {
            ApiError::Conflict { field, message } => {
                json!({"success": false, "error": message, "field": field})
            }
            // Internal detail stays in the log.
            ApiError::Internal(_) => {
                json!({"success": false, "error": "Internal server error"})
            }
            other => json!({"success": false, "error": other.to_string()}),
        }
    }
}

impl From<String> for ApiError {
    fn from(e: String) -> Self {
        ApiError::Internal(e)
    }
}

impl From<CompileError> for ApiError {
    fn from(e: CompileError) -> Self {
        ApiError::Internal(format!("MDX compile failed: {}", e))
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        if let ApiError::Internal(ref detail) = self {
            log::error!("{} {}: {}", req.method(), req.uri(), detail);
        }
        let body = self.body().to_string();
        Response::build()
            .status(self.status())
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

// ── JSON catchers for /api ──

fn catcher_body(status: Status, message: &str) -> (Status, rocket::serde::json::Value) {
    (status, json!({"success": false, "error": message}))
}

#[catch(400)]
pub fn bad_request() -> (Status, rocket::serde::json::Value) {
    catcher_body(Status::BadRequest, "Malformed request")
}

#[catch(401)]
pub fn unauthorized() -> (Status, rocket::serde::json::Value) {
    catcher_body(Status::Unauthorized, "Authentication required")
}

#[catch(403)]
pub fn forbidden() -> (Status, rocket::serde::json::Value) {
    catcher_body(Status::Forbidden, "You do not have permission to do that")
}

#[catch(404)]
pub fn not_found() -> (Status, rocket::serde::json::Value) {
    catcher_body(Status::NotFound, "Not found")
}

#[catch(405)]
pub fn method_not_allowed() -> (Status, rocket::serde::json::Value) {
    catcher_body(Status::MethodNotAllowed, "Method not allowed")
}

/// Rocket reports unparseable JSON bodies as 422; the API reports them as 400.
#[catch(422)]
pub fn unprocessable() -> (Status, rocket::serde::json::Value) {
    catcher_body(Status::BadRequest, "Malformed request body")
}

#[catch(429)]
pub fn too_many_requests() -> (Status, rocket::serde::json::Value) {
    catcher_body(Status::TooManyRequests, "Too many requests. Please try again later.")
}

#[catch(500)]
pub fn internal_error() -> (Status, rocket::serde::json::Value) {
    catcher_body(Status::InternalServerError, "Internal server error")
}

pub fn api_catchers() -> Vec<rocket::Catcher> {
    catchers![
        bad_request,
        unauthorized,
        forbidden,
        not_found,
        method_not_allowed,
        unprocessable,
        too_many_requests,
        internal_error
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::Validation("x".into()).status(), Status::BadRequest);
        assert_eq!(
            ApiError::Conflict { field: "email", message: "taken".into() }.status(),
            Status::BadRequest
        );
        assert_eq!(ApiError::Unauthorized.status(), Status::Unauthorized);
        assert_eq!(ApiError::NotFound("Post").status(), Status::NotFound);
        assert_eq!(ApiError::MethodNotAllowed.status(), Status::MethodNotAllowed);
        assert_eq!(ApiError::Internal("db".into()).status(), Status::InternalServerError);
    }

    #[test]
    fn internal_body_withholds_detail() {
        let body = ApiError::Internal("disk I/O error at /var/db".into()).body();
        assert_eq!(body["error"], "Internal server error");
        assert!(!body.to_string().contains("/var/db"));
    }

    #[test]
    fn conflict_body_names_field() {
        let body = ApiError::Conflict { field: "email", message: "Email already in use".into() }.body();
        assert_eq!(body["field"], "email");
        assert_eq!(body["success"], false);
    }
}
