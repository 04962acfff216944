pub mod admin_api;
pub mod api;
pub mod public;

use rocket::serde::json::{Error as JsonError, Json};

use crate::error::{ApiError, ApiResult};
use crate::rate_limit::{RateLimiter, RatePolicy};

/// Unwrap a JSON data guard, turning parse failures into 400s.
pub fn json_body<T>(body: Result<Json<T>, JsonError<'_>>) -> ApiResult<T> {
    match body {
        Ok(json) => Ok(json.into_inner()),
        Err(JsonError::Io(e)) => Err(ApiError::Validation(format!("Could not read body: {}", e))),
        Err(JsonError::Parse(_, e)) => Err(ApiError::Validation(format!("Malformed request body: {}", e))),
    }
}

pub fn rate_limited(limiter: &RateLimiter, policy: &RatePolicy, client: &str) -> ApiResult<()> {
    if limiter.allow(policy, client) {
        Ok(())
    } else {
        Err(ApiError::RateLimited)
    }
}

/// Highest page number honored by listing routes.
pub const MAX_PAGE: i64 = 10_000;

/// 1-based page number from a query parameter, clamped to `1..=MAX_PAGE`.
pub fn page_number(page: Option<i64>) -> i64 {
    page.unwrap_or(1).clamp(1, MAX_PAGE)
}

pub fn page_offset(page: i64, per_page: i64) -> i64 {
    page.saturating_sub(1).max(0).saturating_mul(per_page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_are_clamped() {
        assert_eq!(page_number(None), 1);
        assert_eq!(page_number(Some(-4)), 1);
        assert_eq!(page_number(Some(3)), 3);
        assert_eq!(page_number(Some(i64::MAX)), MAX_PAGE);
    }

    #[test]
    fn offsets_never_overflow() {
        assert_eq!(page_offset(1, 20), 0);
        assert_eq!(page_offset(3, 20), 40);
        assert_eq!(page_offset(i64::MAX, i64::MAX), i64::MAX);
    }
}
