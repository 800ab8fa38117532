//! CORS layer built from `CORS_ALLOWED_ORIGINS`.
//!
//! Origin patterns:
//! - `*` allows every origin
//! - `*example.com` suffix match
//! - `https://dev-*` prefix match
//! - `/^https://(foo|bar)\.example\.com$/` regex between slashes
//! - anything else must match exactly
//!
//! Methods and headers are mirrored from the preflight request and
//! credentials are allowed.
use std::time::Duration;

use axum::http::{HeaderValue, request::Parts};
use regex::Regex;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::error::AppError;

const MAX_AGE: Duration = Duration::from_secs(60 * 60);

type Predicate = Box<dyn Fn(&str) -> bool + Send + Sync + 'static>;

pub fn build_cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, AppError> {
    let checks = allowed_origins
        .iter()
        .map(|pattern| compile(pattern))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _: &Parts| {
                let origin = origin.to_str().unwrap_or_default();
                checks.iter().any(|check| check(origin))
            },
        ))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .max_age(MAX_AGE))
}

fn compile(pattern: &str) -> Result<Predicate, AppError> {
    let invalid = |e: regex::Error| AppError::Config(format!("Invalid CORS origin '{pattern}': {e}"));

    let check: Predicate = if pattern == "*" {
        Box::new(|_: &str| true)
    } else if let Some(regex) = pattern
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
        .filter(|inner| !inner.is_empty())
    {
        let re = Regex::new(regex).map_err(invalid)?;
        Box::new(move |origin: &str| re.is_match(origin))
    } else if let Some(suffix) = pattern.strip_prefix('*').filter(|s| !s.contains('*')) {
        let suffix = suffix.to_string();
        Box::new(move |origin: &str| origin.ends_with(&suffix))
    } else if let Some(prefix) = pattern.strip_suffix('*').filter(|p| !p.contains('*')) {
        let prefix = prefix.to_string();
        Box::new(move |origin: &str| origin.starts_with(&prefix))
    } else {
        let exact = pattern.to_string();
        Box::new(move |origin: &str| origin == exact)
    };

    Ok(check)
}
