//! CORS configuration for the paygate server.

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};

/// Build the CORS middleware from allowed origins.
///
/// Browsers must be able to send and read the session header, so it is both
/// allowed and exposed. Wildcard (`*`) is only accepted by config in dev mode.
pub fn build_cors(allowed_origins: &[String]) -> Cors {
    let allowed = allowed_origins.to_vec();
    let session = HeaderName::from_static("x-402-session");

    Cors::default()
        .allowed_origin_fn(move |origin, _req_head| {
            let origin_str = origin.to_str().unwrap_or("");
            allowed.iter().any(|a| a == "*" || a == origin_str)
        })
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
            session.clone(),
        ])
        .expose_headers(vec![session])
        .max_age(3600)
}
