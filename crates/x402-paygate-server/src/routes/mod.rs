pub mod apis;
pub mod gate;
pub mod health;

use actix_web::web;

use crate::error::GatewayError;

/// Registration bodies are small; anything larger is rejected.
const JSON_BODY_LIMIT: usize = 65_536;

/// JSON extractor config that reports malformed bodies in the error envelope.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_BODY_LIMIT)
        .error_handler(|err, _req| GatewayError::BadRequest(err.to_string()).into())
}

/// Mount every route. Registration must precede the `/api/{id}` catch-all.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config());
    health::configure(cfg);
    apis::configure(cfg);
    gate::configure(cfg);
}
