use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use paygate::{ResolveError, StoreError, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Empty or blank API id
    #[error("missing API id")]
    MissingId,
    /// No gate with this id
    #[error("API not found: {0}")]
    NotFound(String),
    /// Malformed or invalid request body
    #[error("{0}")]
    BadRequest(String),
    /// Upstream fetch failed after unlock
    #[error("failed to fetch API URL: {0}")]
    Upstream(String),
    /// Store or other internal failure
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::MissingId => "missing_id",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::Upstream(_) => "upstream_error",
            GatewayError::Internal(_) => "server_error",
        }
    }
}

impl From<ResolveError> for GatewayError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::NotFound(id) => GatewayError::NotFound(id),
            ResolveError::Upstream(msg) => GatewayError::Upstream(msg),
            ResolveError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        GatewayError::Internal(e.to_string())
    }
}

impl From<ValidationError> for GatewayError {
    fn from(e: ValidationError) -> Self {
        GatewayError::BadRequest(e.to_string())
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingId | GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            GatewayError::MissingId | GatewayError::NotFound(_) => serde_json::json!({
                "code": self.code(),
                "data": {}
            }),
            GatewayError::BadRequest(msg) => serde_json::json!({
                "code": self.code(),
                "data": {},
                "error": msg
            }),
            GatewayError::Upstream(_) => serde_json::json!({
                "code": self.code(),
                "data": {},
                "error": self.to_string()
            }),
            GatewayError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                serde_json::json!({
                    "code": self.code(),
                    "data": {},
                    "error": msg
                })
            }
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
