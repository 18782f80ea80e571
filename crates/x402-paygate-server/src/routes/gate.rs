use actix_web::{web, HttpRequest, HttpResponse};
use paygate::{Outcome, ResolveError, SESSION_HEADER};

use crate::error::GatewayError;
use crate::metrics::{
    RESOLVE_TOTAL, SESSIONS_MINTED, UPSTREAM_FAILURES, UPSTREAM_FETCHES, UPSTREAM_LATENCY,
};
use crate::state::AppState;

/// Session token presented by the caller, if any.
fn session_header(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn record_error(err: &GatewayError) {
    RESOLVE_TOTAL.with_label_values(&[err.code()]).inc();
}

/// Render a resolve outcome in the `{ code, data, meta? }` envelope.
fn render(outcome: Outcome, presented: Option<&str>) -> HttpResponse {
    RESOLVE_TOTAL.with_label_values(&[outcome.code()]).inc();
    let code = outcome.code();

    match outcome {
        Outcome::PaymentRequired(info) => {
            if presented != Some(info.session_id.as_str()) {
                SESSIONS_MINTED.inc();
            }
            HttpResponse::PaymentRequired()
                .insert_header((SESSION_HEADER, info.session_id.clone()))
                .json(serde_json::json!({ "code": code, "data": info }))
        }
        Outcome::SessionExpired {
            info,
            previous_session,
            expired_at,
        } => {
            SESSIONS_MINTED.inc();
            HttpResponse::PaymentRequired()
                .insert_header((SESSION_HEADER, info.session_id.clone()))
                .json(serde_json::json!({
                    "code": code,
                    "data": info,
                    "meta": {
                        "previous_session": previous_session,
                        "expired_at": expired_at,
                    }
                }))
        }
        Outcome::Unlocked(unlocked) => {
            UPSTREAM_FETCHES.inc();
            UPSTREAM_LATENCY.observe(unlocked.upstream.elapsed.as_secs_f64());
            HttpResponse::Ok()
                .insert_header((SESSION_HEADER, unlocked.session.session_id_hex.clone()))
                .json(serde_json::json!({ "code": code, "data": unlocked }))
        }
    }
}

/// GET /api/{id} - Resolve a gate for the caller's session
pub async fn resolve_gate(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let id = path.into_inner();
    let id = id.trim();
    if id.is_empty() {
        let err = GatewayError::MissingId;
        record_error(&err);
        return Err(err);
    }

    let presented = session_header(&req);
    match state.resolver.resolve(id, presented).await {
        Ok(outcome) => Ok(render(outcome, presented)),
        Err(e) => {
            if matches!(e, ResolveError::Upstream(_)) {
                UPSTREAM_FETCHES.inc();
                UPSTREAM_FAILURES.inc();
            }
            let err = GatewayError::from(e);
            record_error(&err);
            Err(err)
        }
    }
}

/// GET /api/ - No id supplied
pub async fn missing_id() -> Result<HttpResponse, GatewayError> {
    let err = GatewayError::MissingId;
    record_error(&err);
    Err(err)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/", web::get().to(missing_id))
        .route("/api/{id}", web::get().to(resolve_gate));
}
