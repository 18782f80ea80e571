use actix_web::{web, HttpResponse};
use paygate::GateDraft;
use serde::Deserialize;

use crate::error::GatewayError;
use crate::metrics::GATES_REGISTERED;
use crate::state::AppState;

/// Body of `POST /api/402/apis`.
#[derive(Debug, Deserialize)]
pub struct CreateApiRequest {
    #[serde(default)]
    pub p_name: Option<String>,
    pub p_api_url: String,
    pub p_merchant_wallet: String,
    #[serde(default)]
    pub p_token_address: Option<String>,
    pub p_amount_wei: String,
    pub p_valid_for_sec: i64,
    #[serde(default)]
    pub p_chain_id: Option<u64>,
    #[serde(default)]
    pub p_fee_bps_snapshot: Option<u32>,
}

impl From<CreateApiRequest> for GateDraft {
    fn from(req: CreateApiRequest) -> Self {
        GateDraft {
            name: req.p_name,
            api_url: req.p_api_url,
            merchant_wallet: req.p_merchant_wallet,
            token_address: req.p_token_address,
            amount_wei: req.p_amount_wei,
            valid_for_sec: req.p_valid_for_sec,
            chain_id: req.p_chain_id,
            fee_bps_snapshot: req.p_fee_bps_snapshot,
        }
    }
}

/// POST /api/402/apis - Register a new payment gate
pub async fn create_api(
    state: web::Data<AppState>,
    body: web::Json<CreateApiRequest>,
) -> Result<HttpResponse, GatewayError> {
    let new_gate =
        GateDraft::from(body.into_inner()).validate(state.config.allow_private_upstreams)?;

    let gate = state.store().create_gate(new_gate)?;

    GATES_REGISTERED.inc();
    tracing::info!(
        gate_id = %gate.id,
        api_url = %gate.api_url,
        amount_wei = %gate.amount_wei,
        chain_id = gate.chain_id,
        "Registered gate"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({ "apiId": gate.id })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/402/apis", web::post().to(create_api));
}
