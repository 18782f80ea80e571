use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::SESSION_TOKEN_BYTES;

/// A registered masked endpoint: where to proxy and what it costs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    pub id: String,
    pub name: Option<String>,
    pub api_url: String,
    pub merchant_wallet: String,
    /// Zero address for the native asset, otherwise an ERC-20 contract.
    pub token_address: String,
    /// Price in the token's smallest unit, decimal string.
    pub amount_wei: String,
    pub valid_for_sec: u64,
    pub chain_id: u64,
    pub fee_bps_snapshot: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Gate {
    /// Snapshot of the payment terms copied onto every new session.
    pub fn terms(&self) -> SessionTerms {
        SessionTerms {
            merchant_wallet: self.merchant_wallet.clone(),
            token_address: self.token_address.clone(),
            amount_wei: self.amount_wei.clone(),
            chain_id: self.chain_id,
        }
    }
}

/// Validated input for registering a gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGate {
    pub name: Option<String>,
    pub api_url: String,
    pub merchant_wallet: Address,
    pub token_address: Address,
    pub amount_wei: U256,
    pub valid_for_sec: u64,
    pub chain_id: u64,
    pub fee_bps_snapshot: Option<u32>,
}

impl NewGate {
    /// Materialize the stored record under the given id.
    pub fn into_gate(self, id: String, created_at: DateTime<Utc>) -> Gate {
        Gate {
            id,
            name: self.name,
            api_url: self.api_url,
            merchant_wallet: format!("{:#x}", self.merchant_wallet),
            token_address: format!("{:#x}", self.token_address),
            amount_wei: self.amount_wei.to_string(),
            valid_for_sec: self.valid_for_sec,
            chain_id: self.chain_id,
            fee_bps_snapshot: self.fee_bps_snapshot,
            created_at,
        }
    }
}

/// Payment terms frozen onto a session when it is minted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTerms {
    pub merchant_wallet: String,
    pub token_address: String,
    pub amount_wei: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Paid,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SessionStatus::Pending),
            "paid" => Some(SessionStatus::Paid),
            _ => None,
        }
    }
}

/// One payment attempt against a gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub session_id_hex: String,
    pub api_id: String,
    pub status: SessionStatus,
    /// Only set once the session has been paid.
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub terms: SessionTerms,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Paid and strictly before its expiry.
    pub fn unlocks_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Paid && self.expires_at.is_some_and(|exp| exp > now)
    }

    /// Paid but the expiry instant has been reached.
    pub fn expired_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match (self.status, self.expires_at) {
            (SessionStatus::Paid, Some(exp)) if exp <= now => Some(exp),
            _ => None,
        }
    }
}

/// A session row about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub session_id_hex: String,
    pub api_id: String,
    pub terms: SessionTerms,
    pub created_at: DateTime<Utc>,
}

impl NewSession {
    /// Fresh pending session for `gate` with a random token.
    pub fn for_gate(gate: &Gate, created_at: DateTime<Utc>) -> Self {
        Self {
            session_id_hex: generate_session_token(),
            api_id: gate.id.clone(),
            terms: gate.terms(),
            created_at,
        }
    }
}

/// 256 random bits, 0x-prefixed lowercase hex.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rand::fill(&mut bytes);
    format!("0x{}", alloy::hex::encode(bytes))
}

/// Whether `s` has the shape of a token produced by [`generate_session_token`].
pub fn is_session_token(s: &str) -> bool {
    s.strip_prefix("0x").is_some_and(|hex| {
        hex.len() == SESSION_TOKEN_BYTES * 2 && hex.chars().all(|c| c.is_ascii_hexdigit())
    })
}
