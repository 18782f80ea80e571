use std::sync::Arc;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ResolveError, StoreError};
use crate::gate::{Gate, NewSession, Session};
use crate::payment::PaymentInfo;
use crate::store::GateStore;
use crate::upstream::{UpstreamClient, UpstreamResponse};

/// What a gate request resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Pay this session before retrying.
    PaymentRequired(PaymentInfo),
    /// The presented session lapsed; a fresh one was minted.
    SessionExpired {
        info: PaymentInfo,
        previous_session: String,
        expired_at: DateTime<Utc>,
    },
    /// Paid and valid: the upstream was fetched.
    Unlocked(Box<Unlocked>),
}

impl Outcome {
    /// Machine-readable code carried in the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Outcome::PaymentRequired(_) => "payment_required",
            Outcome::SessionExpired { .. } => "session_expired",
            Outcome::Unlocked(_) => "successful",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unlocked {
    pub api: Gate,
    pub session: SessionSummary,
    pub upstream: UpstreamResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: i64,
    pub session_id_hex: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id,
            session_id_hex: s.session_id_hex.clone(),
            expires_at: s.expires_at,
        }
    }
}

/// Log-safe prefix of a bearer token.
fn short(token: &str) -> &str {
    token.get(..10).unwrap_or(token)
}

/// Stateless payment-gate decision logic.
///
/// Every call rederives its answer from the store and the clock, so any
/// number of resolvers may serve the same gates concurrently.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn GateStore>,
    upstream: UpstreamClient,
    contract: Address,
}

impl Resolver {
    pub fn new(store: Arc<dyn GateStore>, upstream: UpstreamClient, contract: Address) -> Self {
        Self {
            store,
            upstream,
            contract,
        }
    }

    pub fn store(&self) -> &Arc<dyn GateStore> {
        &self.store
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub async fn resolve(
        &self,
        gate_id: &str,
        session_token: Option<&str>,
    ) -> Result<Outcome, ResolveError> {
        self.resolve_at(gate_id, session_token, Utc::now()).await
    }

    /// [`Resolver::resolve`] against an explicit clock reading.
    pub async fn resolve_at(
        &self,
        gate_id: &str,
        session_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Outcome, ResolveError> {
        let gate = self
            .store
            .get_gate(gate_id)?
            .ok_or_else(|| ResolveError::NotFound(gate_id.to_string()))?;

        let token = match session_token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => {
                let session = self.mint(&gate, now)?;
                return Ok(Outcome::PaymentRequired(self.instructions(&session)));
            }
        };

        if let Some(session) = self.store.find_paid_session(token, &gate.id, now)? {
            return self.unlock(gate, &session).await;
        }

        match self.store.find_session(token, &gate.id)? {
            None => {
                tracing::info!(gate_id = %gate.id, session = %short(token), "unknown session token, minting a new one");
                let session = self.mint(&gate, now)?;
                Ok(Outcome::PaymentRequired(self.instructions(&session)))
            }
            Some(previous) => match previous.expired_at(now) {
                Some(expired_at) => {
                    let session = self.mint(&gate, now)?;
                    tracing::info!(
                        gate_id = %gate.id,
                        previous = %short(&previous.session_id_hex),
                        session = %short(&session.session_id_hex),
                        "session expired, reissued"
                    );
                    Ok(Outcome::SessionExpired {
                        info: self.instructions(&session),
                        previous_session: previous.session_id_hex,
                        expired_at,
                    })
                }
                // Still pending: the caller holds the session of record.
                None => Ok(Outcome::PaymentRequired(self.instructions(&previous))),
            },
        }
    }

    fn mint(&self, gate: &Gate, now: DateTime<Utc>) -> Result<Session, StoreError> {
        let session = self.store.insert_session(NewSession::for_gate(gate, now))?;
        tracing::debug!(gate_id = %gate.id, session = %short(&session.session_id_hex), "minted pending session");
        Ok(session)
    }

    fn instructions(&self, session: &Session) -> PaymentInfo {
        PaymentInfo::new(&session.session_id_hex, &session.terms, self.contract)
    }

    async fn unlock(&self, gate: Gate, session: &Session) -> Result<Outcome, ResolveError> {
        let upstream = self.upstream.fetch(&gate.api_url).await.map_err(|e| {
            tracing::error!(gate_id = %gate.id, error = %e, "upstream fetch failed");
            ResolveError::Upstream(e)
        })?;
        tracing::info!(
            gate_id = %gate.id,
            session = %short(&session.session_id_hex),
            status = upstream.status,
            "session unlocked"
        );
        Ok(Outcome::Unlocked(Box::new(Unlocked {
            api: gate,
            session: SessionSummary::from(session),
            upstream,
        })))
    }
}
