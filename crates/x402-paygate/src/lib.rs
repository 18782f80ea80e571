//! HTTP 402 payment gate for pay-per-call APIs.
//!
//! A gate wraps an upstream URL with a price. Callers without a paid session
//! get a `402` carrying a fresh session token and on-chain payment
//! instructions; once the session is confirmed paid, requests presenting it
//! are proxied to the upstream until the session's validity window lapses.
//!
//! # Flow
//!
//! 1. **Mint**: an unpaid request gets a `pending` [`Session`] whose terms are
//!    frozen from the [`Gate`] at that instant
//! 2. **Pay**: the caller pays the session through the payment router; an
//!    out-of-band confirmer calls [`GateStore::confirm_payment`]
//! 3. **Unlock**: [`Resolver::resolve`] sees a paid, unexpired session and
//!    fetches the upstream exactly once per request
//!
//! # Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use paygate::{InMemoryGateStore, Outcome, Resolver, UpstreamClient, DEFAULT_CONTRACT};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = Arc::new(InMemoryGateStore::new());
//! let upstream = UpstreamClient::new(Duration::from_secs(30), true).unwrap();
//! let resolver = Resolver::new(store, upstream, DEFAULT_CONTRACT);
//!
//! match resolver.resolve("gate-id", None).await {
//!     Ok(Outcome::PaymentRequired(info)) => println!("pay session {}", info.session_id),
//!     Ok(other) => println!("{}", other.code()),
//!     Err(e) => eprintln!("{e}"),
//! }
//! # }
//! ```

pub mod constants;
pub mod error;
pub mod gate;
pub mod payment;
pub mod resolver;
pub mod store;
pub mod upstream;
pub mod validation;

pub use constants::*;
pub use error::{ResolveError, StoreError, ValidationError};
pub use gate::{Gate, NewGate, NewSession, Session, SessionStatus, SessionTerms};
pub use payment::PaymentInfo;
pub use resolver::{Outcome, Resolver, SessionSummary, Unlocked};
pub use store::{GateStore, InMemoryGateStore, SqliteGateStore};
pub use upstream::{UpstreamBody, UpstreamClient, UpstreamResponse};
pub use validation::GateDraft;
