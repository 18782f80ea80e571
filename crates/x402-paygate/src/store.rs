use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::gate::{Gate, NewGate, NewSession, Session, SessionStatus, SessionTerms};

/// Backing store for gates and their payment sessions.
///
/// Implementations must be thread-safe (`Send + Sync`). Each method is an
/// independent, atomic operation; nothing spans calls.
pub trait GateStore: Send + Sync {
    /// Persist a new gate and return it with its generated id.
    fn create_gate(&self, gate: NewGate) -> Result<Gate, StoreError>;

    /// Look up a gate by id.
    fn get_gate(&self, id: &str) -> Result<Option<Gate>, StoreError>;

    /// Insert a `pending` session.
    fn insert_session(&self, session: NewSession) -> Result<Session, StoreError>;

    /// Session for (token, gate) that is `paid` with `expires_at > now`.
    fn find_paid_session(
        &self,
        token: &str,
        gate_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError>;

    /// Session for (token, gate) in any state.
    fn find_session(&self, token: &str, gate_id: &str) -> Result<Option<Session>, StoreError>;

    /// Mark a session paid at `paid_at`; it then unlocks its gate for the
    /// gate's `valid_for_sec`. Owned by the payment-confirmation process,
    /// never called by the resolver. Confirming an already paid session
    /// leaves it unchanged.
    fn confirm_payment(&self, token: &str, paid_at: DateTime<Utc>) -> Result<Session, StoreError>;

    /// Cheap reachability check for health endpoints.
    fn ping(&self) -> Result<(), StoreError>;
}

fn new_gate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Drop sub-second precision; both backends persist whole seconds.
fn truncate_secs(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(t.timestamp(), 0).unwrap_or(t)
}

fn now_secs() -> DateTime<Utc> {
    truncate_secs(Utc::now())
}

/// `paid_at + valid_for_sec`, saturating at the latest representable instant.
fn expiry_for(paid_at: DateTime<Utc>, valid_for_sec: u64) -> DateTime<Utc> {
    i64::try_from(valid_for_sec)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|window| paid_at.checked_add_signed(window))
        .map(truncate_secs)
        .unwrap_or_else(|| truncate_secs(DateTime::<Utc>::MAX_UTC))
}

/// In-memory store backed by DashMap. Fast but lost on restart.
pub struct InMemoryGateStore {
    gates: DashMap<String, Gate>,
    sessions: DashMap<String, Session>,
    next_session_id: AtomicI64,
}

impl InMemoryGateStore {
    pub fn new() -> Self {
        Self {
            gates: DashMap::new(),
            sessions: DashMap::new(),
            next_session_id: AtomicI64::new(1),
        }
    }

    /// Number of sessions ever minted, across all gates.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for InMemoryGateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GateStore for InMemoryGateStore {
    fn create_gate(&self, gate: NewGate) -> Result<Gate, StoreError> {
        let gate = gate.into_gate(new_gate_id(), now_secs());
        self.gates.insert(gate.id.clone(), gate.clone());
        Ok(gate)
    }

    fn get_gate(&self, id: &str) -> Result<Option<Gate>, StoreError> {
        Ok(self.gates.get(id).map(|g| g.clone()))
    }

    fn insert_session(&self, session: NewSession) -> Result<Session, StoreError> {
        use dashmap::mapref::entry::Entry;
        match self.sessions.entry(session.session_id_hex.clone()) {
            Entry::Occupied(_) => Err(StoreError::Backend(format!(
                "duplicate session token: {}",
                session.session_id_hex
            ))),
            Entry::Vacant(v) => {
                let stored = Session {
                    id: self.next_session_id.fetch_add(1, Ordering::Relaxed),
                    session_id_hex: session.session_id_hex,
                    api_id: session.api_id,
                    status: SessionStatus::Pending,
                    expires_at: None,
                    terms: session.terms,
                    created_at: truncate_secs(session.created_at),
                    paid_at: None,
                };
                v.insert(stored.clone());
                Ok(stored)
            }
        }
    }

    fn find_paid_session(
        &self,
        token: &str,
        gate_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self
            .find_session(token, gate_id)?
            .filter(|s| s.unlocks_at(now)))
    }

    fn find_session(&self, token: &str, gate_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self
            .sessions
            .get(token)
            .filter(|s| s.api_id == gate_id)
            .map(|s| s.clone()))
    }

    fn confirm_payment(&self, token: &str, paid_at: DateTime<Utc>) -> Result<Session, StoreError> {
        let mut session = self
            .sessions
            .get_mut(token)
            .ok_or_else(|| StoreError::SessionNotFound(token.to_string()))?;
        if session.status == SessionStatus::Paid {
            return Ok(session.clone());
        }
        let gate = self
            .gates
            .get(&session.api_id)
            .ok_or_else(|| StoreError::GateNotFound(session.api_id.clone()))?;
        let paid_at = truncate_secs(paid_at);
        session.status = SessionStatus::Paid;
        session.paid_at = Some(paid_at);
        session.expires_at = Some(expiry_for(paid_at, gate.valid_for_sec));
        Ok(session.clone())
    }

    fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS apis_402 (
        id TEXT PRIMARY KEY,
        name TEXT,
        api_url TEXT NOT NULL,
        merchant_wallet TEXT NOT NULL,
        token_address TEXT NOT NULL,
        amount_wei TEXT NOT NULL,
        valid_for_sec INTEGER NOT NULL,
        chain_id INTEGER NOT NULL,
        fee_bps_snapshot INTEGER,
        created_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS sessions_402 (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id_hex TEXT UNIQUE NOT NULL,
        api_id TEXT NOT NULL REFERENCES apis_402(id),
        status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'paid')),
        expires_at INTEGER,
        merchant_wallet TEXT NOT NULL,
        token_address TEXT NOT NULL,
        amount_wei TEXT NOT NULL,
        chain_id INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        paid_at INTEGER
    );
    CREATE INDEX IF NOT EXISTS idx_sessions_api ON sessions_402(api_id, session_id_hex);
    PRAGMA journal_mode=WAL;
"#;

const GATE_COLUMNS: &str = "id, name, api_url, merchant_wallet, token_address, amount_wei, \
     valid_for_sec, chain_id, fee_bps_snapshot, created_at";

const SESSION_COLUMNS: &str = "id, session_id_hex, api_id, status, expires_at, merchant_wallet, \
     token_address, amount_wei, chain_id, created_at, paid_at";

fn timestamp(idx: usize, secs: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

fn unsigned(idx: usize, value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

fn to_sql_int(field: &str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Backend(format!("{field} out of range: {value}")))
}

fn gate_from_row(row: &Row<'_>) -> rusqlite::Result<Gate> {
    let fee: Option<i64> = row.get(8)?;
    Ok(Gate {
        id: row.get(0)?,
        name: row.get(1)?,
        api_url: row.get(2)?,
        merchant_wallet: row.get(3)?,
        token_address: row.get(4)?,
        amount_wei: row.get(5)?,
        valid_for_sec: unsigned(6, row.get(6)?)?,
        chain_id: unsigned(7, row.get(7)?)?,
        fee_bps_snapshot: fee
            .map(|f| u32::try_from(f).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(8, f)))
            .transpose()?,
        created_at: timestamp(9, row.get(9)?)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    let status: String = row.get(3)?;
    let status = SessionStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown session status: {status}").into(),
        )
    })?;
    Ok(Session {
        id: row.get(0)?,
        session_id_hex: row.get(1)?,
        api_id: row.get(2)?,
        status,
        expires_at: row
            .get::<_, Option<i64>>(4)?
            .map(|s| timestamp(4, s))
            .transpose()?,
        terms: SessionTerms {
            merchant_wallet: row.get(5)?,
            token_address: row.get(6)?,
            amount_wei: row.get(7)?,
            chain_id: unsigned(8, row.get(8)?)?,
        },
        created_at: timestamp(9, row.get(9)?)?,
        paid_at: row
            .get::<_, Option<i64>>(10)?
            .map(|s| timestamp(10, s))
            .transpose()?,
    })
}

/// Persistent store backed by SQLite. Survives restarts.
pub struct SqliteGateStore {
    conn: Mutex<Connection>,
}

impl SqliteGateStore {
    /// Open (or create) the gate database at `path`. `:memory:` gives a
    /// private in-process database.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = %path, "gate store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| {
            tracing::error!("gate store mutex poisoned");
            StoreError::Poisoned
        })
    }
}

fn query_session(
    conn: &Connection,
    token: &str,
    gate_id: &str,
) -> Result<Option<Session>, StoreError> {
    let session = conn
        .query_row(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM sessions_402 \
                 WHERE session_id_hex = ?1 AND api_id = ?2"
            ),
            params![token, gate_id],
            session_from_row,
        )
        .optional()?;
    Ok(session)
}

impl GateStore for SqliteGateStore {
    fn create_gate(&self, gate: NewGate) -> Result<Gate, StoreError> {
        let gate = gate.into_gate(new_gate_id(), now_secs());
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO apis_402 ({GATE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
            params![
                gate.id,
                gate.name,
                gate.api_url,
                gate.merchant_wallet,
                gate.token_address,
                gate.amount_wei,
                to_sql_int("valid_for_sec", gate.valid_for_sec)?,
                to_sql_int("chain_id", gate.chain_id)?,
                gate.fee_bps_snapshot,
                gate.created_at.timestamp(),
            ],
        )?;
        Ok(gate)
    }

    fn get_gate(&self, id: &str) -> Result<Option<Gate>, StoreError> {
        let conn = self.conn()?;
        let gate = conn
            .query_row(
                &format!("SELECT {GATE_COLUMNS} FROM apis_402 WHERE id = ?1"),
                params![id],
                gate_from_row,
            )
            .optional()?;
        Ok(gate)
    }

    fn insert_session(&self, session: NewSession) -> Result<Session, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO sessions_402 (session_id_hex, api_id, status, merchant_wallet, token_address, amount_wei, chain_id, created_at)
            VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                session.session_id_hex,
                session.api_id,
                session.terms.merchant_wallet,
                session.terms.token_address,
                session.terms.amount_wei,
                to_sql_int("chain_id", session.terms.chain_id)?,
                session.created_at.timestamp(),
            ],
        )?;
        let id = conn.last_insert_rowid();

        Ok(Session {
            id,
            session_id_hex: session.session_id_hex,
            api_id: session.api_id,
            status: SessionStatus::Pending,
            expires_at: None,
            terms: session.terms,
            created_at: timestamp(0, session.created_at.timestamp())
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            paid_at: None,
        })
    }

    fn find_paid_session(
        &self,
        token: &str,
        gate_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions_402 \
                     WHERE session_id_hex = ?1 AND api_id = ?2 AND status = 'paid' AND expires_at > ?3"
                ),
                params![token, gate_id, now.timestamp()],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    fn find_session(&self, token: &str, gate_id: &str) -> Result<Option<Session>, StoreError> {
        let conn = self.conn()?;
        query_session(&conn, token, gate_id)
    }

    fn confirm_payment(&self, token: &str, paid_at: DateTime<Utc>) -> Result<Session, StoreError> {
        let conn = self.conn()?;
        let (gate_id, valid_for_sec): (String, i64) = conn
            .query_row(
                r#"
                SELECT s.api_id, a.valid_for_sec
                FROM sessions_402 s JOIN apis_402 a ON a.id = s.api_id
                WHERE s.session_id_hex = ?1
                "#,
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| StoreError::SessionNotFound(token.to_string()))?;

        let paid_at = truncate_secs(paid_at);
        let expires_at = expiry_for(paid_at, u64::try_from(valid_for_sec).unwrap_or(0));
        conn.execute(
            r#"
            UPDATE sessions_402 SET status = 'paid', paid_at = ?2, expires_at = ?3
            WHERE session_id_hex = ?1 AND status = 'pending'
            "#,
            params![token, paid_at.timestamp(), expires_at.timestamp()],
        )?;

        query_session(&conn, token, &gate_id)?
            .ok_or_else(|| StoreError::SessionNotFound(token.to_string()))
    }

    fn ping(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}
