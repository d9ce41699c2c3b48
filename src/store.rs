// 🗄️ Local Storage - cached credentials, profile, payment history, audit trail
//
// SQLite in WAL mode. Credentials and profile live in a key-value table as
// JSON blobs; payment attempts get their own table for the history view.

use crate::error::{Result, WizardError};
use crate::payment::{PaymentAttempt, PaymentOutcome};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SESSION_KEY: &str = "session";

// ============================================================================
// STORED SESSION
// ============================================================================

/// What a successful registration leaves on the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub user_id: String,
    pub role_id: i64,
    /// Minimal profile as returned by the backend
    #[serde(default)]
    pub profile: serde_json::Value,
    pub saved_at: DateTime<Utc>,
}

// ============================================================================
// COLLABORATOR CONTRACTS
// ============================================================================

pub trait CredentialStore: Send + Sync {
    fn save_session(&self, session: &StoredSession) -> Result<()>;
    fn load_session(&self) -> Result<Option<StoredSession>>;
    fn clear_session(&self) -> Result<()>;
}

pub trait PaymentLedger: Send + Sync {
    /// Insert or update an attempt (keyed by its local id)
    fn record_attempt(&self, user_id: Option<&str>, attempt: &PaymentAttempt) -> Result<()>;

    /// Attempts for one user, newest first
    fn payment_history(&self, user_id: &str) -> Result<Vec<PaymentAttempt>>;
}

// ============================================================================
// AUDIT EVENTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(event_type: &str, entity_type: &str, entity_id: &str, data: serde_json::Value) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payment_attempts (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            amount REAL NOT NULL,
            currency TEXT NOT NULL,
            transaction_id TEXT,
            outcome TEXT NOT NULL,
            failure_reason TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_user ON payment_attempts(user_id, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (event_id, timestamp, event_type, entity_type, entity_id, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(conn: &Connection, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let rows = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(event_id, timestamp, event_type, entity_type, entity_id, data)| {
            Ok(Event {
                event_id,
                timestamp: parse_time(&timestamp)?,
                event_type,
                entity_type,
                entity_id,
                data: serde_json::from_str(&data)?,
            })
        })
        .collect()
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| WizardError::Storage(format!("bad timestamp {}: {}", s, e)))
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.lock().execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .lock()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn record_event(&self, event: &Event) -> Result<()> {
        insert_event(&self.lock(), event)
    }

    pub fn events_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        get_events_for_entity(&self.lock(), entity_type, entity_id)
    }
}

impl CredentialStore for SqliteStore {
    fn save_session(&self, session: &StoredSession) -> Result<()> {
        self.put(SESSION_KEY, &serde_json::to_string(session)?)?;
        self.record_event(&Event::new(
            "session_saved",
            "user",
            &session.user_id,
            serde_json::json!({ "role_id": session.role_id }),
        ))
    }

    fn load_session(&self) -> Result<Option<StoredSession>> {
        match self.get(SESSION_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn clear_session(&self) -> Result<()> {
        self.lock().execute("DELETE FROM kv WHERE key = ?1", params![SESSION_KEY])?;
        Ok(())
    }
}

impl PaymentLedger for SqliteStore {
    fn record_attempt(&self, user_id: Option<&str>, attempt: &PaymentAttempt) -> Result<()> {
        self.lock().execute(
            "INSERT INTO payment_attempts (
                id, user_id, amount, currency, transaction_id, outcome, failure_reason, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                user_id = COALESCE(excluded.user_id, payment_attempts.user_id),
                transaction_id = excluded.transaction_id,
                outcome = excluded.outcome,
                failure_reason = excluded.failure_reason",
            params![
                attempt.id,
                user_id,
                attempt.amount,
                attempt.currency,
                attempt.transaction_id,
                attempt.outcome.as_str(),
                attempt.failure_reason,
                attempt.created_at.to_rfc3339(),
            ],
        )?;

        self.record_event(&Event::new(
            "payment_attempt",
            "payment",
            &attempt.id,
            serde_json::json!({ "outcome": attempt.outcome.as_str(), "user_id": user_id }),
        ))
    }

    fn payment_history(&self, user_id: &str) -> Result<Vec<PaymentAttempt>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, amount, currency, transaction_id, outcome, failure_reason, created_at
             FROM payment_attempts
             WHERE user_id = ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, amount, currency, transaction_id, outcome, failure_reason, created_at)| {
                Ok(PaymentAttempt {
                    id,
                    amount,
                    currency,
                    transaction_id,
                    outcome: PaymentOutcome::parse(&outcome)
                        .ok_or_else(|| WizardError::Storage(format!("unknown outcome {}", outcome)))?,
                    failure_reason,
                    created_at: parse_time(&created_at)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::GatewayResult;
    use chrono::Duration;

    fn session() -> StoredSession {
        StoredSession {
            token: "tok-abc".to_string(),
            user_id: "42".to_string(),
            role_id: 2,
            profile: serde_json::json!({"name": "Anil"}),
            saved_at: Utc::now(),
        }
    }

    #[test]
    fn test_session_round_trip_and_clear() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.load_session().unwrap().is_none());

        store.save_session(&session()).unwrap();
        let loaded = store.load_session().unwrap().unwrap();
        assert_eq!(loaded.token, "tok-abc");
        assert_eq!(loaded.profile["name"], "Anil");

        store.clear_session().unwrap();
        assert!(store.load_session().unwrap().is_none());
    }

    #[test]
    fn test_session_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.db");

        SqliteStore::open(&path).unwrap().save_session(&session()).unwrap();
        let reopened = SqliteStore::open(&path).unwrap();

        assert_eq!(reopened.load_session().unwrap().unwrap().user_id, "42");
    }

    #[test]
    fn test_attempt_upsert_and_history_order() {
        let store = SqliteStore::in_memory().unwrap();

        let mut older = PaymentAttempt::pending(50.0, "INR");
        older.created_at = Utc::now() - Duration::days(1);
        older.settle(&GatewayResult::Cancelled);
        store.record_attempt(Some("42"), &older).unwrap();

        // Recorded before registration, claimed by the user afterwards
        let mut newer = PaymentAttempt::pending(50.0, "INR");
        store.record_attempt(None, &newer).unwrap();
        newer.settle(&GatewayResult::Failed {
            transaction_id: Some("pay_1".into()),
            reason: "insufficient funds".into(),
        });
        store.record_attempt(Some("42"), &newer).unwrap();

        let history = store.payment_history("42").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, newer.id);
        assert_eq!(history[0].outcome, PaymentOutcome::Failed);
        assert_eq!(history[0].failure_reason.as_deref(), Some("insufficient funds"));
        assert_eq!(history[1].outcome, PaymentOutcome::Cancelled);
        assert!(store.payment_history("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_event_log() {
        let store = SqliteStore::in_memory().unwrap();

        store
            .record_event(&Event::new("test_event", "user", "u1", serde_json::json!({"k": "v"})))
            .unwrap();

        let events = store.events_for("user", "u1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "test_event");
        assert_eq!(events[0].data["k"], "v");
    }
}
