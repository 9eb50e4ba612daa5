//! SQLite-backed store for score and alert events with AES-GCM encryption of the
//! payload column. Key derived from a deployment secret.

use crate::alerts::Alert;
use crate::error::StoreError;
use crate::feed::ScoreEvent;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

fn derive_key(seed: &[u8]) -> [u8; KEY_LEN] {
    use ring::digest;
    let mut out = [0u8; KEY_LEN];
    let h = digest::digest(&digest::SHA256, seed);
    out[..h.as_ref().len().min(KEY_LEN)].copy_from_slice(h.as_ref());
    out
}

fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<String, StoreError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| StoreError::Crypto)?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt((&nonce).into(), plaintext)
        .map_err(|_| StoreError::Crypto)?;
    let mut out = nonce.to_vec();
    out.extend(ciphertext);
    Ok(BASE64.encode(&out))
}

fn decrypt(key: &[u8; KEY_LEN], encoded: &str) -> Result<Vec<u8>, StoreError> {
    let raw = BASE64.decode(encoded)?;
    if raw.len() < NONCE_LEN {
        return Err(StoreError::Truncated);
    }
    let (nonce, ct) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| StoreError::Crypto)?;
    cipher.decrypt(nonce.into(), ct).map_err(|_| StoreError::Crypto)
}

pub struct SecureStore {
    conn: Mutex<Connection>,
    key: [u8; KEY_LEN],
}

impl SecureStore {
    /// Open or create DB at path.
    pub fn open(path: &Path, secret: &[u8]) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scores (
                transaction_id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                ts INTEGER NOT NULL,
                score REAL NOT NULL,
                payload_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_scores_ts ON scores(ts);
            CREATE TABLE IF NOT EXISTS alerts (
                alert_id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                ts INTEGER NOT NULL,
                severity TEXT NOT NULL,
                payload_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_alerts_account ON alerts(account_id, ts);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            key: derive_key(secret),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_score(&self, event: &ScoreEvent) -> Result<(), StoreError> {
        let enc = encrypt(&self.key, &serde_json::to_vec(event)?)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO scores (transaction_id, account_id, ts, score, payload_enc) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.score.transaction_id,
                event.score.account_id,
                event.score.computed_at.timestamp_millis(),
                event.score.score,
                enc
            ],
        )?;
        Ok(())
    }

    pub fn insert_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let enc = encrypt(&self.key, &serde_json::to_vec(alert)?)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO alerts (alert_id, account_id, ts, severity, payload_enc) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                alert.alert_id,
                alert.account_id,
                alert.created_at.timestamp_millis(),
                alert.severity.as_str(),
                enc
            ],
        )?;
        Ok(())
    }

    pub fn get_score(&self, transaction_id: &str) -> Result<Option<ScoreEvent>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT payload_enc FROM scores WHERE transaction_id = ?1")?;
        let mut rows = stmt.query(params![transaction_id])?;
        if let Some(row) = rows.next()? {
            let enc: String = row.get(0)?;
            let plain = decrypt(&self.key, &enc)?;
            return Ok(Some(serde_json::from_slice(&plain)?));
        }
        Ok(None)
    }

    /// Alerts for one account, oldest first.
    pub fn alerts_for_account(&self, account_id: &str) -> Result<Vec<Alert>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT payload_enc FROM alerts WHERE account_id = ?1 ORDER BY ts ASC")?;
        let encs = stmt
            .query_map(params![account_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        encs.iter()
            .map(|enc| -> Result<Alert, StoreError> {
                Ok(serde_json::from_slice(&decrypt(&self.key, enc)?)?)
            })
            .collect()
    }

    /// Retention: delete scores and alerts older than `before`.
    pub fn prune_before(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let ts = before.timestamp_millis();
        let conn = self.conn();
        let scores = conn.execute("DELETE FROM scores WHERE ts < ?1", params![ts])?;
        let alerts = conn.execute("DELETE FROM alerts WHERE ts < ?1", params![ts])?;
        Ok((scores + alerts) as u64)
    }
}
