//! SQLite-backed store with AES-GCM encryption of payload columns.
//! Key derived from a device-bound secret (in production: Secure Enclave / Keystore).

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

fn derive_key(seed: &[u8]) -> [u8; KEY_LEN] {
    use ring::digest;
    let mut out = [0u8; KEY_LEN];
    let h = digest::digest(&digest::SHA256, seed);
    out[..h.as_ref().len().min(KEY_LEN)].copy_from_slice(h.as_ref());
    out
}

fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<String, aes_gcm::Error> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| aes_gcm::Error)?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher.encrypt((&nonce).into(), plaintext)?;
    let mut out = nonce.to_vec();
    out.extend(ciphertext);
    Ok(BASE64.encode(&out))
}

fn decrypt(
    key: &[u8; KEY_LEN],
    encoded: &str,
) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
    let raw = BASE64.decode(encoded)?;
    if raw.len() < NONCE_LEN {
        return Err("payload too short".into());
    }
    let (nonce, ct) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| format!("{:?}", e))?;
    Ok(cipher.decrypt(nonce.into(), ct)?)
}

/// A persisted session row with its decrypted verdict payload.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub id: String,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub stop_reason: Option<String>,
    pub verdict_json: Option<String>,
}

pub struct SessionStore {
    conn: Mutex<Connection>,
    key: [u8; KEY_LEN],
}

impl SessionStore {
    /// Open or create DB at path. Key is derived from `secret` (in production: device-bound).
    pub fn open(path: &Path, secret: &[u8]) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                started_at INTEGER NOT NULL,
                ended_at INTEGER,
                stop_reason TEXT,
                verdict_enc TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at);
            CREATE TABLE IF NOT EXISTS predictions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                ts INTEGER NOT NULL,
                score REAL,
                payload_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_predictions_session ON predictions(session_id);
            CREATE TABLE IF NOT EXISTS meta (k TEXT PRIMARY KEY, v TEXT);
            "#,
        )?;
        let key = derive_key(secret);
        Ok(Self {
            conn: Mutex::new(conn),
            key,
        })
    }

    /// Insert one scored prediction (payload stored encrypted)
    pub fn insert_prediction(
        &self,
        session_id: &str,
        ts: i64,
        score: Option<f64>,
        payload_json: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let enc = encrypt(&self.key, payload_json.as_bytes())?;
        self.conn
            .lock()
            .map_err(|_| "store lock poisoned")?
            .execute(
                "INSERT INTO predictions (session_id, ts, score, payload_enc) VALUES (?1, ?2, ?3, ?4)",
                params![session_id, ts, score, enc],
            )?;
        Ok(())
    }

    /// Insert or replace a finalized session (verdict stored encrypted)
    pub fn insert_session(
        &self,
        id: &str,
        started_at: i64,
        ended_at: Option<i64>,
        stop_reason: &str,
        verdict_json: Option<&str>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let verdict_enc = match verdict_json {
            Some(v) => Some(encrypt(&self.key, v.as_bytes())?),
            None => None,
        };
        self.conn
            .lock()
            .map_err(|_| "store lock poisoned")?
            .execute(
                "INSERT OR REPLACE INTO sessions (id, started_at, ended_at, stop_reason, verdict_enc) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, started_at, ended_at, stop_reason, verdict_enc],
            )?;
        Ok(())
    }

    /// Read a session by id (decrypt verdict payload)
    pub fn get_session(
        &self,
        id: &str,
    ) -> Result<Option<StoredSession>, Box<dyn std::error::Error + Send + Sync>> {
        let conn = self.conn.lock().map_err(|_| "store lock poisoned")?;
        let mut stmt = conn.prepare(
            "SELECT started_at, ended_at, stop_reason, verdict_enc FROM sessions WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            let started_at: i64 = row.get(0)?;
            let ended_at: Option<i64> = row.get(1)?;
            let stop_reason: Option<String> = row.get(2)?;
            let verdict_enc: Option<String> = row.get(3)?;
            let verdict_json = match verdict_enc {
                Some(enc) => {
                    let plain = decrypt(&self.key, &enc)?;
                    Some(String::from_utf8(plain).unwrap_or_default())
                }
                None => None,
            };
            return Ok(Some(StoredSession {
                id: id.to_string(),
                started_at,
                ended_at,
                stop_reason,
                verdict_json,
            }));
        }
        Ok(None)
    }

    /// Decrypted prediction payloads for one session, in insertion order
    pub fn session_predictions(
        &self,
        session_id: &str,
    ) -> Result<Vec<(i64, Option<f64>, String)>, Box<dyn std::error::Error + Send + Sync>> {
        let conn = self.conn.lock().map_err(|_| "store lock poisoned")?;
        let mut stmt = conn.prepare(
            "SELECT ts, score, payload_enc FROM predictions WHERE session_id = ?1 ORDER BY seq",
        )?;
        let mut rows = stmt.query(params![session_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let ts: i64 = row.get(0)?;
            let score: Option<f64> = row.get(1)?;
            let enc: String = row.get(2)?;
            let plain = decrypt(&self.key, &enc)?;
            out.push((ts, score, String::from_utf8(plain).unwrap_or_default()));
        }
        Ok(out)
    }

    /// Most recent session ids, newest first
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<String>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt =
            conn.prepare("SELECT id FROM sessions ORDER BY started_at DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
        rows.collect()
    }

    /// Retention: delete sessions and predictions older than given timestamp
    pub fn prune_before(&self, ts: i64) -> Result<u64, rusqlite::Error> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let a = conn.execute("DELETE FROM predictions WHERE ts < ?1", params![ts])?;
        let b = conn.execute(
            "DELETE FROM sessions WHERE started_at < ?1",
            params![ts],
        )?;
        Ok((a + b) as u64)
    }
}
