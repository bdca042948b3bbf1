//! Encrypted local storage for predictions and finalized sessions.

mod encrypted;

pub use encrypted::{SessionStore, StoredSession};
