//! Persistence sink: writes predictions and finalized sessions to the
//! local encrypted store.

use super::{EventSink, OutboundEvent, SinkError};
use crate::storage::SessionStore;
use std::sync::Arc;

pub struct StoreSink {
    store: Arc<SessionStore>,
}

impl StoreSink {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

impl EventSink for StoreSink {
    fn name(&self) -> &str {
        "store"
    }

    fn deliver(&self, event: &OutboundEvent) -> Result<(), SinkError> {
        match event {
            OutboundEvent::Prediction {
                session_id,
                timestamp,
                prediction,
                ..
            } => {
                let payload = serde_json::to_string(prediction)?;
                self.store.insert_prediction(
                    session_id,
                    (timestamp * 1000.0) as i64,
                    Some(prediction.score),
                    &payload,
                )?;
            }
            OutboundEvent::SessionStopped {
                session_id,
                started_at,
                ended_at,
                reason,
                verdict,
            } => {
                let verdict_json = match verdict {
                    Some(v) => Some(serde_json::to_string(v)?),
                    None => None,
                };
                self.store.insert_session(
                    session_id,
                    started_at.timestamp_millis(),
                    ended_at.map(|t| t.timestamp_millis()),
                    reason.as_str(),
                    verdict_json.as_deref(),
                )?;
            }
            _ => {}
        }
        Ok(())
    }
}
