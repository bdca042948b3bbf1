//! Uplink sink: report agent presence and session verdicts to the central
//! fleet API. Delivery is best-effort; failures are logged by the fan-out
//! worker and never reach the pipeline.

use crate::config::UplinkConfig;
use crate::session::SessionVerdict;
use crate::sink::{EventSink, OutboundEvent, SinkError};
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Payloads for the fleet API (align with its ingest endpoints).
#[derive(Serialize)]
struct AgentPayload {
    node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_seen: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_seen: Option<String>,
}

#[derive(Serialize)]
struct VerdictPayload {
    id: String,
    session_id: String,
    decision: String,
    anomaly_percentage: f64,
    avg_score: f64,
    total_predictions: usize,
    ts: String,
    source: String,
}

pub struct UplinkSink {
    client: reqwest::blocking::Client,
    base_url: String,
    agent_id: String,
    agent_registered: std::sync::atomic::AtomicBool,
}

impl UplinkSink {
    pub fn new(config: UplinkConfig) -> Option<Self> {
        let endpoint = config.endpoint.as_ref()?.trim_end_matches('/');
        let agent_id = config
            .agent_id
            .clone()
            .unwrap_or_else(|| "local-agent".to_string());
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .ok()?;
        Some(Self {
            client,
            base_url: endpoint.to_string(),
            agent_id,
            agent_registered: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), String> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().unwrap_or_default();
            return Err(format!("{} {}", status, text));
        }
        Ok(())
    }

    /// Register this agent once (idempotent).
    fn ensure_agent(&self) -> Result<(), String> {
        if self
            .agent_registered
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            return Ok(());
        }
        let now = Utc::now().to_rfc3339();
        let payload = AgentPayload {
            node_id: self.agent_id.clone(),
            first_seen: Some(now.clone()),
            last_seen: Some(now),
        };
        self.post("/api/v1/agents", &payload)?;
        self.agent_registered
            .store(true, std::sync::atomic::Ordering::Relaxed);
        info!(agent_id = %self.agent_id, "uplink agent registered");
        Ok(())
    }

    fn report_verdict(&self, session_id: &str, verdict: &SessionVerdict) -> Result<(), String> {
        self.ensure_agent()?;
        let payload = VerdictPayload {
            id: format!("verdict_{}_{}", self.agent_id, session_id),
            session_id: session_id.to_string(),
            decision: verdict.decision.as_str().to_string(),
            anomaly_percentage: verdict.anomaly_percentage,
            avg_score: verdict.avg_score,
            total_predictions: verdict.total_predictions,
            ts: Utc::now().to_rfc3339(),
            source: self.agent_id.clone(),
        };
        self.post("/api/v1/verdicts", &payload)?;
        info!(session_id, decision = ?verdict.decision, "uplink verdict reported");
        Ok(())
    }
}

impl EventSink for UplinkSink {
    fn name(&self) -> &str {
        "uplink"
    }

    fn deliver(&self, event: &OutboundEvent) -> Result<(), SinkError> {
        match event {
            OutboundEvent::Verdict {
                session_id,
                verdict,
            } => self
                .report_verdict(session_id, verdict)
                .map_err(SinkError::from),
            _ => Ok(()),
        }
    }
}
