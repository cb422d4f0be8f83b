//! Match service: the one context object behind the ingest surface.
//!
//! Owns the session, the detector baseline, the notifier and the hub.
//! Every call checks the shared secret before touching state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gamecast_core::detect::{ChangeDetector, DetectorConfig};
use gamecast_core::payload::{LiveGamePayload, PayloadError};
use gamecast_core::session::{Session, SessionError, SessionState};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::hub::BroadcastHub;
use crate::notifier::Notifier;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid secret token")]
    Unauthorized,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Outcome of one ingest call. Commentary failures land in `error`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct IngestReport {
    pub events: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
    pub delivered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusReport {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    pub subscribers: usize,
}

pub struct MatchService {
    secret: String,
    session: Mutex<SessionState>,
    detector: Mutex<ChangeDetector>,
    notifier: Notifier,
    hub: Arc<BroadcastHub>,
}

impl MatchService {
    pub fn new(
        secret: impl Into<String>,
        detector: DetectorConfig,
        notifier: Notifier,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            secret: secret.into(),
            session: Mutex::new(SessionState::default()),
            detector: Mutex::new(ChangeDetector::new(detector)),
            notifier,
            hub,
        }
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    fn authorize(&self, token: &str) -> Result<(), ServiceError> {
        if token != self.secret {
            return Err(ServiceError::Unauthorized);
        }
        Ok(())
    }

    pub async fn establish(&self, token: &str, user: &str) -> Result<Session, ServiceError> {
        self.authorize(token)?;
        let session = self
            .session
            .lock()
            .await
            .establish(user, token, Utc::now())?
            .clone();
        self.detector.lock().await.reset();
        tracing::info!(user, "ingest: session established");
        Ok(session)
    }

    /// End the session and forget the baseline.
    pub async fn disconnect(&self, token: &str, user: &str) -> Result<Session, ServiceError> {
        self.authorize(token)?;
        let session = self.session.lock().await.end(user, Utc::now())?;
        self.detector.lock().await.reset();
        tracing::info!(user, "ingest: session ended");
        Ok(session)
    }

    pub async fn status(&self) -> StatusReport {
        let (state, session) = {
            let st = self.session.lock().await;
            (st.as_str(), st.session().cloned())
        };
        StatusReport {
            state,
            user: session.as_ref().map(|s| s.user.clone()),
            created_at: session.as_ref().map(|s| s.created_at),
            last_activity: session.as_ref().map(|s| s.last_activity),
            subscribers: self.hub.subscriber_count().await,
        }
    }

    /// Validate, detect, narrate, broadcast.
    pub async fn ingest(
        &self,
        token: &str,
        payload: serde_json::Value,
    ) -> Result<IngestReport, ServiceError> {
        self.authorize(token)?;
        self.session.lock().await.touch(token, Utc::now())?;

        let snapshot = LiveGamePayload::from_json(payload)?.into_snapshot()?;
        let events = self.detector.lock().await.detect(snapshot.clone());

        let mut report = IngestReport {
            events: events.iter().map(|e| e.kind().as_str()).collect(),
            ..Default::default()
        };
        if events.is_empty() {
            return Ok(report);
        }
        tracing::info!(events = ?report.events, "ingest: changes detected");

        match self.notifier.notify(&events, &snapshot).await {
            Ok(None) => {}
            Ok(Some(notification)) => {
                report.commentary = Some(notification.text.clone());
                match self.hub.broadcast(&notification).await {
                    Ok(broadcast) => report.delivered = broadcast.delivered,
                    Err(e) => {
                        tracing::warn!(error = %e, "ingest: broadcast failed");
                        report.error = Some(e.to_string());
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "ingest: notification skipped");
                report.error = Some(e.to_string());
            }
        }

        Ok(report)
    }
}
