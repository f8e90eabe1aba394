//! Scripted replays of inbox traffic.
//!
//! A script is a JSON-lines file, one [`ReplayStep`] per line, using the same
//! `{"type": ..., "payload": ...}` shape as the rest of the inbox events.
//! Blank lines and lines starting with `#` are ignored.
//!
//! Steps run one at a time: each step, including any backend call it starts,
//! settles before the next one is read. Backend controls such as `fail_next`
//! therefore always apply to the step right after them, and the report is the
//! same on every run.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::InboxSettings;
use crate::inbox::{
    BackendCalls, InMemoryBackend, InboundEvent, InboxEvent, InboxSnapshot, NotificationRecord,
    ReconciliationEngine, RecordingView, UserAction, ViewEffect,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ReplayStep {
    /// Attach an in-memory backend holding these notifications.
    BackendReady {
        #[serde(default)]
        archive: Vec<NotificationRecord>,
    },
    FirstResponse {
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        records: Vec<NotificationRecord>,
    },
    Stream(InboundEvent),
    CountsUpdated {
        unread_count: usize,
    },
    Open {
        id: String,
    },
    ReadAll,
    LoadMore,
    Refresh,
    Settings,
    /// Make the backend report a fetch in flight (or not).
    SetPolling {
        polling: bool,
    },
    /// Make the next backend call fail.
    FailNext {
        message: String,
    },
}

/// Outcome of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub snapshot: InboxSnapshot,
    pub effects: Vec<ViewEffect>,
    pub backend_calls: Option<BackendCalls>,
}

pub fn parse_script(script: &str) -> Result<Vec<ReplayStep>> {
    script
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid replay step on line {}", index + 1))
        })
        .collect()
}

/// Run the steps against a fresh engine, in order, each to completion.
pub async fn replay(settings: InboxSettings, steps: Vec<ReplayStep>) -> Result<ReplayReport> {
    let view = Arc::new(RecordingView::new());
    let mut engine = ReconciliationEngine::new(settings, view.clone());
    let mut backend: Option<Arc<InMemoryBackend>> = None;

    info!("Replaying {} steps", steps.len());

    for step in steps {
        let event = match step {
            ReplayStep::BackendReady { archive } => {
                let in_memory = Arc::new(InMemoryBackend::new(archive));
                backend = Some(in_memory.clone());
                InboxEvent::BackendReady(in_memory)
            }
            ReplayStep::FirstResponse { error, records } => {
                InboxEvent::FirstResponse(match error {
                    Some(message) => Err(anyhow!(message)),
                    None => Ok(records),
                })
            }
            ReplayStep::Stream(event) => InboxEvent::Stream(event),
            ReplayStep::CountsUpdated { unread_count } => {
                InboxEvent::CountsUpdated { unread_count }
            }
            ReplayStep::Open { id } => InboxEvent::Action(UserAction::Open { id }),
            ReplayStep::ReadAll => InboxEvent::Action(UserAction::ReadAll),
            ReplayStep::LoadMore => InboxEvent::Action(UserAction::LoadMore),
            ReplayStep::Refresh => InboxEvent::Action(UserAction::Refresh),
            ReplayStep::Settings => InboxEvent::Action(UserAction::Settings),
            ReplayStep::SetPolling { polling } => {
                match &backend {
                    Some(backend) => backend.set_polling(polling),
                    None => warn!("set_polling before backend_ready, ignored"),
                }
                continue;
            }
            ReplayStep::FailNext { message } => {
                match &backend {
                    Some(backend) => backend.fail_next(message).await,
                    None => warn!("fail_next before backend_ready, ignored"),
                }
                continue;
            }
        };

        engine.dispatch(event).await;
    }

    Ok(ReplayReport {
        snapshot: engine.snapshot(),
        effects: view.take(),
        backend_calls: backend.map(|b| b.calls()),
    })
}
