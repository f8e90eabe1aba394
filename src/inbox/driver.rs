//! Runs an engine on a single task, feeding it events in arrival order.
//!
//! Backend calls started by an event run on their own tasks; their
//! completions come back into the same loop, so the engine keeps taking
//! stream events, counts and actions while a call is pending.

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error};

use super::engine::{Completion, InboxEvent, ReconciliationEngine};

/// Dispatch events until every sender is dropped and the calls still in
/// flight have settled, then hand the engine back.
pub async fn run(
    mut engine: ReconciliationEngine,
    mut events: mpsc::Receiver<InboxEvent>,
) -> ReconciliationEngine {
    let mut calls: JoinSet<Completion> = JoinSet::new();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    debug!("Dispatching {} event", event.topic());
                    if let Some(call) = engine.accept(event) {
                        calls.spawn(call);
                    }
                }
                None => break,
            },
            Some(settled) = calls.join_next(), if !calls.is_empty() => {
                settle(&mut engine, &mut calls, settled);
            }
        }
    }

    debug!(
        "Inbox event channel closed, waiting for {} backend calls",
        calls.len()
    );
    while let Some(settled) = calls.join_next().await {
        settle(&mut engine, &mut calls, settled);
    }
    engine
}

fn settle(
    engine: &mut ReconciliationEngine,
    calls: &mut JoinSet<Completion>,
    settled: Result<Completion, JoinError>,
) {
    match settled {
        Ok(completion) => {
            if let Some(call) = engine.accept(InboxEvent::Completed(completion)) {
                calls.spawn(call);
            }
        }
        Err(e) => error!("Backend call task failed: {}", e),
    }
}

/// Spawn [`run`] on the runtime. Returns the sender feeding it.
pub fn spawn(
    engine: ReconciliationEngine,
    capacity: usize,
) -> (mpsc::Sender<InboxEvent>, JoinHandle<ReconciliationEngine>) {
    let (tx, rx) = mpsc::channel(capacity);
    let handle = tokio::spawn(run(engine, rx));
    (tx, handle)
}
