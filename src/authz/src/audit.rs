//! Audit trail for access decisions
//!
//! Every decision the engine returns, cached or not, is emitted as an
//! [`AuditEvent`] to each registered [`AuditSink`]. Sinks run inline on the
//! request path and must not block; [`ChannelAuditSink`] hands events off to
//! a consumer task and drops them when the consumer falls behind.

use crate::types::{AccessDecision, AccessRequest};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One audited decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub user_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
    pub granted: bool,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn from_decision(request: &AccessRequest, decision: &AccessDecision) -> Self {
        Self {
            user_id: request.subject.user_id.clone(),
            resource_type: request.resource.resource_type.clone(),
            resource_id: request.resource.id.clone(),
            action: request.action.clone(),
            granted: decision.granted,
            reason: decision.reason.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Observer of access decisions
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Fan-out to every subscribed sink
#[derive(Default)]
pub struct AuditHub {
    sinks: RwLock<Vec<Arc<dyn AuditSink>>>,
}

impl AuditHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sinks(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self {
            sinks: RwLock::new(sinks),
        }
    }

    /// Register a sink; it sees decisions made from now on
    pub fn subscribe(&self, sink: Arc<dyn AuditSink>) {
        self.sinks.write().push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn emit(&self, event: &AuditEvent) {
        // Snapshot so a sink can subscribe another sink without deadlocking
        let sinks: Vec<Arc<dyn AuditSink>> = self.sinks.read().clone();
        for sink in sinks {
            sink.record(event);
        }
    }
}

/// Writes events as structured `tracing` records under the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        info!(
            target: "audit",
            user_id = %event.user_id,
            resource_type = %event.resource_type,
            resource_id = %event.resource_id,
            action = %event.action,
            granted = event.granted,
            reason = %event.reason,
            timestamp = %event.timestamp.to_rfc3339(),
            "access decision"
        );
    }
}

/// Forwards events to a bounded channel without waiting
pub struct ChannelAuditSink {
    sender: mpsc::Sender<AuditEvent>,
    dropped: AtomicUsize,
}

impl ChannelAuditSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                dropped: AtomicUsize::new(0),
            },
            receiver,
        )
    }

    /// Events discarded because the channel was full or closed
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Err(e) = self.sender.try_send(event.clone()) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped.is_power_of_two() {
                warn!("Audit channel dropped {} events: {}", dropped, e);
            }
        }
    }
}

/// Keeps every event in memory
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}
