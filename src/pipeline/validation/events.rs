//! Typed event notifications, delivered over an explicitly wired channel.
//!
//! Emission is fire-and-forget: a closed or absent receiver never fails the
//! operation that emitted the event. Consumers must tolerate duplicates and
//! out-of-order arrival.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{BatchCounts, ResolutionMethod, ValidationStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ValidatorEvent {
    #[serde(rename = "validation.started")]
    ValidationStarted { contract_id: Uuid, file_count: u32 },

    #[serde(rename = "validation.completed")]
    ValidationCompleted {
        contract_id: Uuid,
        total: u32,
        validated: u32,
        needs_suffix: u32,
        unrecognized: u32,
        errors: u32,
        duplicates: u32,
    },

    #[serde(rename = "document.resolved")]
    DocumentResolved {
        contract_id: Uuid,
        document_id: Uuid,
        manifest_item_id: Option<Uuid>,
        status: ValidationStatus,
        method: ResolutionMethod,
        confidence: Option<f64>,
    },

    #[serde(rename = "grdt.created")]
    GrdtCreated {
        contract_id: Uuid,
        batch_id: Uuid,
        grdt_number: String,
    },

    #[serde(rename = "grdt.assigned")]
    GrdtAssigned {
        contract_id: Uuid,
        batch_id: Uuid,
        document_ids: Vec<Uuid>,
    },

    #[serde(rename = "grdt.finalized")]
    BatchFinalized {
        contract_id: Uuid,
        batch_id: Uuid,
        counts: BatchCounts,
    },
}

impl ValidatorEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValidationStarted { .. } => "validation.started",
            Self::ValidationCompleted { .. } => "validation.completed",
            Self::DocumentResolved { .. } => "document.resolved",
            Self::GrdtCreated { .. } => "grdt.created",
            Self::GrdtAssigned { .. } => "grdt.assigned",
            Self::BatchFinalized { .. } => "grdt.finalized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEnvelope {
    #[serde(flatten)]
    pub event: ValidatorEvent,
    pub timestamp: DateTime<Utc>,
}

/// Sending half of the event channel. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<EventEnvelope>>,
}

impl EventSink {
    /// A sink and the receiver that observes it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ValidatorEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        let kind = event.kind();
        let envelope = EventEnvelope {
            event,
            timestamp: Utc::now(),
        };
        if tx.send(envelope).is_err() {
            tracing::debug!(kind, "Event receiver dropped, event discarded");
        }
    }
}
