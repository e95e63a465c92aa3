//! Workflow events
//!
//! Every observable state change is published on a broadcast channel so UI
//! layers, loggers and tests can follow the engine without polling it.

use serde::Serialize;
use tokio::sync::broadcast;
use wayfinder_core::{AuthContext, Fingerprint, Hint, Mode, StepId};

/// Observable engine event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// Step data was written
    StepChanged {
        /// Written step
        step: StepId,
        /// Completion predicate after the write
        complete: bool,
    },

    /// Sections became visible
    SectionsUnlocked {
        /// Newly visible sections in order
        sections: Vec<StepId>,
    },

    /// Mode of the guided flow changed
    ModeChanged {
        /// New mode
        mode: Mode,
        /// Section the switch was requested from
        section: StepId,
    },

    /// Cursor moved to another section
    StepAdvanced {
        /// Previous section
        from: StepId,
        /// New section
        to: StepId,
    },

    /// A new analysis discarded downstream results
    Invalidated {
        /// Fingerprint the discarded results belonged to
        previous: Fingerprint,
        /// Fingerprint of the new analysis
        current: Fingerprint,
    },

    /// Session reset to a fresh analysis
    Reset,

    /// A gated action is waiting for authentication
    AuthPrompt {
        /// Dialog to show
        context: AuthContext,
        /// What the user tried to do
        action: String,
    },

    /// The auth flow finished
    AuthResolved {
        /// Whether a deferred action ran
        resumed: bool,
    },

    /// A background job reported progress
    JobProgress {
        /// Job identifier
        job_id: String,
        /// Percentage, when the job reports one
        progress: Option<u8>,
    },

    /// Message for the user
    Hint(Hint),
}

/// Broadcast channel carrying [`WorkflowEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; dropped when nobody listens
    pub fn publish(&self, event: WorkflowEvent) {
        match self.sender.send(event) {
            Ok(receivers) => tracing::trace!(receivers, "event published"),
            Err(_) => tracing::trace!("event published without subscribers"),
        }
    }

    /// Subscribe to future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(WorkflowEvent::Reset);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();

        bus.publish(WorkflowEvent::Reset);
        bus.publish(WorkflowEvent::SectionsUnlocked {
            sections: vec![StepId::Audience],
        });

        assert_eq!(rx.recv().await.unwrap(), WorkflowEvent::Reset);
        assert_eq!(
            rx.recv().await.unwrap(),
            WorkflowEvent::SectionsUnlocked {
                sections: vec![StepId::Audience]
            }
        );
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(WorkflowEvent::StepAdvanced {
            from: StepId::Home,
            to: StepId::Audience,
        })
        .unwrap();
        assert_eq!(json["type"], "step_advanced");
        assert_eq!(json["to"], "audience");
    }
}
