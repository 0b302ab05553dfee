//! Typed watch notifications.

use fleet_api::{Binding, BindingKey};
use futures_core::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// An infinite stream of watch notifications.
///
/// Yielding an `Err` means the subscription is broken; the consumer
/// re-subscribes via [`crate::BindingStore::watch`].
pub type BindingEventStream = BoxStream<'static, Result<BindingEvent, StoreError>>;

/// A change notification, already carrying the concrete binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BindingEvent {
    /// A binding was created.
    Created {
        /// The new binding.
        binding: Binding,
    },

    /// A binding was updated.
    Updated {
        /// State before the update, when the store has it.
        old: Option<Binding>,
        /// State after the update.
        new: Binding,
    },

    /// A binding was deleted.
    Deleted {
        /// Last observed state.
        binding: Binding,
    },
}

impl BindingEvent {
    /// The binding as of this event.
    pub fn binding(&self) -> &Binding {
        match self {
            Self::Created { binding } | Self::Deleted { binding } => binding,
            Self::Updated { new, .. } => new,
        }
    }

    /// Queue key of the affected binding.
    pub fn key(&self) -> BindingKey {
        self.binding().key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let mut binding = Binding::default();
        binding.metadata.namespace = "prod".to_string();
        binding.metadata.name = "web".to_string();

        let event = BindingEvent::Updated {
            old: None,
            new: binding,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"updated""#));

        let back: BindingEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.key().to_string(), "prod/web");
    }
}
