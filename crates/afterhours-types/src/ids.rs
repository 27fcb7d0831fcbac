//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Message identity must be unique across every open context that shares a
//! broadcast channel, so identifiers are UUID v7: time-ordered, therefore
//! monotonic within a process, and collision-free across processes.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id! {
    /// Unique identifier for a chat message.
    MessageId
}

define_id! {
    /// Identifier of one observing context (one tab or window) attached to
    /// the cross-context broadcast channel.
    SourceId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_are_monotonic() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert!(b > a, "v7 ids generated in sequence must sort in order");
    }

    #[test]
    fn id_roundtrip_serde() {
        let original = MessageId::new();
        let json = serde_json::to_string(&original).unwrap_or_default();
        let restored: Result<MessageId, _> = serde_json::from_str(&json);
        assert_eq!(restored.ok(), Some(original));
    }

    #[test]
    fn id_display_matches_uuid() {
        let id = SourceId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }
}
