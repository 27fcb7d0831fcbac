//! Shared type definitions for the Afterhours chat simulation.
//!
//! This crate is the single source of truth for the data model shared by
//! the simulation core, the runner, and (via `ts-rs`) the chat UI.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for message and context identifiers
//! - [`enums`] -- Actor kinds, message kinds, relationship levels, sentiment
//! - [`structs`] -- Actors, channels, messages, conversations, relationships
//! - [`envelope`] -- Cross-context broadcast envelope

pub mod enums;
pub mod envelope;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{ActorKind, InteractionKind, MessageKind, RelationshipLevel, Sentiment};
pub use envelope::{Envelope, Stamped, VirtualMessage};
pub use ids::{MessageId, SourceId};
pub use structs::{
    Actor, BehaviorProfile, Channel, DirectConversation, InteractionRecord, Message,
    RelationshipRecord, Target,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for the chat UI.

    #[test]
    fn export_bindings() {
        use ts_rs::TS;

        let _ = crate::ids::MessageId::export_all();
        let _ = crate::ids::SourceId::export_all();
        let _ = crate::enums::ActorKind::export_all();
        let _ = crate::enums::MessageKind::export_all();
        let _ = crate::enums::RelationshipLevel::export_all();
        let _ = crate::structs::Actor::export_all();
        let _ = crate::structs::Channel::export_all();
        let _ = crate::structs::DirectConversation::export_all();
        let _ = crate::structs::Target::export_all();
        let _ = crate::envelope::Envelope::export_all();
    }
}
