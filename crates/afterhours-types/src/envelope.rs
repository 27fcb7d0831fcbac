//! Cross-context broadcast envelope.
//!
//! Open contexts (tabs, windows) observing the same simulation exchange
//! synthetic messages over a same-origin publish/subscribe channel. The
//! wire shape is `{"type": "virtualMessage", "data": {...}}`.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::SourceId;
use crate::structs::Message;

/// Payload of a `virtualMessage` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct VirtualMessage {
    /// The message being mirrored.
    pub message: Message,
    /// Channel the message belongs to.
    pub channel_name: String,
}

/// A message travelling between contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "data")]
#[ts(export, export_to = "bindings/")]
pub enum Envelope {
    /// A synthetic message produced by the publishing context.
    #[serde(rename = "virtualMessage")]
    VirtualMessage(VirtualMessage),
}

/// An [`Envelope`] stamped with the context that published it, so a
/// context can ignore its own traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamped {
    /// Publishing context.
    pub source: SourceId,
    /// The envelope itself.
    pub envelope: Envelope,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::enums::MessageKind;

    #[test]
    fn envelope_wire_shape() {
        let message = Message::new("nova", "hi all", MessageKind::Ai, Utc::now());
        let envelope = Envelope::VirtualMessage(VirtualMessage {
            message,
            channel_name: "#lobby".to_owned(),
        });
        let value = serde_json::to_value(&envelope).unwrap_or_default();
        assert_eq!(value["type"], "virtualMessage");
        assert_eq!(value["data"]["channelName"], "#lobby");
        assert_eq!(value["data"]["message"]["author"], "nova");
    }
}
