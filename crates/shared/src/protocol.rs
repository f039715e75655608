//! Frame envelope and typed events exchanged over the real-time socket.
//!
//! Every frame is a JSON object whose `type` field is the dispatch key.
//! Server-pushed frames carry their payload under `data`:
//!
//! ```json
//! { "type": "chat_message", "data": { "senderId": "u1", "content": "hi" } }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FrameError;
use crate::models::{ChatMessage, GroupInvitation, GroupMessage, JoinRequest, UserStatus};

/// Field holding the dispatch key.
pub const TYPE_FIELD: &str = "type";
/// Field holding the event-specific payload.
pub const DATA_FIELD: &str = "data";

/// A decoded inbound frame: the dispatch key plus the full parsed object.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub event_type: String,
    pub value: Value,
}

/// Parse raw frame text into an [`InboundFrame`].
///
/// Only the envelope is checked (a JSON object with a string `type`); the
/// payload stays opaque.
pub fn parse_frame(text: &str) -> Result<InboundFrame, FrameError> {
    let value: Value = serde_json::from_str(text).map_err(FrameError::NotJson)?;
    let object = value.as_object().ok_or(FrameError::NotAnObject)?;
    let event_type = object
        .get(TYPE_FIELD)
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingType)?
        .to_string();

    Ok(InboundFrame { event_type, value })
}

/// A payload type bound to exactly one frame `type`.
///
/// Lets subscribers register for a concrete struct instead of raw JSON; the
/// erased frame is narrowed with [`EventPayload::from_frame`] at delivery.
pub trait EventPayload: DeserializeOwned + Send + 'static {
    const EVENT_TYPE: &'static str;

    /// Deserialize this payload from a full frame object's `data` field.
    fn from_frame(frame: &Value) -> Result<Self, FrameError> {
        let data = frame.get(DATA_FIELD).cloned().unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|source| FrameError::Payload {
            event_type: Self::EVENT_TYPE.to_string(),
            source,
        })
    }
}

macro_rules! event_payload {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl EventPayload for $ty {
                const EVENT_TYPE: &'static str = $name;
            }
        )*
    };
}

event_payload! {
    ChatMessage => "chat_message",
    GroupMessage => "group_message",
    JoinRequest => "join_request",
    GroupInvitation => "group_invitation",
    UserStatus => "user_status",
}

/// Every server-pushed event this client knows how to interpret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ChatMessage(ChatMessage),
    GroupMessage(GroupMessage),
    JoinRequest(JoinRequest),
    GroupInvitation(GroupInvitation),
    UserStatus(UserStatus),
}

impl ServerEvent {
    /// All dispatch keys, in declaration order.
    pub const EVENT_TYPES: [&'static str; 5] = [
        ChatMessage::EVENT_TYPE,
        GroupMessage::EVENT_TYPE,
        JoinRequest::EVENT_TYPE,
        GroupInvitation::EVENT_TYPE,
        UserStatus::EVENT_TYPE,
    ];

    /// Narrow a parsed frame object into a typed event.
    pub fn from_frame(frame: &Value) -> Result<Self, FrameError> {
        let event_type = frame
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingType)?;

        if !Self::EVENT_TYPES.contains(&event_type) {
            return Err(FrameError::UnknownType(event_type.to_string()));
        }

        serde_json::from_value(frame.clone()).map_err(|source| FrameError::Payload {
            event_type: event_type.to_string(),
            source,
        })
    }

    /// The `type` key this event is sent under.
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::ChatMessage(_) => ChatMessage::EVENT_TYPE,
            ServerEvent::GroupMessage(_) => GroupMessage::EVENT_TYPE,
            ServerEvent::JoinRequest(_) => JoinRequest::EVENT_TYPE,
            ServerEvent::GroupInvitation(_) => GroupInvitation::EVENT_TYPE,
            ServerEvent::UserStatus(_) => UserStatus::EVENT_TYPE,
        }
    }
}

/// Commands the client pushes to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        recipient_id: String,
        content: String,
        nonce: String,
    },
    #[serde(rename_all = "camelCase")]
    GroupMessage {
        group_id: String,
        content: String,
        nonce: String,
    },
    #[serde(rename_all = "camelCase")]
    Typing { conversation_id: String },
}

impl ClientCommand {
    /// Direct message with a fresh nonce for matching the server's echo.
    pub fn chat_message(recipient_id: impl Into<String>, content: impl Into<String>) -> Self {
        ClientCommand::ChatMessage {
            recipient_id: recipient_id.into(),
            content: content.into(),
            nonce: new_nonce(),
        }
    }

    /// Group message with a fresh nonce.
    pub fn group_message(group_id: impl Into<String>, content: impl Into<String>) -> Self {
        ClientCommand::GroupMessage {
            group_id: group_id.into(),
            content: content.into(),
            nonce: new_nonce(),
        }
    }

    pub fn typing(conversation_id: impl Into<String>) -> Self {
        ClientCommand::Typing {
            conversation_id: conversation_id.into(),
        }
    }
}

fn new_nonce() -> String {
    uuid::Uuid::new_v4().to_string()
}
