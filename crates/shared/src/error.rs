//! Errors raised while decoding inbound frames.

use thiserror::Error;

/// Why an inbound text frame could not be turned into a dispatchable event.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame text is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),

    /// The frame parsed, but the top level is not a JSON object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// The object has no string `type` field to dispatch on.
    #[error("frame has no string `type` field")]
    MissingType,

    /// The `type` is known but its payload does not match the expected shape.
    #[error("invalid payload for `{event_type}`: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// The `type` is not one of the events this client understands.
    #[error("unknown event type `{0}`")]
    UnknownType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_missing_type() {
        assert_eq!(
            FrameError::MissingType.to_string(),
            "frame has no string `type` field"
        );
    }

    #[test]
    fn display_unknown_type() {
        let err = FrameError::UnknownType("poke".to_string());
        assert_eq!(err.to_string(), "unknown event type `poke`");
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FrameError>();
    }
}
