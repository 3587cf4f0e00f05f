//! AFM Control API message types: command envelope and reply classification.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Property value sent with the `APIEcho` connection test.
pub const ECHO_PROPERTY: &str = "connection test";

/// Object name of the server-side echo diagnostic.
pub const API_ECHO_OBJECT: &str = "APIEcho";

/// Top-level command envelope shared by requests and replies.
///
/// Field order matters: it fixes the serialized key order, so
/// [`Envelope::authenticate`] and [`Envelope::api_echo`] produce exactly the
/// frames the server documents. Absent fields are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Command discriminator.
    pub command: CommandKind,
    /// Target object (e.g. `"APIEcho"`, `"Authenticated"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    /// Object-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// API key, only present on `authenticate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apikey: Option<String>,
}

/// Discriminator for the `command` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Client → Server authentication.
    Authenticate,
    /// Client → Server property read.
    Get,
    /// Server → Client reply to a command.
    Response,
    /// Server → Client error.
    Error,
    /// Any command this client does not know.
    #[serde(other)]
    Unknown,
}

impl Envelope {
    /// Builds `{"command":"authenticate","apikey":"<key>"}`.
    #[must_use]
    pub fn authenticate(api_key: &SecretString) -> Self {
        Self {
            command: CommandKind::Authenticate,
            object: None,
            payload: None,
            apikey: Some(api_key.expose_secret().to_string()),
        }
    }

    /// Builds `{"command":"get","object":"APIEcho","payload":{"property":"<property>"}}`.
    #[must_use]
    pub fn api_echo(property: &str) -> Self {
        Self {
            command: CommandKind::Get,
            object: Some(API_ECHO_OBJECT.to_string()),
            payload: Some(serde_json::json!({ "property": property })),
            apikey: None,
        }
    }

    /// Serializes the envelope into a single-line JSON text frame body.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the payload cannot be serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Request/reply pair the runner is currently performing.
///
/// There is never more than one outstanding request; the exchange names the
/// step in transcript lines and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    /// `authenticate` request and its reply.
    Authenticate,
    /// `APIEcho` get request and its reply.
    ApiEcho,
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authenticate => f.write_str("authenticate"),
            Self::ApiEcho => f.write_str(API_ECHO_OBJECT),
        }
    }
}

/// A reply exactly as received, plus its best-effort decoded envelope.
///
/// The text is what the transcript shows; the envelope is only used for
/// structured logging and never changes the run's control flow.
#[derive(Debug, Clone)]
pub struct Reply {
    text: String,
    envelope: Option<Envelope>,
}

impl Reply {
    /// Wraps a received text message. Non-JSON replies are kept as-is.
    #[must_use]
    pub fn parse(text: impl Into<String>) -> Self {
        let text = text.into();
        let envelope = serde_json::from_str(&text).ok();
        Self { text, envelope }
    }

    /// The reply text, verbatim.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns `true` for `"command":"error"` replies.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.envelope
            .as_ref()
            .is_some_and(|env| env.command == CommandKind::Error)
    }

    /// The `object` of the reply, if any.
    #[must_use]
    pub fn object(&self) -> Option<&str> {
        self.envelope.as_ref()?.object.as_deref()
    }

    /// Error details: `payload.details`, then a top-level `message`, then
    /// `"Unknown error"`. Returns `None` for non-error replies.
    #[must_use]
    pub fn error_details(&self) -> Option<String> {
        if !self.is_error() {
            return None;
        }
        let raw: Option<serde_json::Value> = serde_json::from_str(&self.text).ok();
        let details = raw.as_ref().and_then(|value| {
            value
                .pointer("/payload/details")
                .or_else(|| value.get("message"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        });
        Some(details.unwrap_or_else(|| "Unknown error".to_string()))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
