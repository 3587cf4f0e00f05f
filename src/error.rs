//! Client error types with platform code mapping.
//!
//! [`ClientError`] is the central error type for the connection examples.
//! Every transport variant carries the numeric platform code that the
//! console transcript reports (an OS `errno`, an HTTP status for a rejected
//! upgrade, or a WebSocket close code).

use dns_lookup::LookupError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::ws::messages::Exchange;

/// Client-side error enum.
///
/// # Code sources
///
/// | Variant        | Code                                          |
/// |----------------|-----------------------------------------------|
/// | `InvalidInput` | `0`                                           |
/// | `Io`           | OS error number, `0` if unknown               |
/// | `Handshake`    | OS error number or HTTP status of the upgrade |
/// | `Resolve`      | `getaddrinfo` error number                    |
/// | `Send`         | OS error number, `0` for protocol errors      |
/// | `Receive`      | OS error number or peer close code            |
/// | `Encode`       | `0`                                           |
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Operator input was missing or failed validation.
    #[error("{0}")]
    InvalidInput(String),

    /// Reading the console or writing the transcript failed.
    #[error("console I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The TCP connect or the HTTP upgrade failed.
    #[error("Handshake failed: {code} ({source})")]
    Handshake {
        /// Platform code for the failure.
        code: u32,
        /// Underlying transport error.
        source: WsError,
    },

    /// The host name could not be resolved.
    #[error("Handshake failed: {code} (cannot resolve {host}: {detail})")]
    Resolve {
        /// Host as entered.
        host: String,
        /// Resolver (`getaddrinfo`) error number, sign dropped.
        code: u32,
        /// Human-readable description.
        detail: String,
    },

    /// Writing a command frame failed.
    #[error("Send ({exchange}) failed: {code} ({source})")]
    Send {
        /// Exchange the frame belonged to.
        exchange: Exchange,
        /// Platform code for the failure.
        code: u32,
        /// Underlying transport error.
        source: WsError,
    },

    /// Reading the reply failed or the reply was not a text message.
    #[error("Receive ({exchange}) failed: {code} ({detail})")]
    Receive {
        /// Exchange the reply belonged to.
        exchange: Exchange,
        /// Platform code for the failure.
        code: u32,
        /// Human-readable description.
        detail: String,
    },

    /// A command envelope could not be serialized.
    #[error("failed to encode {exchange} message: {source}")]
    Encode {
        /// Exchange the envelope belonged to.
        exchange: Exchange,
        /// Underlying serializer error.
        source: serde_json::Error,
    },
}

impl ClientError {
    /// Wraps a connect/upgrade failure.
    #[must_use]
    pub fn handshake(source: WsError) -> Self {
        Self::Handshake {
            code: platform_code(&source),
            source,
        }
    }

    /// Wraps a name-resolution failure.
    #[must_use]
    pub fn resolve(host: &str, err: LookupError) -> Self {
        Self::Resolve {
            host: host.to_string(),
            code: err.error_num().unsigned_abs(),
            detail: std::io::Error::from(err).to_string(),
        }
    }

    /// Wraps a frame write failure.
    #[must_use]
    pub fn send(exchange: Exchange, source: WsError) -> Self {
        Self::Send {
            exchange,
            code: platform_code(&source),
            source,
        }
    }

    /// Wraps a frame read failure.
    #[must_use]
    pub fn receive(exchange: Exchange, source: &WsError) -> Self {
        Self::Receive {
            exchange,
            code: platform_code(source),
            detail: source.to_string(),
        }
    }

    /// The peer closed the connection (or the stream ended) before replying.
    #[must_use]
    pub fn closed_before_reply(exchange: Exchange, close_code: Option<u16>) -> Self {
        let detail = match close_code {
            Some(code) => format!("connection closed by server with status {code}"),
            None => "connection closed before a reply arrived".to_string(),
        };
        Self::Receive {
            exchange,
            code: close_code.map_or(0, u32::from),
            detail,
        }
    }

    /// The reply arrived as a binary frame instead of UTF-8 text.
    #[must_use]
    pub fn binary_reply(exchange: Exchange, len: usize) -> Self {
        Self::Receive {
            exchange,
            code: 0,
            detail: format!("expected a UTF-8 text message, got {len} binary bytes"),
        }
    }

    /// Returns the numeric platform code for this error (`0` if none applies).
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::Io(err) => os_code(err),
            Self::Handshake { code, .. }
            | Self::Resolve { code, .. }
            | Self::Send { code, .. }
            | Self::Receive { code, .. } => *code,
            Self::InvalidInput(_) | Self::Encode { .. } => 0,
        }
    }

    /// Returns the process exit status for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        1
    }
}

/// Extracts the platform code from a tungstenite error.
///
/// A rejected upgrade reports its HTTP status; transport failures report the
/// OS error number.
fn platform_code(err: &WsError) -> u32 {
    match err {
        WsError::Io(io) => os_code(io),
        WsError::Http(response) => u32::from(response.status().as_u16()),
        _ => 0,
    }
}

fn os_code(err: &std::io::Error) -> u32 {
    err.raw_os_error()
        .and_then(|code| u32::try_from(code).ok())
        .unwrap_or(0)
}
