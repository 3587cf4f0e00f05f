//! Connection parameters collected from the operator.
//!
//! The three values (API key, host, port) are always asked for on the
//! console. Environment variables (or a `.env` file via `dotenvy`) only
//! pre-fill the answer used when the operator just presses Enter:
//!
//! | Variable      | Default     |
//! |---------------|-------------|
//! | `AFM_API_KEY` | none        |
//! | `AFM_HOST`    | `127.0.0.1` |
//! | `AFM_PORT`    | `1234`      |

use std::fmt;
use std::io::{BufRead, Write};
use std::net::{IpAddr, Ipv6Addr};

use secrecy::{ExposeSecret, SecretString};

use crate::error::ClientError;

/// Host offered when `AFM_HOST` is not set.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port offered when `AFM_PORT` is not set or invalid.
pub const DEFAULT_PORT: u16 = 1234;

/// Pre-filled answers for the connection prompts.
///
/// Loaded once at startup via [`PromptDefaults::from_env`].
#[derive(Debug)]
pub struct PromptDefaults {
    /// API key used on an empty answer. Never echoed on the console.
    pub api_key: Option<SecretString>,
    /// Host used on an empty answer.
    pub host: String,
    /// Port used on an empty answer.
    pub port: u16,
}

impl Default for PromptDefaults {
    fn default() -> Self {
        Self {
            api_key: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl PromptDefaults {
    /// Loads prompt defaults from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    /// Missing or unparsable values fall back to the built-in defaults.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_key = std::env::var("AFM_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .map(SecretString::from);

        let host = std::env::var("AFM_HOST")
            .ok()
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = parse_env("AFM_PORT", DEFAULT_PORT);
        let port = if port == 0 { DEFAULT_PORT } else { port };

        Self {
            api_key,
            host,
            port,
        }
    }
}

/// Parameters for a single run. Immutable once collected.
pub struct ConnectionParams {
    /// Secret API key sent in the `authenticate` command.
    pub api_key: SecretString,
    /// Server host, IP literal or DNS name.
    pub host: String,
    /// Server port, `1..=65535`.
    pub port: u16,
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("api_key", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl ConnectionParams {
    /// Validates and builds a parameter set.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidInput`] if the key is empty, the host is
    /// neither an IP literal nor a DNS name, or the port is zero.
    pub fn new(api_key: SecretString, host: &str, port: u16) -> Result<Self, ClientError> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(invalid_key());
        }
        let host = normalize_host(host).ok_or_else(invalid_endpoint)?;
        if port == 0 {
            return Err(invalid_endpoint());
        }
        Ok(Self {
            api_key,
            host,
            port,
        })
    }

    /// Asks for the API key, host and port on `output`, reading one line
    /// per answer from `input`. An empty answer takes the default.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidInput`] on a missing or invalid answer
    /// (including end of input), or [`ClientError::Io`] if the console fails.
    pub fn prompt<R, W>(
        input: &mut R,
        output: &mut W,
        defaults: &PromptDefaults,
    ) -> Result<Self, ClientError>
    where
        R: BufRead,
        W: Write,
    {
        let key_hint = defaults.api_key.as_ref().map(|_| "from environment");
        let api_key = ask(input, output, "API Key", key_hint)?;
        let api_key = match (api_key, &defaults.api_key) {
            (Some(key), _) => SecretString::from(key),
            (None, Some(default)) => SecretString::from(default.expose_secret().to_string()),
            (None, None) => return Err(invalid_key()),
        };

        let host = ask(input, output, "Server Host (IP or name)", Some(&defaults.host))?
            .unwrap_or_else(|| defaults.host.clone());

        let port_default = defaults.port.to_string();
        let port = match ask(input, output, "Server Port", Some(&port_default))? {
            Some(raw) => raw.parse::<u16>().map_err(|_| invalid_endpoint())?,
            None => defaults.port,
        };

        let params = Self::new(api_key, &host, port)?;
        tracing::debug!(host = %params.host, port = params.port, "connection parameters collected");
        Ok(params)
    }

    /// WebSocket URL for the upgrade request: `ws://host:port/`.
    ///
    /// IPv6 literals are bracketed.
    #[must_use]
    pub fn url(&self) -> String {
        if self.host.contains(':') {
            format!("ws://[{}]:{}/", self.host, self.port)
        } else {
            format!("ws://{}:{}/", self.host, self.port)
        }
    }
}

/// Writes `label` (with an optional bracketed hint) and reads one trimmed line.
///
/// Returns `Ok(None)` for an empty answer.
fn ask<R, W>(
    input: &mut R,
    output: &mut W,
    label: &str,
    hint: Option<&str>,
) -> Result<Option<String>, ClientError>
where
    R: BufRead,
    W: Write,
{
    match hint {
        Some(hint) => write!(output, "{label} [{hint}]: ")?,
        None => write!(output, "{label}: ")?,
    }
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(ClientError::InvalidInput(format!(
            "no value entered for {label}"
        )));
    }
    let answer = line.trim();
    Ok((!answer.is_empty()).then(|| answer.to_string()))
}

/// Accepts an IP literal (IPv6 optionally bracketed) or a DNS name made of
/// letters, digits, `-`, `_` and `.`. Returns the host without brackets.
///
/// Anything else could move the URL's authority, port or path.
fn normalize_host(raw: &str) -> Option<String> {
    let host = raw.trim();
    let unbracketed = host
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'));
    if let Some(inner) = unbracketed {
        return inner.parse::<Ipv6Addr>().ok().map(|ip| ip.to_string());
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Some(ip.to_string());
    }
    let is_name = !host.is_empty()
        && host.len() <= 253
        && !host.starts_with('.')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    is_name.then(|| host.to_string())
}

fn invalid_key() -> ClientError {
    ClientError::InvalidInput("Please enter a valid API key.".to_string())
}

fn invalid_endpoint() -> ClientError {
    ClientError::InvalidInput("Please enter valid Server Host and Port.".to_string())
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
