//! # afm-control-client
//!
//! Console examples for the AFM Control WebSocket API.
//!
//! Each run opens one WebSocket connection, authenticates with an API key,
//! shows the server's reply and disconnects. The `afm-connection-test`
//! binary additionally sends one `APIEcho` request and waits for the
//! operator before closing.
//!
//! ## Architecture
//!
//! ```text
//! Operator (console prompts)
//!     │
//!     ├── ConnectionParams (config/)
//!     │
//!     ├── Runner (runner/)
//!     │     └── Session (ws/connection)
//!     │           └── Envelope / Reply (ws/messages)
//!     │
//!     └── AFM Control API server (ws://host:port/)
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod runner;
pub mod ws;
