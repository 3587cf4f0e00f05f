//! A single WebSocket session with the AFM Control API server.
//!
//! [`Session`] owns the upgraded TCP stream. Requests and replies are
//! strictly alternating: the runner sends one command, then reads exactly one
//! reply before doing anything else.

use std::fmt;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::messages::{Envelope, Exchange, Reply};
use crate::config::ConnectionParams;
use crate::error::ClientError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open WebSocket session.
///
/// Dropping the session releases the socket on every path; [`Session::close`]
/// additionally performs the normal-closure handshake.
pub struct Session {
    socket: Socket,
    url: String,
    closed: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.url)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Opens the TCP connection and performs the HTTP upgrade to `/`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Resolve`] if the host cannot be resolved, or
    /// [`ClientError::Handshake`] if the connection is refused or the server
    /// rejects the upgrade.
    pub async fn connect(params: &ConnectionParams) -> Result<Self, ClientError> {
        let url = params.url();
        tracing::info!(%url, "opening websocket");

        let addrs = resolve(&params.host, params.port).await?;
        let stream = TcpStream::connect(addrs.as_slice())
            .await
            .map_err(|err| ClientError::handshake(WsError::Io(err)))?;

        let (socket, response) =
            tokio_tungstenite::client_async(url.as_str(), MaybeTlsStream::Plain(stream))
                .await
                .map_err(ClientError::handshake)?;

        tracing::debug!(status = %response.status(), "websocket upgrade complete");
        Ok(Self {
            socket,
            url,
            closed: false,
        })
    }

    /// Sends one command envelope as a UTF-8 text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Encode`] if the envelope cannot be serialized,
    /// or [`ClientError::Send`] if the frame cannot be written.
    pub async fn send(&mut self, envelope: &Envelope, exchange: Exchange) -> Result<(), ClientError> {
        let json = envelope
            .to_json()
            .map_err(|source| ClientError::Encode { exchange, source })?;

        self.socket
            .send(Message::text(json))
            .await
            .map_err(|err| ClientError::send(exchange, err))?;

        tracing::debug!(%exchange, command = ?envelope.command, "command sent");
        Ok(())
    }

    /// Waits for exactly one text reply.
    ///
    /// Ping and pong frames are answered by the transport and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Receive`] if reading fails, the reply is a
    /// binary frame, or the server closes the connection first.
    pub async fn receive(&mut self, exchange: Exchange) -> Result<Reply, ClientError> {
        loop {
            match self.socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    let reply = Reply::parse(text.as_str());
                    tracing::debug!(
                        %exchange,
                        error = reply.is_error(),
                        object = reply.object().unwrap_or_default(),
                        "reply received"
                    );
                    return Ok(reply);
                }
                Some(Ok(Message::Binary(data))) => {
                    return Err(ClientError::binary_reply(exchange, data.len()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|frame| u16::from(frame.code));
                    return Err(ClientError::closed_before_reply(exchange, code));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(err)) => return Err(ClientError::receive(exchange, &err)),
                None => return Err(ClientError::closed_before_reply(exchange, None)),
            }
        }
    }

    /// Closes the session with status 1000 and waits for the server to
    /// finish the closing handshake.
    ///
    /// Failures while closing are logged, not returned: the socket is
    /// released either way when `self` is dropped.
    pub async fn close(mut self) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "Client disconnecting".into(),
        };
        if let Err(err) = self.socket.close(Some(frame)).await {
            tracing::debug!(error = %err, "close frame not sent");
        }
        // Drain until the peer acknowledges or the stream ends.
        while let Some(msg) = self.socket.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        self.closed = true;
        tracing::info!(url = %self.url, "websocket closed");
    }
}

/// Resolves `host` on the blocking pool, keeping the resolver's error number.
async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, ClientError> {
    let owned = host.to_string();
    match tokio::task::spawn_blocking(move || lookup(&owned, port)).await {
        Ok(result) => result,
        Err(err) => Err(ClientError::Resolve {
            host: host.to_string(),
            code: 0,
            detail: err.to_string(),
        }),
    }
}

fn lookup(host: &str, port: u16) -> Result<Vec<SocketAddr>, ClientError> {
    let service = port.to_string();
    let found = dns_lookup::getaddrinfo(Some(host), Some(&service), None)
        .map_err(|err| ClientError::resolve(host, err))?;

    let mut addrs: Vec<SocketAddr> = Vec::new();
    for info in found.flatten() {
        if !addrs.contains(&info.sockaddr) {
            addrs.push(info.sockaddr);
        }
    }
    if addrs.is_empty() {
        return Err(ClientError::Resolve {
            host: host.to_string(),
            code: 0,
            detail: "no addresses returned".to_string(),
        });
    }
    tracing::debug!(host, count = addrs.len(), "host resolved");
    Ok(addrs)
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            tracing::debug!(url = %self.url, "websocket dropped without closing handshake");
        }
    }
}
