//! Session runner: the fixed connect → authenticate → (echo) → close sequence.
//!
//! The runner prints a human-readable transcript to `out` and failures to
//! `err`. It never branches on reply content: replies are shown verbatim and
//! the operator judges whether authentication succeeded.

use std::fmt;
use std::io::Write;

use crate::config::ConnectionParams;
use crate::error::ClientError;
use crate::ws::connection::Session;
use crate::ws::messages::{ECHO_PROPERTY, Envelope, Exchange, Reply};

/// Which transcript the runner performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Authenticate, show the reply, disconnect.
    AuthOnly,
    /// Authenticate, run one `APIEcho` exchange, wait for the operator,
    /// disconnect.
    EchoTest,
}

/// Hook that blocks until the operator is ready to close the connection.
pub trait Pause {
    /// Blocks until the operator continues.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the console cannot be read.
    fn wait(&mut self) -> std::io::Result<()>;
}

impl<F> Pause for F
where
    F: FnMut() -> std::io::Result<()>,
{
    fn wait(&mut self) -> std::io::Result<()> {
        self()
    }
}

/// Drives one session and writes its transcript.
pub struct Runner<O, E, P> {
    variant: Variant,
    out: O,
    err: E,
    pause: P,
}

impl<O, E, P> fmt::Debug for Runner<O, E, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}

impl<O, E, P> Runner<O, E, P>
where
    O: Write,
    E: Write,
    P: Pause,
{
    /// Creates a runner writing status lines to `out` and failures to `err`.
    #[must_use]
    pub fn new(variant: Variant, out: O, err: E, pause: P) -> Self {
        Self {
            variant,
            out,
            err,
            pause,
        }
    }

    /// Runs the whole session.
    ///
    /// Returns `Ok(())` whenever the authentication exchange completed, even
    /// if the server rejected the key or the echo exchange failed. The
    /// session is closed on every path once it was opened.
    ///
    /// # Errors
    ///
    /// Returns the first [`ClientError`] from the handshake or the
    /// authentication exchange (or a transcript write failure), after it
    /// has been written to the error stream.
    pub async fn run(&mut self, params: &ConnectionParams) -> Result<(), ClientError> {
        let mut session = match Session::connect(params).await {
            Ok(session) => session,
            Err(err) => return Err(self.report(err)),
        };

        let result = self.converse(&mut session, params).await;
        session.close().await;

        match result {
            Ok(()) => {
                writeln!(self.out, "Disconnected.")?;
                self.out.flush()?;
                Ok(())
            }
            Err(err) => Err(self.report(err)),
        }
    }

    /// Everything between the upgrade and the close.
    async fn converse(
        &mut self,
        session: &mut Session,
        params: &ConnectionParams,
    ) -> Result<(), ClientError> {
        writeln!(self.out, "WebSocket connected.")?;

        session
            .send(&Envelope::authenticate(&params.api_key), Exchange::Authenticate)
            .await?;
        let reply = session.receive(Exchange::Authenticate).await?;
        self.show_reply(&reply)?;
        match reply.error_details() {
            Some(details) => tracing::warn!(%details, "server rejected authentication"),
            None => tracing::info!(object = reply.object().unwrap_or_default(), "authentication reply"),
        }

        if self.variant == Variant::EchoTest {
            if let Err(err) = self.echo(session).await {
                tracing::warn!(code = err.code(), error = %err, "echo exchange failed");
                writeln!(self.err, "{err}")?;
            }

            write!(self.out, "Press any key to close connection...")?;
            self.out.flush()?;
            if let Err(err) = self.pause.wait() {
                tracing::warn!(error = %err, "pause interrupted");
            }
            // The key press is not echoed.
            writeln!(self.out)?;
        }
        Ok(())
    }

    async fn echo(&mut self, session: &mut Session) -> Result<(), ClientError> {
        session
            .send(&Envelope::api_echo(ECHO_PROPERTY), Exchange::ApiEcho)
            .await?;
        writeln!(self.out, "Sent APIEcho get command.")?;

        let reply = session.receive(Exchange::ApiEcho).await?;
        self.show_reply(&reply)
    }

    fn show_reply(&mut self, reply: &Reply) -> Result<(), ClientError> {
        writeln!(self.out, "Server replied: {}", reply.text())?;
        self.out.flush()?;
        Ok(())
    }

    /// Writes a terminal error to the error stream and hands it back.
    fn report(&mut self, err: ClientError) -> ClientError {
        tracing::error!(code = err.code(), error = %err, "session failed");
        if writeln!(self.err, "{err}").is_err() {
            tracing::debug!("error stream unavailable");
        }
        err
    }
}
