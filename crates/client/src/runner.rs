//! Session orchestration.
//!
//! [`SessionRunner`] wires the sans-IO protocol engine to a transport, a
//! credential store and a user prompt, and drives the strict
//! one-request/one-response loop. It owns the recovery policy: malformed
//! inbound messages are logged and dropped, authentication and transport
//! failures kill the session, and a dead session is restarted from scratch a
//! bounded number of times.

use anyhow::{bail, Result};
use tracing::{info, warn};

use protocol::envelope::Envelope;
use protocol::framing;
use protocol::handshake::{EngineAction, HandshakeEngine};
use protocol::ProtocolError;

use crate::prompt::Interactive;
use crate::store::SessionStore;
use crate::transport::Transport;

/// Outcome of one session attempt.
enum SessionEnd {
    /// The user quit; the runner is done.
    Quit,
    /// The session died; reconnect and try again.
    Restart,
}

pub struct SessionRunner<S, P> {
    store: S,
    prompt: P,
    version: String,
    restart_limit: u32,
}

impl<S: SessionStore, P: Interactive> SessionRunner<S, P> {
    pub fn new(store: S, prompt: P, version: &str, restart_limit: u32) -> Self {
        SessionRunner {
            store,
            prompt,
            version: version.to_string(),
            restart_limit,
        }
    }

    /// Runs sessions until the user quits or the restart budget is spent.
    ///
    /// `connect` is called once per session attempt. With `fresh` set, the
    /// stored credential is ignored for the first attempt and a full
    /// handshake is performed.
    pub fn run<T, F>(&mut self, mut connect: F, fresh: bool) -> Result<()>
    where
        T: Transport,
        F: FnMut() -> Result<T>,
    {
        let mut attempts = 0u32;
        let mut use_stored = !fresh;

        loop {
            let mut transport = connect()?;
            match self.run_session(&mut transport, use_stored)? {
                SessionEnd::Quit => return Ok(()),
                SessionEnd::Restart => {
                    attempts += 1;
                    if attempts >= self.restart_limit {
                        bail!("giving up after {} failed session attempts", attempts);
                    }
                    // A stored credential that just failed will keep
                    // failing; fall back to a full handshake.
                    if use_stored {
                        use_stored = false;
                        if let Err(e) = self.store.clear() {
                            warn!(error = %e, "could not clear stale credential");
                        }
                    }
                    info!(attempts, "restarting session");
                }
            }
        }
    }

    /// Drives one session to completion over an established transport.
    fn run_session<T: Transport>(
        &mut self,
        transport: &mut T,
        use_stored: bool,
    ) -> Result<SessionEnd> {
        let mut engine = HandshakeEngine::new(&self.version, &transport.local_address());

        let resumed = use_stored && self.try_resume(&mut engine)?;
        if resumed {
            // No handshake traffic: the first frame is an application
            // request under the stored key.
            match self.prompt_request(&mut engine)? {
                Some(envelope) => self.send(transport, &engine, &envelope)?,
                None => return Ok(SessionEnd::Quit),
            }
        } else {
            let hello = engine.start()?;
            self.send(transport, &engine, &hello)?;
        }

        loop {
            let envelope = match self.receive(transport, &engine) {
                Ok(Some(envelope)) => envelope,
                // Malformed but unauthenticated-critical traffic: drop it
                // and keep waiting.
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "session failed");
                    self.prompt.show_notice(&format!("Connection lost: {}", e));
                    return Ok(SessionEnd::Restart);
                }
            };

            let action = match engine.handle(envelope) {
                Ok(action) => action,
                Err(e @ ProtocolError::UnexpectedMessage { .. })
                | Err(e @ ProtocolError::Deserialization(_)) => {
                    warn!(error = %e, "dropping malformed message");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "protocol failure");
                    return Ok(SessionEnd::Restart);
                }
            };

            match action {
                EngineAction::Send(envelope) => self.send(transport, &engine, &envelope)?,
                EngineAction::AwaitCredentials { mode } => {
                    match self.prompt.credentials(mode)? {
                        Some((kind, userid, password)) => {
                            let envelope = engine.credentials(kind, &userid, &password)?;
                            self.send(transport, &engine, &envelope)?;
                        }
                        None => return Ok(SessionEnd::Quit),
                    }
                }
                EngineAction::LoggedIn { credential } => {
                    info!(login_id = %credential.login_id, "logged in");
                    self.prompt.show_notice("log-in succeeded");
                    if let Err(e) = self.store.save(&credential) {
                        warn!(error = %e, "could not persist credential");
                    }
                    match self.prompt_request(&mut engine)? {
                        Some(envelope) => self.send(transport, &engine, &envelope)?,
                        None => return Ok(SessionEnd::Quit),
                    }
                }
                EngineAction::Response(text) => {
                    self.prompt.show_response(&text);
                    match self.prompt_request(&mut engine)? {
                        Some(envelope) => self.send(transport, &engine, &envelope)?,
                        None => return Ok(SessionEnd::Quit),
                    }
                }
                EngineAction::Restart { message } => {
                    self.prompt
                        .show_notice(&format!("Server ended the session: {}", message));
                    return Ok(SessionEnd::Restart);
                }
            }
        }
    }

    /// Loads and adopts a stored credential. A corrupt store is logged and
    /// treated as absent.
    fn try_resume(&mut self, engine: &mut HandshakeEngine) -> Result<bool> {
        let credential = match self.store.load() {
            Ok(Some(credential)) => credential,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable credential store");
                return Ok(false);
            }
        };
        info!(login_id = %credential.login_id, "resuming stored session");
        engine.resume(credential)?;
        Ok(true)
    }

    /// Prompts for request lines until one passes the engine's local checks
    /// or the user quits.
    fn prompt_request(&mut self, engine: &mut HandshakeEngine) -> Result<Option<Envelope>> {
        loop {
            let Some(line) = self.prompt.next_request()? else {
                return Ok(None);
            };
            match engine.request(&line) {
                Ok(envelope) => return Ok(Some(envelope)),
                Err(ProtocolError::Validation(message)) => {
                    self.prompt.show_notice(&message);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn send<T: Transport>(
        &mut self,
        transport: &mut T,
        engine: &HandshakeEngine,
        envelope: &Envelope,
    ) -> Result<()> {
        let payload = envelope.encode(engine.auth_key())?;
        framing::send_frame(transport, &payload)?;
        Ok(())
    }

    /// Reads and decodes one frame. `Ok(None)` means a malformed frame that
    /// is safe to drop; `Err` means the session is no longer usable.
    fn receive<T: Transport>(
        &mut self,
        transport: &mut T,
        engine: &HandshakeEngine,
    ) -> std::result::Result<Option<Envelope>, ProtocolError> {
        let payload = framing::read_frame(transport)?;
        match Envelope::decode(
            &payload,
            engine.auth_key(),
            engine.fallback_key(),
        ) {
            Ok(envelope) => Ok(Some(envelope)),
            // A failed integrity check is an attack or a key mismatch, not
            // noise. It ends the session.
            Err(e @ ProtocolError::Authentication(_)) => Err(e),
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                Ok(None)
            }
        }
    }
}
