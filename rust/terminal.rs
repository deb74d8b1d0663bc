//! A handle to a terminal created via [`AgentSideConnection::create_terminal`].
//!
//! Agents hold on to a `TerminalHandle` for as long as they care about a
//! spawned command: it wraps the `terminal/output`, `terminal/wait_for_exit`,
//! `terminal/kill` and `terminal/release` calls so callers don't have to
//! thread the session id and terminal id through every call themselves.

use crate::{
    AgentSideConnection, Error, SessionId, TerminalId, TerminalOutputResponse,
    WaitForTerminalExitResponse,
    client::{
        KillTerminalCommandRequest, ReleaseTerminalRequest, TerminalOutputRequest,
        WaitForTerminalExitRequest,
    },
};

/// A terminal created on the client's side via `terminal/create`, bound to
/// the session and connection it was created on.
///
/// The terminal is not released automatically when this handle is dropped;
/// call [`TerminalHandle::release`] (or send a `terminal/kill` via
/// [`TerminalHandle::kill`]) when the agent is done with it.
pub struct TerminalHandle {
    connection: AgentSideConnection,
    session_id: SessionId,
    terminal_id: TerminalId,
}

impl TerminalHandle {
    pub(crate) fn new(
        connection: AgentSideConnection,
        session_id: SessionId,
        terminal_id: TerminalId,
    ) -> Self {
        Self { connection, session_id, terminal_id }
    }

    /// The id the client assigned this terminal.
    pub fn id(&self) -> &TerminalId {
        &self.terminal_id
    }

    /// Returns the output accumulated so far, plus the command's exit status
    /// if it has already exited. `None` if the client doesn't support
    /// `terminal/output`.
    pub async fn current_output(&self) -> Result<Option<TerminalOutputResponse>, Error> {
        self.connection
            .terminal_output(TerminalOutputRequest {
                session_id: self.session_id.clone(),
                terminal_id: self.terminal_id.clone(),
                meta: None,
            })
            .await
    }

    /// Waits for the command running in this terminal to exit. `None` if the
    /// client doesn't support `terminal/wait_for_exit`.
    pub async fn wait_for_exit(&self) -> Result<Option<WaitForTerminalExitResponse>, Error> {
        self.connection
            .wait_for_terminal_exit(WaitForTerminalExitRequest {
                session_id: self.session_id.clone(),
                terminal_id: self.terminal_id.clone(),
                meta: None,
            })
            .await
    }

    /// Kills the command without releasing the terminal, so its output
    /// remains available via [`Self::current_output`].
    pub async fn kill(&self) -> Result<(), Error> {
        self.connection
            .kill_terminal_command(KillTerminalCommandRequest {
                session_id: self.session_id.clone(),
                terminal_id: self.terminal_id.clone(),
                meta: None,
            })
            .await?;
        Ok(())
    }

    /// Releases the terminal and any resources associated with it. Must be
    /// called explicitly; dropping the handle does not release the terminal.
    pub async fn release(self) -> Result<(), Error> {
        self.connection
            .release_terminal(ReleaseTerminalRequest {
                session_id: self.session_id.clone(),
                terminal_id: self.terminal_id.clone(),
                meta: None,
            })
            .await?;
        Ok(())
    }
}
