//! A minimal ACP agent for educational purposes.
//!
//! Echoes the user's prompt back as a single `agent_message_chunk` and ends
//! the turn. Run it directly over a TCP listener so [`demos::client`] (or any
//! other ACP client) can connect to it:
//!
//! ```bash
//! cargo run --example agent -- 127.0.0.1:9000
//! ```

use std::cell::Cell;

use acp_runtime as acp;
use acp_runtime::SessionNotification;
use anyhow::bail;
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot},
};
use tokio_util::compat::{TokioAsyncReadCompatExt as _, TokioAsyncWriteCompatExt as _};

struct EchoAgent {
    session_update_tx: mpsc::UnboundedSender<(SessionNotification, oneshot::Sender<()>)>,
    next_session_id: Cell<u64>,
}

impl EchoAgent {
    fn new(
        session_update_tx: mpsc::UnboundedSender<(SessionNotification, oneshot::Sender<()>)>,
    ) -> Self {
        Self { session_update_tx, next_session_id: Cell::new(0) }
    }
}

impl acp::Agent for EchoAgent {
    async fn initialize(
        &self,
        _args: acp::InitializeRequest,
    ) -> Result<acp::InitializeResponse, acp::Error> {
        log::info!("initialize");
        Ok(acp::InitializeResponse {
            protocol_version: acp::V1,
            agent_capabilities: acp::AgentCapabilities::default(),
            auth_methods: Vec::new(),
            meta: None,
        })
    }

    async fn authenticate(
        &self,
        _args: acp::AuthenticateRequest,
    ) -> Result<acp::AuthenticateResponse, acp::Error> {
        Ok(acp::AuthenticateResponse::default())
    }

    async fn new_session(
        &self,
        _args: acp::NewSessionRequest,
    ) -> Result<acp::NewSessionResponse, acp::Error> {
        let id = self.next_session_id.get();
        self.next_session_id.set(id + 1);
        Ok(acp::NewSessionResponse {
            session_id: acp::SessionId(id.to_string().into()),
            modes: None,
            #[cfg(feature = "unstable")]
            models: None,
            meta: None,
        })
    }

    async fn prompt(&self, args: acp::PromptRequest) -> Result<acp::PromptResponse, acp::Error> {
        for content in
            ["Echo: ".to_string().into()].into_iter().chain(args.prompt)
        {
            let (tx, rx) = oneshot::channel();
            self.session_update_tx
                .send((
                    SessionNotification {
                        session_id: args.session_id.clone(),
                        update: acp::SessionUpdate::AgentMessageChunk { content },
                        meta: None,
                    },
                    tx,
                ))
                .map_err(|_| acp::Error::internal_error())?;
            rx.await.map_err(|_| acp::Error::internal_error())?;
        }
        Ok(acp::PromptResponse { stop_reason: acp::StopReason::EndTurn, meta: None })
    }

    async fn cancel(&self, _args: acp::CancelNotification) -> Result<(), acp::Error> {
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let local_set = tokio::task::LocalSet::new();

    let (outgoing, incoming) = match std::env::args().collect::<Vec<_>>().as_slice() {
        [_, addr] => {
            let listener = TcpListener::bind(addr).await?;
            log::info!("listening on {}", listener.local_addr()?);
            let (stream, _) = listener.accept().await?;
            let (incoming, outgoing) = stream.into_split();
            (outgoing.compat_write(), incoming.compat())
        }
        _ => bail!("usage: agent ADDR"),
    };

    local_set
        .run_until(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let (conn, io_task) = acp::AgentSideConnection::new(
                |_conn| EchoAgent::new(tx),
                outgoing,
                incoming,
                |fut| {
                    tokio::task::spawn_local(fut);
                },
            );
            tokio::task::spawn_local(async move {
                while let Some((notification, done)) = rx.recv().await {
                    if let Err(err) = conn.session_notification(notification).await {
                        log::error!("{err}");
                        break;
                    }
                    done.send(()).ok();
                }
            });
            io_task.await;
            Ok(())
        })
        .await
}
