//! A minimal ACP client that connects to [`demos::agent`], starts a session,
//! sends a single prompt typed on the command line, and prints the agent's
//! streamed reply to stdout.
//!
//! ```bash
//! cargo run --example client -- 127.0.0.1:9000 "hello there"
//! ```

use acp_runtime as acp;
use acp_runtime::{ContentBlock, SessionNotification, SessionUpdate};
use anyhow::bail;
use tokio::net::TcpStream;
use tokio_util::compat::{TokioAsyncReadCompatExt as _, TokioAsyncWriteCompatExt as _};

struct PrintingClient;

impl acp::Client for PrintingClient {
    async fn request_permission(
        &self,
        args: acp::RequestPermissionRequest,
    ) -> Result<acp::RequestPermissionResponse, acp::Error> {
        // This demo auto-allows the first offered option; a real client
        // would surface `args.options` to the user and wait for a choice.
        let option_id = args
            .options
            .first()
            .ok_or_else(acp::Error::invalid_params)?
            .id
            .clone();
        Ok(acp::RequestPermissionResponse {
            outcome: acp::RequestPermissionOutcome::Selected { option_id },
            meta: None,
        })
    }

    async fn write_text_file(
        &self,
        args: acp::WriteTextFileRequest,
    ) -> Result<acp::WriteTextFileResponse, acp::Error> {
        tokio::fs::write(&args.path, &args.content).await.map_err(|_| acp::Error::internal_error())?;
        Ok(acp::WriteTextFileResponse::default())
    }

    async fn read_text_file(
        &self,
        args: acp::ReadTextFileRequest,
    ) -> Result<acp::ReadTextFileResponse, acp::Error> {
        let content = tokio::fs::read_to_string(&args.path)
            .await
            .map_err(|_| acp::Error::resource_not_found(args.path.display().to_string()))?;
        Ok(acp::ReadTextFileResponse { content, meta: None })
    }

    async fn session_notification(&self, args: SessionNotification) -> Result<(), acp::Error> {
        match args.update {
            SessionUpdate::AgentMessageChunk { content } | SessionUpdate::AgentThoughtChunk { content } => {
                if let ContentBlock::Text(text) = content {
                    print!("{}", text.text);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let local_set = tokio::task::LocalSet::new();

    let args: Vec<String> = std::env::args().collect();
    let (addr, prompt) = match args.as_slice() {
        [_, addr, prompt] => (addr.clone(), prompt.clone()),
        _ => bail!("usage: client ADDR PROMPT"),
    };

    let stream = TcpStream::connect(&addr).await?;
    let (incoming, outgoing) = stream.into_split();

    local_set
        .run_until(async move {
            let (conn, io_task) = acp::ClientSideConnection::new(
                |_conn| PrintingClient,
                outgoing.compat_write(),
                incoming.compat(),
                |fut| {
                    tokio::task::spawn_local(fut);
                },
            );
            tokio::task::spawn_local(io_task);

            conn.initialize(acp::InitializeRequest {
                protocol_version: acp::V1,
                client_capabilities: acp::ClientCapabilities::default(),
                meta: None,
            })
            .await?;

            let session = conn
                .new_session(acp::NewSessionRequest {
                    mcp_servers: Vec::new(),
                    cwd: std::env::current_dir()?,
                    meta: None,
                })
                .await?;

            let response = conn
                .prompt(acp::PromptRequest {
                    session_id: session.session_id,
                    prompt: vec![prompt.into()],
                    meta: None,
                })
                .await?;
            println!("\n-- {:?} --", response.stop_reason);
            Ok(())
        })
        .await
}
