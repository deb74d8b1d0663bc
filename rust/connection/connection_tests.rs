use std::{cell::RefCell, collections::VecDeque, path::PathBuf, rc::Rc};

use tokio::task::LocalSet;
use tokio::time::{Duration, timeout};

use super::*;
use crate::{
    AgentCapabilities, CancelNotification, ClientCapabilities, ContentBlock, ErrorCode,
    InitializeRequest, NewSessionRequest, PermissionOption, PermissionOptionId,
    PermissionOptionKind, PromptRequest, ReadTextFileRequest, ReadTextFileResponse,
    RequestPermissionOutcome, RequestPermissionRequest, RequestPermissionResponse, SessionId,
    SessionNotification, SessionUpdate, StopReason, WriteTextFileRequest, WriteTextFileResponse,
};

struct EchoAgent {
    client: RefCell<Option<AgentSideConnection>>,
}

impl Agent for EchoAgent {
    async fn initialize(&self, _args: InitializeRequest) -> Result<InitializeResponse, Error> {
        Ok(InitializeResponse {
            protocol_version: crate::V1,
            agent_capabilities: AgentCapabilities::default(),
            auth_methods: Vec::new(),
            meta: None,
        })
    }

    async fn authenticate(
        &self,
        _args: AuthenticateRequest,
    ) -> Result<crate::AuthenticateResponse, Error> {
        Ok(crate::AuthenticateResponse::default())
    }

    async fn new_session(
        &self,
        _args: NewSessionRequest,
    ) -> Result<crate::NewSessionResponse, Error> {
        Ok(crate::NewSessionResponse {
            session_id: SessionId::from("sess-1"),
            modes: None,
            #[cfg(feature = "unstable")]
            models: None,
            meta: None,
        })
    }

    async fn prompt(&self, args: PromptRequest) -> Result<crate::PromptResponse, Error> {
        let connection = self.client.borrow().clone().expect("connection not set");
        connection
            .session_notification(SessionNotification {
                session_id: args.session_id,
                update: SessionUpdate::AgentMessageChunk {
                    content: ContentBlock::from("hi"),
                },
                meta: None,
            })
            .await?;
        Ok(crate::PromptResponse { stop_reason: StopReason::EndTurn, meta: None })
    }

    async fn cancel(&self, _args: CancelNotification) -> Result<(), Error> {
        Ok(())
    }
}

struct RecordingClient {
    permission_outcome: RequestPermissionOutcome,
    notifications: RefCell<VecDeque<SessionNotification>>,
    files: RefCell<std::collections::HashMap<PathBuf, String>>,
}

impl RecordingClient {
    fn new(permission_outcome: RequestPermissionOutcome) -> Self {
        Self {
            permission_outcome,
            notifications: RefCell::new(VecDeque::new()),
            files: RefCell::new(std::collections::HashMap::new()),
        }
    }
}

impl Client for RecordingClient {
    async fn request_permission(
        &self,
        _args: RequestPermissionRequest,
    ) -> Result<RequestPermissionResponse, Error> {
        Ok(RequestPermissionResponse { outcome: self.permission_outcome.clone(), meta: None })
    }

    async fn write_text_file(
        &self,
        args: WriteTextFileRequest,
    ) -> Result<WriteTextFileResponse, Error> {
        self.files.borrow_mut().insert(args.path, args.content);
        Ok(WriteTextFileResponse::default())
    }

    async fn read_text_file(
        &self,
        args: ReadTextFileRequest,
    ) -> Result<ReadTextFileResponse, Error> {
        let content = self
            .files
            .borrow()
            .get(&args.path)
            .cloned()
            .ok_or_else(|| Error::resource_not_found(args.path.display().to_string()))?;
        Ok(ReadTextFileResponse { content, meta: None })
    }

    async fn session_notification(&self, args: SessionNotification) -> Result<(), Error> {
        self.notifications.borrow_mut().push_back(args);
        Ok(())
    }
}

/// Connects an [`AgentSideConnection`] hosting `agent` to a
/// [`ClientSideConnection`] hosting `client` over an in-memory duplex pipe,
/// and spawns both event loops on the current `LocalSet`.
fn connect(
    client: RecordingClient,
) -> (ClientSideConnection, Rc<RefCell<Option<AgentSideConnection>>>) {
    let (agent_to_client_tx, agent_to_client_rx) = async_pipe::pipe();
    let (client_to_agent_tx, client_to_agent_rx) = async_pipe::pipe();

    let agent_connection_slot = Rc::new(RefCell::new(None));
    let slot = agent_connection_slot.clone();
    let (_agent_connection, agent_io) = AgentSideConnection::new(
        move |conn| {
            *slot.borrow_mut() = Some(conn.clone());
            EchoAgent { client: RefCell::new(Some(conn)) }
        },
        agent_to_client_tx,
        client_to_agent_rx,
        |fut| {
            tokio::task::spawn_local(fut);
        },
    );
    let (client_connection, client_io) = ClientSideConnection::new(
        move |_conn| client,
        client_to_agent_tx,
        agent_to_client_rx,
        |fut| {
            tokio::task::spawn_local(fut);
        },
    );
    tokio::task::spawn_local(agent_io);
    tokio::task::spawn_local(client_io);
    (client_connection, agent_connection_slot)
}

#[tokio::test]
async fn initialize_and_new_session_roundtrip() {
    LocalSet::new()
        .run_until(async {
            let (client, _agent) = connect(RecordingClient::new(RequestPermissionOutcome::Cancelled));

            let init = timeout(
                Duration::from_secs(2),
                client.initialize(InitializeRequest {
                    protocol_version: crate::V1,
                    client_capabilities: ClientCapabilities::default(),
                    meta: None,
                }),
            )
            .await
            .unwrap()
            .unwrap();
            assert_eq!(init.protocol_version, crate::V1);

            let session = timeout(
                Duration::from_secs(2),
                client.new_session(NewSessionRequest {
                    mcp_servers: Vec::new(),
                    cwd: PathBuf::from("/tmp"),
                    meta: None,
                }),
            )
            .await
            .unwrap()
            .unwrap();
            assert_eq!(session.session_id, SessionId::from("sess-1"));
        })
        .await;
}

#[tokio::test]
async fn prompt_streams_session_update_before_responding() {
    LocalSet::new()
        .run_until(async {
            let (client, _agent) = connect(RecordingClient::new(RequestPermissionOutcome::Cancelled));

            let response = timeout(
                Duration::from_secs(2),
                client.prompt(PromptRequest {
                    session_id: SessionId::from("sess-1"),
                    prompt: vec!["hello".into()],
                    meta: None,
                }),
            )
            .await
            .unwrap()
            .unwrap();
            assert_eq!(response.stop_reason, StopReason::EndTurn);
        })
        .await;
}

#[tokio::test]
async fn permission_request_roundtrips_selected_option() {
    LocalSet::new()
        .run_until(async {
            let option_id = PermissionOptionId::from("allow-once");
            let (_client, agent_slot) = connect(RecordingClient::new(RequestPermissionOutcome::Selected {
                option_id: option_id.clone(),
            }));

            let agent = agent_slot.borrow().clone().expect("agent connection set during construction");
            let response = timeout(
                Duration::from_secs(2),
                agent.request_permission(RequestPermissionRequest {
                    session_id: SessionId::from("sess-1"),
                    tool_call: crate::ToolCallUpdate {
                        id: crate::ToolCallId::from("call-1"),
                        fields: Default::default(),
                    },
                    options: vec![PermissionOption {
                        id: option_id.clone(),
                        name: "Allow".into(),
                        kind: PermissionOptionKind::AllowOnce,
                    }],
                    meta: None,
                }),
            )
            .await
            .unwrap()
            .unwrap();

            match response.outcome {
                RequestPermissionOutcome::Selected { option_id: got } => assert_eq!(got, option_id),
                RequestPermissionOutcome::Cancelled => panic!("expected Selected outcome"),
            }
        })
        .await;
}

#[tokio::test]
async fn cancelled_permission_request_reports_cancelled_outcome() {
    LocalSet::new()
        .run_until(async {
            let (_client, agent_slot) = connect(RecordingClient::new(RequestPermissionOutcome::Cancelled));
            let agent = agent_slot.borrow().clone().unwrap();

            let response = timeout(
                Duration::from_secs(2),
                agent.request_permission(RequestPermissionRequest {
                    session_id: SessionId::from("sess-1"),
                    tool_call: crate::ToolCallUpdate {
                        id: crate::ToolCallId::from("call-1"),
                        fields: Default::default(),
                    },
                    options: vec![PermissionOption {
                        id: PermissionOptionId::from("allow-once"),
                        name: "Allow".into(),
                        kind: PermissionOptionKind::AllowOnce,
                    }],
                    meta: None,
                }),
            )
            .await
            .unwrap()
            .unwrap();

            assert!(matches!(response.outcome, RequestPermissionOutcome::Cancelled));
        })
        .await;
}

#[tokio::test]
async fn bidirectional_file_ops_roundtrip() {
    LocalSet::new()
        .run_until(async {
            let (_client, agent_slot) = connect(RecordingClient::new(RequestPermissionOutcome::Cancelled));
            let agent = agent_slot.borrow().clone().unwrap();

            agent
                .write_text_file(WriteTextFileRequest {
                    session_id: SessionId::from("sess-1"),
                    path: PathBuf::from("/tmp/note.txt"),
                    content: "hello world".into(),
                    meta: None,
                })
                .await
                .unwrap();

            let read = agent
                .read_text_file(ReadTextFileRequest {
                    session_id: SessionId::from("sess-1"),
                    path: PathBuf::from("/tmp/note.txt"),
                    line: None,
                    limit: None,
                    meta: None,
                })
                .await
                .unwrap();
            assert_eq!(read.content, "hello world");
        })
        .await;
}

#[tokio::test]
async fn read_missing_file_reports_resource_not_found() {
    LocalSet::new()
        .run_until(async {
            let (_client, agent_slot) = connect(RecordingClient::new(RequestPermissionOutcome::Cancelled));
            let agent = agent_slot.borrow().clone().unwrap();

            let err = agent
                .read_text_file(ReadTextFileRequest {
                    session_id: SessionId::from("sess-1"),
                    path: PathBuf::from("/tmp/missing.txt"),
                    line: None,
                    limit: None,
                    meta: None,
                })
                .await
                .unwrap_err();
            assert_eq!(err.code, ErrorCode::RESOURCE_NOT_FOUND.code);
        })
        .await;
}

#[tokio::test]
async fn client_without_terminal_support_answers_optional_terminal_methods_with_defaults() {
    LocalSet::new()
        .run_until(async {
            let (_client, agent_slot) = connect(RecordingClient::new(RequestPermissionOutcome::Cancelled));
            let agent = agent_slot.borrow().clone().unwrap();

            // RecordingClient doesn't override kill_terminal_command, so the
            // trait default (Ok(default)) answers it rather than
            // method_not_found.
            agent
                .kill_terminal_command(KillTerminalCommandRequest {
                    session_id: SessionId::from("sess-1"),
                    terminal_id: crate::TerminalId::from("term-1"),
                    meta: None,
                })
                .await
                .unwrap();

            // It does not override create_terminal either, so that one falls
            // back to the trait default too: a JSON-RPC success carrying a
            // `null` result, not a method_not_found error, since the agent
            // hasn't checked the client's `terminal` capability.
            let created = agent
                .create_terminal(CreateTerminalRequest {
                    session_id: SessionId::from("sess-1"),
                    command: "echo".into(),
                    args: Vec::new(),
                    env: Vec::new(),
                    cwd: None,
                    output_byte_limit: None,
                    meta: None,
                })
                .await
                .unwrap();
            assert!(created.is_none());
        })
        .await;
}

#[tokio::test]
async fn ext_method_without_handler_reports_method_not_found() {
    LocalSet::new()
        .run_until(async {
            let (client, _agent) = connect(RecordingClient::new(RequestPermissionOutcome::Cancelled));
            let err = client
                .ext_method(ExtRequest { method: "acme/debugInfo".into(), params: None })
                .await
                .unwrap_err();
            assert_eq!(err.code, ErrorCode::METHOD_NOT_FOUND.code);
        })
        .await;
}

#[tokio::test]
async fn ext_notification_without_handler_is_silently_dropped() {
    LocalSet::new()
        .run_until(async {
            let (client, _agent) = connect(RecordingClient::new(RequestPermissionOutcome::Cancelled));
            client.ext_notification(ExtNotification { method: "acme/ping".into(), params: None }).unwrap();
            // Nothing observable happens; this only proves the call doesn't
            // panic or hang the connection. Follow it with a real request to
            // confirm the connection is still alive afterwards.
            client
                .initialize(InitializeRequest {
                    protocol_version: crate::V1,
                    client_capabilities: ClientCapabilities::default(),
                    meta: None,
                })
                .await
                .unwrap();
        })
        .await;
}

#[tokio::test]
async fn closing_the_connection_settles_pending_requests_with_an_error() {
    LocalSet::new()
        .run_until(async {
            let (client, _agent) = connect(RecordingClient::new(RequestPermissionOutcome::Cancelled));
            client.close();
            let err = timeout(
                Duration::from_secs(2),
                client.initialize(InitializeRequest {
                    protocol_version: crate::V1,
                    client_capabilities: ClientCapabilities::default(),
                    meta: None,
                }),
            )
            .await
            .unwrap()
            .unwrap_err();
            assert_eq!(err.code, ErrorCode::INTERNAL_ERROR.code);
        })
        .await;
}

#[test]
fn request_ids_are_unique_and_monotonic() {
    let (state, _outgoing_rx, _shutdown_rx) = ConnectionState::new();
    let first = state.next_id();
    let second = state.next_id();
    let third = state.next_id();
    assert_eq!([first, second, third], [0, 1, 2]);
}

#[tokio::test]
async fn read_frame_rejects_a_frame_one_byte_over_the_limit() {
    let max_len = 16;
    let mut line = vec![b'a'; max_len];
    line.push(b'\n');
    let mut reader = futures::io::BufReader::new(&line[..]);
    let mut buf = Vec::new();
    let err = read_frame(&mut reader, max_len, &mut buf).await.unwrap_err();
    assert!(matches!(err, TransportError::FrameTooLarge { .. }));
}

#[tokio::test]
async fn read_frame_accepts_a_frame_exactly_at_the_limit() {
    let max_len = 17;
    let mut line = vec![b'a'; max_len - 1];
    line.push(b'\n');
    let mut reader = futures::io::BufReader::new(&line[..]);
    let mut buf = Vec::new();
    let ok = read_frame(&mut reader, max_len, &mut buf).await.unwrap();
    assert!(ok);
    assert_eq!(buf.len(), max_len);
}

#[tokio::test]
async fn read_frame_returns_false_on_clean_eof() {
    let mut reader = futures::io::BufReader::new(&b""[..]);
    let mut buf = Vec::new();
    let ok = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN, &mut buf).await.unwrap();
    assert!(!ok);
}

#[tokio::test]
async fn session_new_with_mcp_servers_omitted_defaults_to_empty() {
    LocalSet::new()
        .run_until(async {
            let (agent_to_client_tx, mut agent_to_client_rx) = async_pipe::pipe();
            let (mut client_to_agent_tx, client_to_agent_rx) = async_pipe::pipe();

            let (_agent_connection, agent_io) = AgentSideConnection::new(
                |conn| EchoAgent { client: RefCell::new(Some(conn)) },
                agent_to_client_tx,
                client_to_agent_rx,
                |fut| {
                    tokio::task::spawn_local(fut);
                },
            );
            tokio::task::spawn_local(agent_io);

            // A hand-written session/new request that omits mcpServers
            // entirely, as a real peer predating that field would send.
            futures::AsyncWriteExt::write_all(
                &mut client_to_agent_tx,
                b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"session/new\",\"params\":{\"cwd\":\"/tmp\"}}\n",
            )
            .await
            .unwrap();

            let mut reader = futures::io::BufReader::new(&mut agent_to_client_rx);
            let mut buf = Vec::new();
            let ok = timeout(Duration::from_secs(2), read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN, &mut buf))
                .await
                .unwrap()
                .unwrap();
            assert!(ok);

            let response: serde_json::Value = serde_json::from_slice(&buf).unwrap();
            assert!(response.get("error").is_none(), "expected success, got {response:?}");
            assert_eq!(response["result"]["sessionId"], "sess-1");
        })
        .await;
}

#[tokio::test]
async fn malformed_frame_is_dropped_without_killing_the_connection() {
    LocalSet::new()
        .run_until(async {
            let (agent_to_client_tx, agent_to_client_rx) = async_pipe::pipe();
            let (client_to_agent_tx, client_to_agent_rx) = async_pipe::pipe();

            let (_agent_connection, agent_io) = AgentSideConnection::new(
                |conn| EchoAgent { client: RefCell::new(Some(conn)) },
                agent_to_client_tx,
                client_to_agent_rx,
                |fut| {
                    tokio::task::spawn_local(fut);
                },
            );
            tokio::task::spawn_local(agent_io);

            // Write a malformed (non-JSON) frame directly, then a
            // well-formed request, and confirm the connection answers the
            // second one rather than getting stuck on the first.
            let mut writer = client_to_agent_tx;
            futures::AsyncWriteExt::write_all(&mut writer, b"not json at all\n").await.unwrap();

            let (client_connection, client_io) = ClientSideConnection::new(
                |_conn| RecordingClient::new(RequestPermissionOutcome::Cancelled),
                writer,
                agent_to_client_rx,
                |fut| {
                    tokio::task::spawn_local(fut);
                },
            );
            tokio::task::spawn_local(client_io);

            let init = timeout(
                Duration::from_secs(2),
                client_connection.initialize(InitializeRequest {
                    protocol_version: crate::V1,
                    client_capabilities: ClientCapabilities::default(),
                    meta: None,
                }),
            )
            .await
            .unwrap()
            .unwrap();
            assert_eq!(init.protocol_version, crate::V1);
        })
        .await;
}
