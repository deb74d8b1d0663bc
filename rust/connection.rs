//! The generic duplex JSON-RPC engine, plus the two strongly-typed facades
//! built on top of it: [`AgentSideConnection`] (hosts an [`Agent`]
//! implementation, exposes the methods a [`Client`] is called with) and
//! [`ClientSideConnection`] (hosts a [`Client`] implementation, exposes the
//! methods an [`Agent`] is called with).
//!
//! Both facades share one engine: a write task drains an outgoing queue onto
//! the wire, a read task classifies each newline-delimited frame as a
//! request, a response, or a notification, and in-flight requests are
//! settled against a pending-response table keyed by id. Every inbound
//! request/notification is dispatched on its own task via the caller's
//! `spawn` closure, so a slow handler never blocks the read loop.

#[cfg(test)]
mod connection_tests;

use std::{
    any::Any,
    collections::HashMap,
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicI32, Ordering},
    },
};

use futures::{
    AsyncBufReadExt as _, AsyncRead, AsyncWrite, AsyncWriteExt as _, FutureExt as _,
    StreamExt as _,
    channel::{mpsc, oneshot},
    future::LocalBoxFuture,
    io::BufReader,
    select_biased,
};
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::value::RawValue;

use crate::{
    Error, ExtNotification, ExtRequest, SessionNotification, TransportError,
    agent::{
        AUTHENTICATE_METHOD_NAME, Agent, AgentResponse, AuthenticateRequest, CancelNotification,
        ClientNotification, ClientRequest, INITIALIZE_METHOD_NAME, InitializeRequest,
        LoadSessionRequest, NewSessionRequest, PromptRequest, SESSION_CANCEL_METHOD_NAME,
        SESSION_LOAD_METHOD_NAME, SESSION_NEW_METHOD_NAME, SESSION_PROMPT_METHOD_NAME,
        SESSION_SET_MODE_METHOD_NAME, SetSessionModeRequest,
    },
    client::{
        AgentNotification, AgentRequest, Client, ClientResponse, CreateTerminalRequest,
        CreateTerminalResponse, FS_READ_TEXT_FILE_METHOD_NAME, FS_WRITE_TEXT_FILE_METHOD_NAME,
        KillTerminalCommandRequest, KillTerminalCommandResponse, ReadTextFileRequest,
        ReadTextFileResponse, ReleaseTerminalRequest, ReleaseTerminalResponse,
        RequestPermissionRequest, RequestPermissionResponse, SESSION_REQUEST_PERMISSION_METHOD_NAME,
        SESSION_UPDATE_NOTIFICATION, TERMINAL_CREATE_METHOD_NAME, TERMINAL_KILL_METHOD_NAME,
        TERMINAL_OUTPUT_METHOD_NAME, TERMINAL_RELEASE_METHOD_NAME,
        TERMINAL_WAIT_FOR_EXIT_METHOD_NAME, TerminalOutputRequest, TerminalOutputResponse,
        WaitForTerminalExitRequest, WaitForTerminalExitResponse, WriteTextFileRequest,
        WriteTextFileResponse,
    },
    ext::strip_ext_prefix,
    stream_broadcast::{StreamBroadcast, StreamReceiver, StreamSender},
    terminal::TerminalHandle,
};
#[cfg(feature = "unstable")]
use crate::agent::{SESSION_SET_MODEL_METHOD_NAME, SetSessionModelRequest};

/// Default cap on a single newline-delimited frame. Configurable via
/// [`AgentSideConnection::with_max_frame_len`]/
/// [`ClientSideConnection::with_max_frame_len`] for peers that need to
/// exchange bigger blobs.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

// Dispatch plumbing shared by both sides.

/// What one side of a connection decodes inbound messages into. `AgentSide`
/// and `ClientSide` are the only two implementations.
pub trait Side: 'static {
    type InRequest;
    type OutResponse: Serialize;
    type InNotification;

    fn decode_request(method: &str, params: Option<&RawValue>) -> Result<Self::InRequest, Error>;
    fn decode_notification(
        method: &str,
        params: Option<&RawValue>,
    ) -> Result<Self::InNotification, Error>;
}

/// Dispatches decoded inbound requests/notifications to a handler
/// implementation (an [`Agent`] or a [`Client`]).
trait MessageHandler<S: Side> {
    fn handle_request(
        &self,
        request: S::InRequest,
    ) -> impl Future<Output = Result<S::OutResponse, Error>>;
    fn handle_notification(
        &self,
        notification: S::InNotification,
    ) -> impl Future<Output = Result<(), Error>>;
}

fn method_not_found(method: &str) -> Error {
    Error::method_not_found().with_data(serde_json::json!({ "method": method }))
}

fn decode<T: DeserializeOwned>(method: &str, params: Option<&RawValue>) -> Result<T, Error> {
    let params = params
        .ok_or_else(|| Error::invalid_params().with_data(serde_json::json!({ "method": method })))?;
    serde_json::from_str(params.get()).map_err(Error::from)
}

fn decode_ext_params(params: Option<&RawValue>) -> Result<Option<serde_json::Value>, Error> {
    params
        .map(|raw| serde_json::from_str(raw.get()))
        .transpose()
        .map_err(Error::from)
}

/// The agent's side of a connection: decodes the methods an agent is called
/// with (`initialize`, `session/new`, `session/prompt`, ...).
pub struct AgentSide;

impl Side for AgentSide {
    type InRequest = ClientRequest;
    type OutResponse = AgentResponse;
    type InNotification = ClientNotification;

    fn decode_request(method: &str, params: Option<&RawValue>) -> Result<ClientRequest, Error> {
        if let Some(stripped) = strip_ext_prefix(method) {
            return Ok(ClientRequest::ExtMethodRequest(ExtRequest {
                method: stripped.into(),
                params: decode_ext_params(params)?,
            }));
        }
        match method {
            INITIALIZE_METHOD_NAME => Ok(ClientRequest::InitializeRequest(decode(method, params)?)),
            AUTHENTICATE_METHOD_NAME => {
                Ok(ClientRequest::AuthenticateRequest(decode(method, params)?))
            }
            SESSION_NEW_METHOD_NAME => Ok(ClientRequest::NewSessionRequest(decode(method, params)?)),
            SESSION_LOAD_METHOD_NAME => {
                Ok(ClientRequest::LoadSessionRequest(decode(method, params)?))
            }
            SESSION_SET_MODE_METHOD_NAME => {
                Ok(ClientRequest::SetSessionModeRequest(decode(method, params)?))
            }
            #[cfg(feature = "unstable")]
            SESSION_SET_MODEL_METHOD_NAME => {
                Ok(ClientRequest::SetSessionModelRequest(decode(method, params)?))
            }
            SESSION_PROMPT_METHOD_NAME => Ok(ClientRequest::PromptRequest(decode(method, params)?)),
            _ => Err(method_not_found(method)),
        }
    }

    fn decode_notification(
        method: &str,
        params: Option<&RawValue>,
    ) -> Result<ClientNotification, Error> {
        if let Some(stripped) = strip_ext_prefix(method) {
            return Ok(ClientNotification::ExtNotification(ExtNotification {
                method: stripped.into(),
                params: decode_ext_params(params)?,
            }));
        }
        match method {
            SESSION_CANCEL_METHOD_NAME => {
                Ok(ClientNotification::CancelNotification(decode(method, params)?))
            }
            _ => Err(method_not_found(method)),
        }
    }
}

/// The client's side of a connection: decodes the methods a client is called
/// with (`session/update`, `fs/read_text_file`, `terminal/create`, ...).
pub struct ClientSide;

impl Side for ClientSide {
    type InRequest = AgentRequest;
    type OutResponse = ClientResponse;
    type InNotification = AgentNotification;

    fn decode_request(method: &str, params: Option<&RawValue>) -> Result<AgentRequest, Error> {
        if let Some(stripped) = strip_ext_prefix(method) {
            return Ok(AgentRequest::ExtMethodRequest(ExtRequest {
                method: stripped.into(),
                params: decode_ext_params(params)?,
            }));
        }
        match method {
            SESSION_REQUEST_PERMISSION_METHOD_NAME => {
                Ok(AgentRequest::RequestPermissionRequest(decode(method, params)?))
            }
            FS_WRITE_TEXT_FILE_METHOD_NAME => {
                Ok(AgentRequest::WriteTextFileRequest(decode(method, params)?))
            }
            FS_READ_TEXT_FILE_METHOD_NAME => {
                Ok(AgentRequest::ReadTextFileRequest(decode(method, params)?))
            }
            TERMINAL_CREATE_METHOD_NAME => {
                Ok(AgentRequest::CreateTerminalRequest(decode(method, params)?))
            }
            TERMINAL_OUTPUT_METHOD_NAME => {
                Ok(AgentRequest::TerminalOutputRequest(decode(method, params)?))
            }
            TERMINAL_RELEASE_METHOD_NAME => {
                Ok(AgentRequest::ReleaseTerminalRequest(decode(method, params)?))
            }
            TERMINAL_WAIT_FOR_EXIT_METHOD_NAME => {
                Ok(AgentRequest::WaitForTerminalExitRequest(decode(method, params)?))
            }
            TERMINAL_KILL_METHOD_NAME => {
                Ok(AgentRequest::KillTerminalCommandRequest(decode(method, params)?))
            }
            _ => Err(method_not_found(method)),
        }
    }

    fn decode_notification(
        method: &str,
        params: Option<&RawValue>,
    ) -> Result<AgentNotification, Error> {
        if let Some(stripped) = strip_ext_prefix(method) {
            return Ok(AgentNotification::ExtNotification(ExtNotification {
                method: stripped.into(),
                params: decode_ext_params(params)?,
            }));
        }
        match method {
            SESSION_UPDATE_NOTIFICATION => {
                Ok(AgentNotification::SessionNotification(decode(method, params)?))
            }
            _ => Err(method_not_found(method)),
        }
    }
}

struct AgentHandler<A>(A);

impl<A: Agent> MessageHandler<AgentSide> for AgentHandler<A> {
    async fn handle_request(&self, request: ClientRequest) -> Result<AgentResponse, Error> {
        match request {
            ClientRequest::InitializeRequest(r) => {
                self.0.initialize(r).await.map(AgentResponse::InitializeResponse)
            }
            ClientRequest::AuthenticateRequest(r) => {
                self.0.authenticate(r).await.map(AgentResponse::AuthenticateResponse)
            }
            ClientRequest::NewSessionRequest(r) => {
                self.0.new_session(r).await.map(AgentResponse::NewSessionResponse)
            }
            ClientRequest::LoadSessionRequest(r) => {
                self.0.load_session(r).await.map(AgentResponse::LoadSessionResponse)
            }
            ClientRequest::SetSessionModeRequest(r) => {
                self.0.set_session_mode(r).await.map(AgentResponse::SetSessionModeResponse)
            }
            #[cfg(feature = "unstable")]
            ClientRequest::SetSessionModelRequest(r) => {
                self.0.set_session_model(r).await.map(AgentResponse::SetSessionModelResponse)
            }
            ClientRequest::PromptRequest(r) => {
                self.0.prompt(r).await.map(AgentResponse::PromptResponse)
            }
            ClientRequest::ExtMethodRequest(r) => {
                self.0.ext_method(r).await.map(AgentResponse::ExtMethodResponse)
            }
        }
    }

    async fn handle_notification(&self, notification: ClientNotification) -> Result<(), Error> {
        match notification {
            ClientNotification::CancelNotification(n) => self.0.cancel(n).await,
            ClientNotification::ExtNotification(n) => self.0.ext_notification(n).await,
        }
    }
}

struct ClientHandler<C>(C);

impl<C: Client> MessageHandler<ClientSide> for ClientHandler<C> {
    async fn handle_request(&self, request: AgentRequest) -> Result<ClientResponse, Error> {
        match request {
            AgentRequest::RequestPermissionRequest(r) => {
                self.0.request_permission(r).await.map(ClientResponse::RequestPermissionResponse)
            }
            AgentRequest::WriteTextFileRequest(r) => {
                self.0.write_text_file(r).await.map(ClientResponse::WriteTextFileResponse)
            }
            AgentRequest::ReadTextFileRequest(r) => {
                self.0.read_text_file(r).await.map(ClientResponse::ReadTextFileResponse)
            }
            AgentRequest::CreateTerminalRequest(r) => {
                self.0.create_terminal(r).await.map(ClientResponse::CreateTerminalResponse)
            }
            AgentRequest::TerminalOutputRequest(r) => {
                self.0.terminal_output(r).await.map(ClientResponse::TerminalOutputResponse)
            }
            AgentRequest::ReleaseTerminalRequest(r) => {
                self.0.release_terminal(r).await.map(ClientResponse::ReleaseTerminalResponse)
            }
            AgentRequest::WaitForTerminalExitRequest(r) => self
                .0
                .wait_for_terminal_exit(r)
                .await
                .map(ClientResponse::WaitForTerminalExitResponse),
            AgentRequest::KillTerminalCommandRequest(r) => self
                .0
                .kill_terminal_command(r)
                .await
                .map(ClientResponse::KillTerminalCommandResponse),
            AgentRequest::ExtMethodRequest(r) => {
                self.0.ext_method(r).await.map(ClientResponse::ExtMethodResponse)
            }
        }
    }

    async fn handle_notification(&self, notification: AgentNotification) -> Result<(), Error> {
        match notification {
            AgentNotification::SessionNotification(n) => self.0.session_notification(n).await,
            AgentNotification::ExtNotification(n) => self.0.ext_notification(n).await,
        }
    }
}

// Wire framing.

#[derive(Debug)]
pub(crate) enum OutgoingMessage {
    Request { id: i32, method: Arc<str>, params: Box<RawValue> },
    Response { id: i32, result: ResponseResult },
    Notification { method: Arc<str>, params: Box<RawValue> },
}

#[derive(Debug)]
pub(crate) enum ResponseResult {
    Result(Box<RawValue>),
    Error(Error),
}

impl OutgoingMessage {
    fn to_line(&self) -> serde_json::Result<String> {
        let value = match self {
            OutgoingMessage::Request { id, method, params } => serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }),
            OutgoingMessage::Response { id, result } => match result {
                ResponseResult::Result(value) => serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": value,
                }),
                ResponseResult::Error(error) => serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": error,
                }),
            },
            OutgoingMessage::Notification { method, params } => serde_json::json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
            }),
        };
        let mut line = serde_json::to_string(&value)?;
        line.push('\n');
        Ok(line)
    }
}

#[derive(serde::Deserialize)]
struct RawIncomingMessage<'a> {
    id: Option<i32>,
    method: Option<Arc<str>>,
    #[serde(default, borrow)]
    params: Option<&'a RawValue>,
    #[serde(default, borrow)]
    result: Option<&'a RawValue>,
    #[serde(default)]
    error: Option<Error>,
}

/// Reads one newline-delimited frame into `buf`, clearing it first. Returns
/// `Ok(true)` if a complete frame (including the trailing `\n`) was read,
/// `Ok(false)` on a clean EOF with nothing buffered. A frame exceeding
/// `max_len` bytes is a fatal transport error; the caller stops reading.
async fn read_frame(
    reader: &mut (impl futures::AsyncBufRead + Unpin),
    max_len: usize,
    buf: &mut Vec<u8>,
) -> Result<bool, TransportError> {
    buf.clear();
    loop {
        let available = reader.fill_buf().await.map_err(TransportError::Io)?;
        if available.is_empty() {
            return Ok(false);
        }
        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            buf.extend_from_slice(&available[..=pos]);
            reader.consume(pos + 1);
            if buf.len() > max_len {
                return Err(TransportError::FrameTooLarge { len: buf.len(), limit: max_len });
            }
            return Ok(true);
        }
        let n = available.len();
        buf.extend_from_slice(available);
        reader.consume(n);
        if buf.len() > max_len {
            return Err(TransportError::FrameTooLarge { len: buf.len(), limit: max_len });
        }
    }
}

// The engine.

type BoxedDeserialize = Box<dyn Fn(&RawValue) -> Result<Box<dyn Any>, Error>>;

struct PendingResponse {
    deserialize: BoxedDeserialize,
    respond: oneshot::Sender<Result<Box<dyn Any>, Error>>,
}

struct ConnectionState {
    outgoing_tx: mpsc::UnboundedSender<OutgoingMessage>,
    pending_responses: Mutex<HashMap<i32, PendingResponse>>,
    next_id: AtomicI32,
    stream_tx: StreamSender,
    stream_broadcast: StreamBroadcast,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl ConnectionState {
    fn new() -> (Rc<Self>, mpsc::UnboundedReceiver<OutgoingMessage>, oneshot::Receiver<()>) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded();
        let (stream_tx, stream_broadcast) = StreamBroadcast::new();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        (
            Rc::new(Self {
                outgoing_tx,
                pending_responses: Mutex::new(HashMap::new()),
                next_id: AtomicI32::new(0),
                stream_tx,
                stream_broadcast,
                shutdown: Mutex::new(Some(shutdown_tx)),
            }),
            outgoing_rx,
            shutdown_rx,
        )
    }

    fn subscribe(&self) -> StreamReceiver {
        self.stream_broadcast.receiver()
    }

    fn close(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            tx.send(()).ok();
        }
    }

    fn send(&self, message: OutgoingMessage) -> Result<(), Error> {
        self.outgoing_tx.unbounded_send(message).map_err(|_| Error::from(TransportError::Closed))
    }

    fn next_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn request<Out: DeserializeOwned + 'static>(
        &self,
        method: &'static str,
        params: &impl Serialize,
    ) -> Result<Out, Error> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending_responses.lock().insert(
            id,
            PendingResponse {
                deserialize: Box::new(|raw: &RawValue| {
                    serde_json::from_str::<Out>(raw.get())
                        .map(|value| Box::new(value) as Box<dyn Any>)
                        .map_err(Error::from)
                }),
                respond: tx,
            },
        );
        let params = serde_json::value::to_raw_value(params).map_err(Error::from)?;
        if let Err(err) = self.send(OutgoingMessage::Request { id, method: method.into(), params }) {
            self.pending_responses.lock().remove(&id);
            return Err(err);
        }
        match rx.await {
            Ok(Ok(value)) => Ok(*value.downcast::<Out>().expect("response type mismatch")),
            Ok(Err(err)) => Err(err),
            Err(_) => {
                self.pending_responses.lock().remove(&id);
                Err(Error::from(TransportError::Closed))
            }
        }
    }

    fn notify(&self, method: &'static str, params: &impl Serialize) -> Result<(), Error> {
        let params = serde_json::value::to_raw_value(params).map_err(Error::from)?;
        self.send(OutgoingMessage::Notification { method: method.into(), params })
    }

    async fn ext_request(&self, args: ExtRequest) -> Result<serde_json::Value, Error> {
        let method: Arc<str> = format!("{}{}", crate::ext::EXT_METHOD_PREFIX, args.method).into();
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending_responses.lock().insert(
            id,
            PendingResponse {
                deserialize: Box::new(|raw: &RawValue| {
                    serde_json::from_str::<serde_json::Value>(raw.get())
                        .map(|value| Box::new(value) as Box<dyn Any>)
                        .map_err(Error::from)
                }),
                respond: tx,
            },
        );
        let params = serde_json::value::to_raw_value(&args.params).map_err(Error::from)?;
        if let Err(err) = self.send(OutgoingMessage::Request { id, method, params }) {
            self.pending_responses.lock().remove(&id);
            return Err(err);
        }
        match rx.await {
            Ok(Ok(value)) => {
                Ok(*value.downcast::<serde_json::Value>().expect("response type mismatch"))
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                self.pending_responses.lock().remove(&id);
                Err(Error::from(TransportError::Closed))
            }
        }
    }

    fn ext_notify(&self, args: ExtNotification) -> Result<(), Error> {
        let method: Arc<str> = format!("{}{}", crate::ext::EXT_METHOD_PREFIX, args.method).into();
        let params = serde_json::value::to_raw_value(&args.params).map_err(Error::from)?;
        self.send(OutgoingMessage::Notification { method, params })
    }
}

/// Classifies and dispatches one decoded frame. Requests are handed to their
/// own task via `spawn` so a slow handler can't stall the read loop;
/// notifications are awaited right here, inline, so they are delivered to
/// the handler in the exact order they were received on the wire (a slow
/// notification handler DOES stall further inbound processing, matching the
/// ordering guarantee `session/update` depends on).
async fn handle_incoming_line<Local, H>(
    line: &[u8],
    state: &Rc<ConnectionState>,
    handler: &Rc<H>,
    spawn: &Rc<dyn Fn(LocalBoxFuture<'static, ()>)>,
) where
    Local: Side,
    H: MessageHandler<Local> + 'static,
{
    let text = match std::str::from_utf8(line) {
        Ok(text) => text,
        Err(_) => {
            log::warn!("dropping non-utf8 frame");
            return;
        }
    };
    let parsed: RawIncomingMessage = match serde_json::from_str(text) {
        Ok(parsed) => parsed,
        Err(err) => {
            log::warn!("dropping malformed frame: {err}");
            return;
        }
    };

    match (parsed.id, parsed.method) {
        (Some(id), Some(method)) => {
            state.stream_tx.incoming_request(id, method.clone(), &parsed.params);
            let decoded = Local::decode_request(&method, parsed.params);
            let state = state.clone();
            let handler = handler.clone();
            spawn(Box::pin(async move {
                let result = match decoded {
                    Ok(request) => handler.handle_request(request).await,
                    Err(err) => Err(err),
                };
                let outgoing = match result {
                    Ok(response) => match serde_json::value::to_raw_value(&response) {
                        Ok(raw) => OutgoingMessage::Response { id, result: ResponseResult::Result(raw) },
                        Err(err) => {
                            OutgoingMessage::Response { id, result: ResponseResult::Error(Error::from(err)) }
                        }
                    },
                    Err(err) => OutgoingMessage::Response { id, result: ResponseResult::Error(err) },
                };
                state.send(outgoing).ok();
            }));
        }
        (None, Some(method)) => {
            state.stream_tx.incoming_notification(method.clone(), &parsed.params);
            let decoded = Local::decode_notification(&method, parsed.params);
            let result = match decoded {
                Ok(notification) => handler.handle_notification(notification).await,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                log::warn!("notification handler returned an error: {err}");
            }
        }
        (Some(id), None) => {
            let result_ref: Result<Option<&RawValue>, &Error> = match &parsed.error {
                Some(err) => Err(err),
                None => Ok(parsed.result),
            };
            state.stream_tx.incoming_response(id, result_ref);
            if let Some(pending) = state.pending_responses.lock().remove(&id) {
                let outcome = match parsed.error {
                    Some(err) => Err(err),
                    None => {
                        let null = serde_json::value::to_raw_value(&serde_json::Value::Null).unwrap();
                        let raw = parsed.result.unwrap_or(null.as_ref());
                        (pending.deserialize)(raw)
                    }
                };
                pending.respond.send(outcome).ok();
            }
        }
        (None, None) => log::warn!("dropping frame with neither id nor method"),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_io<Local, H>(
    state: Rc<ConnectionState>,
    handler: Rc<H>,
    mut outgoing_rx: mpsc::UnboundedReceiver<OutgoingMessage>,
    mut shutdown_rx: oneshot::Receiver<()>,
    outgoing: impl AsyncWrite + Unpin,
    incoming: impl AsyncRead + Unpin,
    spawn: Rc<dyn Fn(LocalBoxFuture<'static, ()>)>,
    max_frame_len: usize,
) where
    Local: Side,
    H: MessageHandler<Local> + 'static,
{
    let mut writer = outgoing;
    let mut reader = BufReader::new(incoming);
    let mut line = Vec::new();

    loop {
        select_biased! {
            _ = shutdown_rx => break,
            message = outgoing_rx.next() => {
                let Some(message) = message else { break };
                state.stream_tx.outgoing(&message);
                match message.to_line() {
                    Ok(text) => {
                        if writer.write_all(text.as_bytes()).await.is_err() {
                            break;
                        }
                        if writer.flush().await.is_err() {
                            break;
                        }
                    }
                    Err(err) => log::error!("failed to serialize outgoing message: {err}"),
                }
            }
            frame = read_frame(&mut reader, max_frame_len, &mut line).fuse() => {
                match frame {
                    Ok(true) => handle_incoming_line(&line, &state, &handler, &spawn).await,
                    Ok(false) => break,
                    Err(err) => {
                        log::error!("transport error: {err}");
                        break;
                    }
                }
            }
        }
    }

    for (_, pending) in state.pending_responses.lock().drain() {
        pending.respond.send(Err(Error::from(TransportError::Closed))).ok();
    }
}

// Public facades.

/// Hosts an [`Agent`] implementation and talks to a single client over a
/// duplex byte stream (typically the client process's stdio).
///
/// Inbound agent-method calls are dispatched to the wrapped `Agent`; outbound
/// calls on `self` (`session_notification`, `request_permission`, the `fs/*`
/// and `terminal/*` methods) are the client methods the `Agent`
/// implementation is expected to call back into while handling a request,
/// e.g. from inside `prompt`.
#[derive(Clone)]
pub struct AgentSideConnection {
    state: Rc<ConnectionState>,
}

impl AgentSideConnection {
    /// Builds a connection over `outgoing`/`incoming`, using the default
    /// frame size cap. `to_agent` is handed the connection itself so the
    /// constructed `Agent` can capture it and call back out to the client.
    /// `spawn` runs futures the connection hands it (inbound dispatch tasks);
    /// on a single-threaded executor this should be something like
    /// `tokio::task::spawn_local`.
    pub fn new<A, F>(
        to_agent: F,
        outgoing: impl AsyncWrite + Unpin + 'static,
        incoming: impl AsyncRead + Unpin + 'static,
        spawn: impl Fn(LocalBoxFuture<'static, ()>) + 'static,
    ) -> (Self, impl Future<Output = ()>)
    where
        A: Agent + 'static,
        F: FnOnce(AgentSideConnection) -> A,
    {
        Self::with_max_frame_len(to_agent, outgoing, incoming, spawn, DEFAULT_MAX_FRAME_LEN)
    }

    /// Like [`Self::new`] but with an explicit per-frame byte cap.
    pub fn with_max_frame_len<A, F>(
        to_agent: F,
        outgoing: impl AsyncWrite + Unpin + 'static,
        incoming: impl AsyncRead + Unpin + 'static,
        spawn: impl Fn(LocalBoxFuture<'static, ()>) + 'static,
        max_frame_len: usize,
    ) -> (Self, impl Future<Output = ()>)
    where
        A: Agent + 'static,
        F: FnOnce(AgentSideConnection) -> A,
    {
        let (state, outgoing_rx, shutdown_rx) = ConnectionState::new();
        let connection = AgentSideConnection { state: state.clone() };
        let handler = Rc::new(AgentHandler(to_agent(connection.clone())));
        let spawn = Rc::new(spawn);
        let io_future =
            run_io(state, handler, outgoing_rx, shutdown_rx, outgoing, incoming, spawn, max_frame_len);
        (connection, io_future)
    }

    /// Subscribes to a copy of every message flowing over this connection,
    /// for debugging or monitoring.
    pub fn subscribe(&self) -> StreamReceiver {
        self.state.subscribe()
    }

    /// Ends the read/write loop. Any requests still awaiting a response are
    /// settled with a transport error.
    pub fn close(&self) {
        self.state.close()
    }

    pub async fn session_notification(&self, args: SessionNotification) -> Result<(), Error> {
        self.state.notify(SESSION_UPDATE_NOTIFICATION, &args)
    }

    pub async fn request_permission(
        &self,
        args: RequestPermissionRequest,
    ) -> Result<RequestPermissionResponse, Error> {
        self.state.request(SESSION_REQUEST_PERMISSION_METHOD_NAME, &args).await
    }

    pub async fn write_text_file(
        &self,
        args: WriteTextFileRequest,
    ) -> Result<WriteTextFileResponse, Error> {
        self.state.request(FS_WRITE_TEXT_FILE_METHOD_NAME, &args).await
    }

    pub async fn read_text_file(
        &self,
        args: ReadTextFileRequest,
    ) -> Result<ReadTextFileResponse, Error> {
        self.state.request(FS_READ_TEXT_FILE_METHOD_NAME, &args).await
    }

    /// Creates a terminal and returns a handle bound to it, or `None` if the
    /// client doesn't support terminals (it answered `null` rather than a
    /// `CreateTerminalResponse`). Dropping the handle does not release the
    /// terminal; call [`TerminalHandle::release`] explicitly.
    pub async fn create_terminal(
        &self,
        args: CreateTerminalRequest,
    ) -> Result<Option<TerminalHandle>, Error> {
        let session_id = args.session_id.clone();
        let response: Option<CreateTerminalResponse> =
            self.state.request(TERMINAL_CREATE_METHOD_NAME, &args).await?;
        Ok(response.map(|response| TerminalHandle::new(self.clone(), session_id, response.terminal_id)))
    }

    pub(crate) async fn terminal_output(
        &self,
        args: TerminalOutputRequest,
    ) -> Result<Option<TerminalOutputResponse>, Error> {
        self.state.request(TERMINAL_OUTPUT_METHOD_NAME, &args).await
    }

    pub(crate) async fn release_terminal(
        &self,
        args: ReleaseTerminalRequest,
    ) -> Result<ReleaseTerminalResponse, Error> {
        self.state.request(TERMINAL_RELEASE_METHOD_NAME, &args).await
    }

    pub(crate) async fn wait_for_terminal_exit(
        &self,
        args: WaitForTerminalExitRequest,
    ) -> Result<Option<WaitForTerminalExitResponse>, Error> {
        self.state.request(TERMINAL_WAIT_FOR_EXIT_METHOD_NAME, &args).await
    }

    pub(crate) async fn kill_terminal_command(
        &self,
        args: KillTerminalCommandRequest,
    ) -> Result<KillTerminalCommandResponse, Error> {
        self.state.request(TERMINAL_KILL_METHOD_NAME, &args).await
    }

    pub async fn ext_method(&self, args: ExtRequest) -> Result<serde_json::Value, Error> {
        self.state.ext_request(args).await
    }

    pub fn ext_notification(&self, args: ExtNotification) -> Result<(), Error> {
        self.state.ext_notify(args)
    }
}

/// Hosts a [`Client`] implementation and talks to a single agent over a
/// duplex byte stream (typically a child agent process's stdio).
///
/// Inbound client-method calls are dispatched to the wrapped `Client`;
/// outbound calls on `self` (`initialize`, `session/new`, `session/prompt`,
/// ...) are the agent methods this connection calls to drive a session.
#[derive(Clone)]
pub struct ClientSideConnection {
    state: Rc<ConnectionState>,
}

impl ClientSideConnection {
    pub fn new<C, F>(
        to_client: F,
        outgoing: impl AsyncWrite + Unpin + 'static,
        incoming: impl AsyncRead + Unpin + 'static,
        spawn: impl Fn(LocalBoxFuture<'static, ()>) + 'static,
    ) -> (Self, impl Future<Output = ()>)
    where
        C: Client + 'static,
        F: FnOnce(ClientSideConnection) -> C,
    {
        Self::with_max_frame_len(to_client, outgoing, incoming, spawn, DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len<C, F>(
        to_client: F,
        outgoing: impl AsyncWrite + Unpin + 'static,
        incoming: impl AsyncRead + Unpin + 'static,
        spawn: impl Fn(LocalBoxFuture<'static, ()>) + 'static,
        max_frame_len: usize,
    ) -> (Self, impl Future<Output = ()>)
    where
        C: Client + 'static,
        F: FnOnce(ClientSideConnection) -> C,
    {
        let (state, outgoing_rx, shutdown_rx) = ConnectionState::new();
        let connection = ClientSideConnection { state: state.clone() };
        let handler = Rc::new(ClientHandler(to_client(connection.clone())));
        let spawn = Rc::new(spawn);
        let io_future =
            run_io(state, handler, outgoing_rx, shutdown_rx, outgoing, incoming, spawn, max_frame_len);
        (connection, io_future)
    }

    pub fn subscribe(&self) -> StreamReceiver {
        self.state.subscribe()
    }

    pub fn close(&self) {
        self.state.close()
    }

    pub async fn initialize(
        &self,
        args: InitializeRequest,
    ) -> Result<crate::InitializeResponse, Error> {
        self.state.request(INITIALIZE_METHOD_NAME, &args).await
    }

    pub async fn authenticate(
        &self,
        args: AuthenticateRequest,
    ) -> Result<crate::AuthenticateResponse, Error> {
        self.state.request(AUTHENTICATE_METHOD_NAME, &args).await
    }

    pub async fn new_session(
        &self,
        args: NewSessionRequest,
    ) -> Result<crate::NewSessionResponse, Error> {
        self.state.request(SESSION_NEW_METHOD_NAME, &args).await
    }

    pub async fn load_session(
        &self,
        args: LoadSessionRequest,
    ) -> Result<crate::LoadSessionResponse, Error> {
        self.state.request(SESSION_LOAD_METHOD_NAME, &args).await
    }

    pub async fn set_session_mode(
        &self,
        args: SetSessionModeRequest,
    ) -> Result<crate::SetSessionModeResponse, Error> {
        self.state.request(SESSION_SET_MODE_METHOD_NAME, &args).await
    }

    #[cfg(feature = "unstable")]
    pub async fn set_session_model(
        &self,
        args: SetSessionModelRequest,
    ) -> Result<crate::SetSessionModelResponse, Error> {
        self.state.request(SESSION_SET_MODEL_METHOD_NAME, &args).await
    }

    pub async fn prompt(&self, args: PromptRequest) -> Result<crate::PromptResponse, Error> {
        self.state.request(SESSION_PROMPT_METHOD_NAME, &args).await
    }

    /// Notifies the agent to stop the in-progress prompt turn for a session.
    /// The agent answers the pending `session/prompt` response with
    /// `StopReason::Cancelled` rather than replying to this call directly.
    pub fn cancel(&self, args: CancelNotification) -> Result<(), Error> {
        self.state.notify(SESSION_CANCEL_METHOD_NAME, &args)
    }

    pub async fn ext_method(&self, args: ExtRequest) -> Result<serde_json::Value, Error> {
        self.state.ext_request(args).await
    }

    pub fn ext_notification(&self, args: ExtNotification) -> Result<(), Error> {
        self.state.ext_notify(args)
    }
}
