//! A bidirectional JSON-RPC 2.0 runtime for the Agent-Client Protocol (ACP).
//!
//! An ACP connection couples an **agent** (plans and streams work) with a
//! **client** (owns the user, filesystem, and terminal) over a duplex byte
//! stream — typically a spawned child process's stdio. Both peers serve a
//! declared set of methods while concurrently issuing outbound calls; see
//! [`connection`] for the engine, [`agent::Agent`]/[`client::Client`] for the
//! two method surfaces a peer implements, and [`session`]/[`tool_call`]/
//! [`content`]/[`plan`] for the data carried over the wire during a prompt
//! turn.
//!
//! This crate does not implement the semantic work of an agent (planning,
//! model calls) or a client (rendering, user interaction); it only routes
//! their messages.

mod content;
mod error;
mod ext;
mod ids;
mod plan;
mod session;
mod tool_call;

pub mod agent;
pub mod client;
mod connection;
mod stream_broadcast;
mod terminal;

pub use agent::{
    Agent, AgentMethodNames, AgentResponse, AuthMethod, AuthenticateRequest, AuthenticateResponse,
    CancelNotification, ClientNotification, ClientRequest, InitializeRequest, InitializeResponse,
    LoadSessionRequest, LoadSessionResponse, NewSessionRequest, NewSessionResponse, PromptRequest,
    PromptResponse, SetSessionModeRequest, SetSessionModeResponse, StopReason, AGENT_METHOD_NAMES,
};
#[cfg(feature = "unstable")]
pub use agent::{SetSessionModelRequest, SetSessionModelResponse};
pub use client::{
    AgentNotification, AgentRequest, Client, ClientMethodNames, ClientResponse,
    CreateTerminalRequest, CreateTerminalResponse, KillTerminalCommandRequest,
    KillTerminalCommandResponse, PermissionOption, PermissionOptionKind, ReadTextFileRequest,
    ReadTextFileResponse, ReleaseTerminalRequest, ReleaseTerminalResponse,
    RequestPermissionOutcome, RequestPermissionRequest, RequestPermissionResponse,
    TerminalExitStatus, TerminalOutputRequest, TerminalOutputResponse,
    WaitForTerminalExitRequest, WaitForTerminalExitResponse, WriteTextFileRequest,
    WriteTextFileResponse, CLIENT_METHOD_NAMES,
};
pub use connection::{
    AgentSide, AgentSideConnection, ClientSide, ClientSideConnection, Side, DEFAULT_MAX_FRAME_LEN,
};
pub use content::{
    Annotations, AudioContent, BlobResourceContents, ContentBlock, EmbeddedResource,
    EmbeddedResourceResource, ImageContent, ResourceLink, Role, TextContent, TextResourceContents,
};
pub use error::{Error, ErrorCode, TransportError};
pub use ext::{ExtNotification, ExtRequest, ExtResponse, EXT_METHOD_PREFIX};
pub use ids::{
    AuthMethodId, ModelId, PermissionOptionId, ProtocolVersion, SessionId, SessionModeId,
    TerminalId, ToolCallId, V1,
};
pub use plan::{Plan, PlanEntry, PlanEntryPriority, PlanEntryStatus};
pub use session::{
    AvailableCommand, AvailableCommandInput, AgentCapabilities, ClientCapabilities,
    EnvVariable, FileSystemCapability, HttpHeader, HttpMcpServer, McpServer, ModelInfo,
    PromptCapabilities, SessionMode, SessionModeState, SessionNotification, SseMcpServer,
    StdioMcpServer, SessionUpdate,
};
#[cfg(feature = "unstable")]
pub use session::SessionModelState;
pub use stream_broadcast::{StreamMessage, StreamMessageContent, StreamMessageDirection, StreamReceiver};
pub use terminal::TerminalHandle;
pub use tool_call::{
    Diff, ToolCall, ToolCallContent, ToolCallLocation, ToolCallStatus, ToolCallUpdate,
    ToolCallUpdateFields, ToolKind,
};
