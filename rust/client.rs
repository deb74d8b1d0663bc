//! Methods and notifications the client handles/receives.
//!
//! This module defines the [`Client`] trait and all associated types for
//! implementing a client that interacts with AI coding agents via the
//! Agent-Client Protocol (ACP).

use std::path::PathBuf;

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    EnvVariable, Error, PermissionOptionId, SessionId, SessionNotification, TerminalId,
    ToolCallUpdate,
};

/// Defines the interface that ACP-compliant clients must implement.
///
/// Clients are typically code editors (IDEs, text editors) that provide the
/// interface between users and AI agents. They manage the environment,
/// handle user interactions, and control access to resources.
pub trait Client {
    /// Requests permission from the user for a tool call operation.
    ///
    /// If the client cancels the prompt turn via `session/cancel`, it MUST
    /// respond to any requests still pending with
    /// [`RequestPermissionOutcome::Cancelled`].
    fn request_permission(
        &self,
        args: RequestPermissionRequest,
    ) -> impl Future<Output = Result<RequestPermissionResponse, Error>>;

    /// Writes content to a text file in the client's file system. Only
    /// available if the client advertises the `fs.writeTextFile` capability.
    fn write_text_file(
        &self,
        args: WriteTextFileRequest,
    ) -> impl Future<Output = Result<WriteTextFileResponse, Error>>;

    /// Reads content from a text file in the client's file system. Only
    /// available if the client advertises the `fs.readTextFile` capability.
    fn read_text_file(
        &self,
        args: ReadTextFileRequest,
    ) -> impl Future<Output = Result<ReadTextFileResponse, Error>>;

    /// Creates a terminal and starts executing a command in it.
    ///
    /// Optional: clients that don't expose terminals leave this at its
    /// default, which answers `null` rather than an error. Agents should
    /// check the `terminal` client capability before relying on it.
    fn create_terminal(
        &self,
        args: CreateTerminalRequest,
    ) -> impl Future<Output = Result<Option<CreateTerminalResponse>, Error>> {
        async { Ok(None) }
    }

    /// Returns the output accumulated so far by a terminal.
    ///
    /// Optional: clients that don't expose terminals leave this at its
    /// default, which answers `null` rather than an error.
    fn terminal_output(
        &self,
        args: TerminalOutputRequest,
    ) -> impl Future<Output = Result<Option<TerminalOutputResponse>, Error>> {
        async { Ok(None) }
    }

    /// Releases a terminal and any resources associated with it.
    ///
    /// Optional: clients that don't expose terminals leave this at its
    /// default, which answers every request with an empty success object
    /// (there's nothing to release if nothing was ever created).
    fn release_terminal(
        &self,
        args: ReleaseTerminalRequest,
    ) -> impl Future<Output = Result<ReleaseTerminalResponse, Error>> {
        async { Ok(ReleaseTerminalResponse::default()) }
    }

    /// Waits for a terminal's command to exit.
    ///
    /// Optional: clients that don't expose terminals leave this at its
    /// default, which answers `null` rather than an error.
    fn wait_for_terminal_exit(
        &self,
        args: WaitForTerminalExitRequest,
    ) -> impl Future<Output = Result<Option<WaitForTerminalExitResponse>, Error>> {
        async { Ok(None) }
    }

    /// Kills a terminal's command without releasing the terminal.
    ///
    /// Optional: clients that don't expose terminals leave this at its
    /// default, which answers every request with an empty success object.
    fn kill_terminal_command(
        &self,
        args: KillTerminalCommandRequest,
    ) -> impl Future<Output = Result<KillTerminalCommandResponse, Error>> {
        async { Ok(KillTerminalCommandResponse::default()) }
    }

    /// Handles session update notifications from the agent.
    ///
    /// This is a notification endpoint (no response expected) that receives
    /// real-time updates about session progress: message chunks, tool
    /// calls, plans, and mode/command changes.
    ///
    /// Clients SHOULD continue accepting updates even after sending a
    /// `session/cancel` notification, since the agent may send final
    /// updates before responding with the cancelled stop reason.
    fn session_notification(
        &self,
        args: SessionNotification,
    ) -> impl Future<Output = Result<(), Error>>;

    /// Handles an extension method call whose wire name began with `_`.
    /// Clients with no extensions leave this unimplemented and the router
    /// answers `method_not_found`.
    fn ext_method(
        &self,
        args: crate::ExtRequest,
    ) -> impl Future<Output = Result<crate::ExtResponse, Error>> {
        async { Err(Error::method_not_found()) }
    }

    /// Handles an extension notification whose wire name began with `_`.
    /// Absent handlers cause the notification to be silently dropped.
    fn ext_notification(
        &self,
        args: crate::ExtNotification,
    ) -> impl Future<Output = Result<(), Error>> {
        async { Ok(()) }
    }
}

// Permission

/// Request for user permission to execute a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestPermissionRequest {
    pub session_id: SessionId,
    pub tool_call: ToolCallUpdate,
    pub options: Vec<PermissionOption>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// An option presented to the user when requesting permission.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PermissionOption {
    #[serde(rename = "optionId")]
    pub id: PermissionOptionId,
    pub name: String,
    pub kind: PermissionOptionKind,
}

/// The type of permission option being presented to the user. Helps
/// clients choose appropriate icons and UI treatment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOptionKind {
    AllowOnce,
    AllowAlways,
    RejectOnce,
    RejectAlways,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestPermissionResponse {
    pub outcome: RequestPermissionOutcome,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// The outcome of a permission request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestPermissionOutcome {
    /// The prompt turn was cancelled before the user responded. A client
    /// that receives `session/cancel` while this request is pending MUST
    /// answer it with this outcome rather than leaving it unanswered.
    Cancelled,
    /// The user selected one of the provided options.
    #[serde(rename_all = "camelCase")]
    Selected { option_id: PermissionOptionId },
}

// Write text file

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteTextFileRequest {
    pub session_id: SessionId,
    pub path: PathBuf,
    pub content: String,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteTextFileResponse {
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

// Read text file

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadTextFileRequest {
    pub session_id: SessionId,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadTextFileResponse {
    pub content: String,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

// Terminals

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTerminalRequest {
    pub session_id: SessionId,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVariable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_byte_limit: Option<u64>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTerminalResponse {
    pub terminal_id: TerminalId,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TerminalOutputRequest {
    pub session_id: SessionId,
    pub terminal_id: TerminalId,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TerminalOutputResponse {
    pub output: String,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<TerminalExitStatus>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseTerminalRequest {
    pub session_id: SessionId,
    pub terminal_id: TerminalId,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseTerminalResponse {
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WaitForTerminalExitRequest {
    pub session_id: SessionId,
    pub terminal_id: TerminalId,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WaitForTerminalExitResponse {
    #[serde(flatten)]
    pub exit_status: TerminalExitStatus,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TerminalExitStatus {
    pub exit_code: Option<u32>,
    pub signal: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KillTerminalCommandRequest {
    pub session_id: SessionId,
    pub terminal_id: TerminalId,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KillTerminalCommandResponse {
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

// Method schema

/// Names of all methods that clients handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMethodNames {
    pub session_request_permission: &'static str,
    pub session_update: &'static str,
    pub fs_write_text_file: &'static str,
    pub fs_read_text_file: &'static str,
    pub terminal_create: &'static str,
    pub terminal_output: &'static str,
    pub terminal_release: &'static str,
    pub terminal_wait_for_exit: &'static str,
    pub terminal_kill: &'static str,
}

pub const CLIENT_METHOD_NAMES: ClientMethodNames = ClientMethodNames {
    session_update: SESSION_UPDATE_NOTIFICATION,
    session_request_permission: SESSION_REQUEST_PERMISSION_METHOD_NAME,
    fs_write_text_file: FS_WRITE_TEXT_FILE_METHOD_NAME,
    fs_read_text_file: FS_READ_TEXT_FILE_METHOD_NAME,
    terminal_create: TERMINAL_CREATE_METHOD_NAME,
    terminal_output: TERMINAL_OUTPUT_METHOD_NAME,
    terminal_release: TERMINAL_RELEASE_METHOD_NAME,
    terminal_wait_for_exit: TERMINAL_WAIT_FOR_EXIT_METHOD_NAME,
    terminal_kill: TERMINAL_KILL_METHOD_NAME,
};

pub(crate) const SESSION_UPDATE_NOTIFICATION: &str = "session/update";
pub(crate) const SESSION_REQUEST_PERMISSION_METHOD_NAME: &str = "session/request_permission";
pub(crate) const FS_WRITE_TEXT_FILE_METHOD_NAME: &str = "fs/write_text_file";
pub(crate) const FS_READ_TEXT_FILE_METHOD_NAME: &str = "fs/read_text_file";
pub(crate) const TERMINAL_CREATE_METHOD_NAME: &str = "terminal/create";
pub(crate) const TERMINAL_OUTPUT_METHOD_NAME: &str = "terminal/output";
pub(crate) const TERMINAL_RELEASE_METHOD_NAME: &str = "terminal/release";
pub(crate) const TERMINAL_WAIT_FOR_EXIT_METHOD_NAME: &str = "terminal/wait_for_exit";
pub(crate) const TERMINAL_KILL_METHOD_NAME: &str = "terminal/kill";

/// All possible requests that an agent can send to a client.
///
/// This enum is used internally for routing RPC requests. You typically
/// won't need it directly — use the methods on the [`Client`] trait.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum AgentRequest {
    WriteTextFileRequest(WriteTextFileRequest),
    ReadTextFileRequest(ReadTextFileRequest),
    RequestPermissionRequest(RequestPermissionRequest),
    CreateTerminalRequest(CreateTerminalRequest),
    TerminalOutputRequest(TerminalOutputRequest),
    ReleaseTerminalRequest(ReleaseTerminalRequest),
    WaitForTerminalExitRequest(WaitForTerminalExitRequest),
    KillTerminalCommandRequest(KillTerminalCommandRequest),
    ExtMethodRequest(crate::ExtRequest),
}

/// All possible responses that a client can send to an agent.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ClientResponse {
    WriteTextFileResponse(WriteTextFileResponse),
    ReadTextFileResponse(ReadTextFileResponse),
    RequestPermissionResponse(RequestPermissionResponse),
    CreateTerminalResponse(Option<CreateTerminalResponse>),
    TerminalOutputResponse(Option<TerminalOutputResponse>),
    ReleaseTerminalResponse(ReleaseTerminalResponse),
    WaitForTerminalExitResponse(Option<WaitForTerminalExitResponse>),
    KillTerminalCommandResponse(KillTerminalCommandResponse),
    ExtMethodResponse(crate::ExtResponse),
}

/// All possible notifications that an agent can send to a client.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum AgentNotification {
    SessionNotification(SessionNotification),
    ExtNotification(crate::ExtNotification),
}
