//! Opaque wire identifiers. Each wraps an `Arc<str>` so clones are cheap and
//! the value can be hashed/compared without re-allocating, matching how the
//! rest of the schema treats every `*Id` the protocol hands back and forth.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

macro_rules! wire_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub Arc<str>);

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.into())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value.into())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

wire_id!(SessionId, "Identifies a session for the lifetime of the connection.");
wire_id!(ToolCallId, "Identifies a tool call within a session.");
wire_id!(PermissionOptionId, "Identifies one option of a permission request.");
wire_id!(TerminalId, "Identifies a terminal created via `terminal/create`.");
wire_id!(AuthMethodId, "Identifies one of the agent's advertised auth methods.");
wire_id!(SessionModeId, "Identifies one of a session's available modes.");
wire_id!(ModelId, "Identifies one of a session's available models.");

/// The protocol version this crate speaks, a single monotonically increasing
/// integer pinned at compile time. There is exactly one constant in scope,
/// [`crate::V1`]; peers that advertise a different version are rejected by
/// `initialize` at the application layer, not by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ProtocolVersion(pub u16);

/// The protocol version this crate speaks.
pub const V1: ProtocolVersion = ProtocolVersion(1);
