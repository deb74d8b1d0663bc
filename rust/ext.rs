//! Extension methods and notifications.
//!
//! Any wire method name beginning with `_` is routed to the generic
//! `ext_method`/`ext_notification` hooks on [`crate::Agent`]/[`crate::Client`]
//! instead of to a fixed-name handler. The leading underscore is stripped
//! before the hook sees it, so a peer sending `_zed/debugInfo` results in an
//! [`ExtRequest`] with `method == "zed/debugInfo"`.
//!
//! This lets either side add vendor-specific methods without a protocol
//! version bump: an implementation that doesn't recognize the stripped
//! method name can still inspect it and return `method_not_found`, and a
//! notification with no matching hook is simply dropped.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The `_` prefix that marks a wire method name as an extension method.
pub const EXT_METHOD_PREFIX: char = '_';

/// Strips the leading `_` from a wire method name, returning `None` if the
/// method is not an extension method.
pub fn strip_ext_prefix(method: &str) -> Option<&str> {
    method.strip_prefix(EXT_METHOD_PREFIX)
}

/// An extension method call, with the leading `_` already stripped from
/// `method`.
///
/// To help avoid conflicts, it's good practice for extension authors to
/// prefix their method names with a unique identifier such as a domain name.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtRequest {
    pub method: Arc<str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// The result of an extension method call: an arbitrary JSON value chosen
/// by the implementation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ExtResponse(pub serde_json::Value);

impl From<serde_json::Value> for ExtResponse {
    fn from(value: serde_json::Value) -> Self {
        ExtResponse(value)
    }
}

/// An extension notification, with the leading `_` already stripped from
/// `method`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtNotification {
    pub method: Arc<str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}
