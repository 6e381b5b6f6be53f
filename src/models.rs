//! Input/output DTOs and schema-bearing types
//!
//! Defines all data structures used in MCP tool contracts. Each type is
//! annotated with `JsonSchema` for automatic schema generation.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context_menu::collaborators::{ClickParams, ExtensionMenuItem};
use crate::mailbox::{Capability, Mailbox, MailboxType, Service};

/// Metadata included in all tool responses
///
/// Provides timing information and current UTC timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Meta {
    /// Current UTC timestamp in RFC 3339 format with milliseconds
    pub now_utc: String,
    /// Tool execution duration in milliseconds
    pub duration_ms: u64,
}

impl Meta {
    /// Create metadata populated with current time and elapsed duration
    pub fn now(duration_ms: u64) -> Self {
        Self {
            now_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms,
        }
    }
}

/// Standard response envelope for all tools
///
/// Wraps tool-specific data with human-readable summary and execution metadata.
/// This structure provides consistent response shape across all MCP tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolEnvelope<T>
where
    T: JsonSchema,
{
    /// Human-readable summary of the operation outcome
    pub summary: String,
    /// Tool-specific data payload
    pub data: T,
    /// Execution metadata (timestamp, duration)
    pub meta: Meta,
}

/// A mailbox with its services resolved, in display order
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct MailboxView {
    pub mailbox: Mailbox,
    pub services: Vec<Service>,
    /// Sum of unread counts over services that support them
    pub unread_total: u32,
}

impl MailboxView {
    pub fn new(mailbox: &Mailbox, services: Vec<&Service>) -> Self {
        let unread_total = services
            .iter()
            .filter_map(|s| s.unread_count)
            .fold(0u32, u32::saturating_add);
        Self {
            mailbox: mailbox.clone(),
            services: services.into_iter().cloned().collect(),
            unread_total,
        }
    }
}

/// Input: mailbox id only
///
/// Used by `mailbox_get` and `mailbox_remove`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MailboxIdInput {
    pub mailbox_id: String,
}

/// Input: create a mailbox with its default service
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateMailboxInput {
    pub mailbox_type: MailboxType,
    /// Display name
    pub name: Option<String>,
    /// Required for (and only valid with) `container` mailboxes
    pub container_id: Option<String>,
}

/// Input: move a mailbox in display order
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MoveMailboxInput {
    pub mailbox_id: String,
    /// Target position; clamped to the end of the list
    pub index: usize,
}

/// Input: typed mailbox update
///
/// Each field that is present is applied as its own action. Empty strings
/// clear `color` and `avatar`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateMailboxInput {
    pub mailbox_id: String,
    pub name: Option<String>,
    /// CSS-style color (`#rgb`, `#rrggbb`, `rgb(...)` or `rgba(...)`)
    pub color: Option<String>,
    pub avatar: Option<String>,
    pub open_in_background: Option<bool>,
    pub show_unread_badge: Option<bool>,
}

/// Input: attach a capability service
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AttachServiceInput {
    pub mailbox_id: String,
    pub capability: Capability,
}

/// Input: address one service
///
/// Used by `service_remove` and `mailbox_unlink_account`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ServiceRefInput {
    pub mailbox_id: String,
    pub service_id: String,
}

/// Input: typed service update
///
/// `settings` entries with a `null` value remove the key.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateServiceInput {
    pub mailbox_id: String,
    pub service_id: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub unread_count: Option<u32>,
    pub settings: Option<BTreeMap<String, Value>>,
    /// New position among the mailbox's services
    pub index: Option<usize>,
}

/// Input: dispatch a named action
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DispatchInput {
    /// Namespaced action name, e.g. `mailbox.set_name` or `slack.set_team`
    pub action: String,
    pub mailbox_id: String,
    /// Targets a service when present
    pub service_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// Input: link an external account to a service
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct LinkAccountInput {
    pub mailbox_id: String,
    pub service_id: String,
    pub account_email: Option<String>,
    /// Held in memory only; never echoed back
    pub access_token: String,
    /// Token lifetime in seconds (1..31536000)
    pub expires_in_seconds: Option<u64>,
}

/// Input: surface id only
///
/// Used by `surface_created` and `surface_destroyed`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SurfaceInput {
    pub surface_id: u64,
}

/// Input: a surface finished attaching to a window
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SurfaceAttachedInput {
    pub surface_id: u64,
    pub window_id: u64,
    /// Auxiliary surface (embedded service view) rather than the window's
    /// main content
    #[serde(default)]
    pub hosted: bool,
}

/// Input: native right-click on a surface
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ContextMenuOpenInput {
    pub surface_id: u64,
    #[serde(default)]
    pub params: ClickParams,
    #[serde(default)]
    pub can_go_back: bool,
    #[serde(default)]
    pub can_go_forward: bool,
    /// Renderer suggestions for `params.misspelled_word`, keyed by
    /// dictionary language code (e.g. `en_US`)
    #[serde(default)]
    pub dictionary_suggestions: BTreeMap<String, Vec<String>>,
}

/// Input: click on an item of the displayed menu
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ContextMenuSelectInput {
    pub item_id: String,
}

/// Input: replace an extension's registered context-menu items
///
/// An empty `items` list unregisters the extension.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExtensionMenusInput {
    pub extension_id: String,
    pub name: String,
    pub icon: Option<String>,
    #[serde(default)]
    pub items: Vec<ExtensionMenuItem>,
}
