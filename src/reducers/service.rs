//! Base service reducers, shared by every service type

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{ReducerSet, clean, decode};
use crate::errors::{AppError, AppResult};
use crate::mailbox::Service;

pub static REDUCERS: ReducerSet<Service> = ReducerSet {
    name: "service",
    actions: &[
        ("service.set_display_name", set_display_name),
        ("service.set_unread_count", set_unread_count),
        ("service.set_setting", set_setting),
        ("service.set_avatar", set_avatar),
    ],
};

/// Longest accepted settings key
const MAX_SETTING_KEY_LEN: usize = 128;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NamePayload {
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UnreadPayload {
    count: Option<u32>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingPayload {
    key: String,
    #[serde(default)]
    value: Option<Value>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AvatarPayload {
    avatar: Option<String>,
}

/// Set a service's unread count, honouring its type's unread support.
/// Shared with provider reducers that derive the count from richer data.
pub(crate) fn with_unread(service: &Service, count: Option<u32>) -> Option<Service> {
    if !service.service_type.supports_unread() {
        debug!(
            service_id = %service.id,
            service_type = %service.service_type,
            "ignoring unread count for service type without unread support"
        );
        return None;
    }
    Some(Service {
        unread_count: count,
        ..service.clone()
    })
}

/// Write one key of the per-service settings map; `None`/`null` removes it
pub(crate) fn with_setting(service: &Service, key: &str, value: Option<Value>) -> Service {
    let mut next = service.clone();
    match value {
        Some(Value::Null) | None => {
            next.settings.remove(key);
        }
        Some(value) => {
            next.settings.insert(key.to_owned(), value);
        }
    }
    next
}

fn set_display_name(service: &Service, payload: &Value) -> AppResult<Option<Service>> {
    let p: NamePayload = decode("service.set_display_name", payload)?;
    Ok(Some(Service {
        display_name: clean(p.name),
        ..service.clone()
    }))
}

fn set_unread_count(service: &Service, payload: &Value) -> AppResult<Option<Service>> {
    let p: UnreadPayload = decode("service.set_unread_count", payload)?;
    Ok(with_unread(service, p.count))
}

fn set_setting(service: &Service, payload: &Value) -> AppResult<Option<Service>> {
    let p: SettingPayload = decode("service.set_setting", payload)?;
    let key = p.key.trim();
    if key.is_empty() || key.len() > MAX_SETTING_KEY_LEN {
        return Err(AppError::invalid(format!(
            "setting key must be 1..{MAX_SETTING_KEY_LEN} characters"
        )));
    }
    Ok(Some(with_setting(service, key, p.value)))
}

fn set_avatar(service: &Service, payload: &Value) -> AppResult<Option<Service>> {
    let p: AvatarPayload = decode("service.set_avatar", payload)?;
    Ok(Some(Service {
        avatar: clean(p.avatar),
        ..service.clone()
    }))
}
