//! Base mailbox reducers, shared by every mailbox type

use serde::Deserialize;
use serde_json::Value;

use super::{ReducerSet, clean, decode};
use crate::errors::{AppError, AppResult};
use crate::mailbox::Mailbox;

pub static REDUCERS: ReducerSet<Mailbox> = ReducerSet {
    name: "mailbox",
    actions: &[
        ("mailbox.set_name", set_name),
        ("mailbox.set_color", set_color),
        ("mailbox.set_avatar", set_avatar),
        ("mailbox.move_service", move_service),
        ("mailbox.set_open_in_background", set_open_in_background),
        ("mailbox.set_show_unread_badge", set_show_unread_badge),
    ],
};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NamePayload {
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ColorPayload {
    color: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AvatarPayload {
    avatar: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MoveServicePayload {
    service_id: String,
    index: usize,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TogglePayload {
    pub(crate) value: bool,
}

fn set_name(mailbox: &Mailbox, payload: &Value) -> AppResult<Option<Mailbox>> {
    let p: NamePayload = decode("mailbox.set_name", payload)?;
    Ok(Some(Mailbox {
        name: clean(p.name),
        ..mailbox.clone()
    }))
}

fn set_color(mailbox: &Mailbox, payload: &Value) -> AppResult<Option<Mailbox>> {
    let p: ColorPayload = decode("mailbox.set_color", payload)?;
    Ok(Some(Mailbox {
        color: clean(p.color),
        ..mailbox.clone()
    }))
}

fn set_avatar(mailbox: &Mailbox, payload: &Value) -> AppResult<Option<Mailbox>> {
    let p: AvatarPayload = decode("mailbox.set_avatar", payload)?;
    Ok(Some(Mailbox {
        avatar: clean(p.avatar),
        ..mailbox.clone()
    }))
}

/// Reorder an attached service; the index is clamped to the service list
fn move_service(mailbox: &Mailbox, payload: &Value) -> AppResult<Option<Mailbox>> {
    let p: MoveServicePayload = decode("mailbox.move_service", payload)?;
    let from = mailbox
        .services
        .iter()
        .position(|id| *id == p.service_id)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "service '{}' is not attached to mailbox '{}'",
                p.service_id, mailbox.id
            ))
        })?;

    let mut next = mailbox.clone();
    let id = next.services.remove(from);
    let to = p.index.min(next.services.len());
    next.services.insert(to, id);
    Ok(Some(next))
}

fn set_open_in_background(mailbox: &Mailbox, payload: &Value) -> AppResult<Option<Mailbox>> {
    let p: TogglePayload = decode("mailbox.set_open_in_background", payload)?;
    Ok(Some(Mailbox {
        open_in_background: p.value,
        ..mailbox.clone()
    }))
}

fn set_show_unread_badge(mailbox: &Mailbox, payload: &Value) -> AppResult<Option<Mailbox>> {
    let p: TogglePayload = decode("mailbox.set_show_unread_badge", payload)?;
    Ok(Some(Mailbox {
        show_unread_badge: p.value,
        ..mailbox.clone()
    }))
}
