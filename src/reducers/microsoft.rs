//! Microsoft mailbox, mail service and storage service reducers

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::mailbox::TogglePayload;
use super::service::with_setting;
use super::{ReducerSet, clean, decode, profile_mismatch};
use crate::errors::AppResult;
use crate::mailbox::{Mailbox, MailboxProfile, MailboxType, MicrosoftAccessMode, Service};

pub static MAILBOX_REDUCERS: ReducerSet<Mailbox> = ReducerSet {
    name: "microsoft_mailbox",
    actions: &[
        ("microsoft.set_access_mode", set_access_mode),
        ("microsoft.set_profile", set_profile),
    ],
};

pub static DEFAULT_SERVICE_REDUCERS: ReducerSet<Service> = ReducerSet {
    name: "microsoft_mail",
    actions: &[("microsoft_mail.set_unread_mode", set_unread_mode)],
};

pub static STORAGE_SERVICE_REDUCERS: ReducerSet<Service> = ReducerSet {
    name: "microsoft_storage",
    actions: &[
        ("microsoft_storage.set_drive", set_drive),
        (
            "microsoft_storage.set_open_files_externally",
            set_open_files_externally,
        ),
    ],
};

/// Which Outlook folders count towards the unread badge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicrosoftUnreadMode {
    Inbox,
    InboxFocused,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AccessModePayload {
    mode: MicrosoftAccessMode,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfilePayload {
    user_id: Option<String>,
    email: Option<String>,
    display_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UnreadModePayload {
    mode: MicrosoftUnreadMode,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DrivePayload {
    drive_id: Option<String>,
}

/// Switching between consumer Outlook and Office 365 invalidates the
/// linked profile, so the profile fields are cleared with it
fn set_access_mode(mailbox: &Mailbox, payload: &Value) -> AppResult<Option<Mailbox>> {
    let p: AccessModePayload = decode("microsoft.set_access_mode", payload)?;
    let MailboxProfile::Microsoft { access_mode, .. } = &mailbox.profile else {
        return Err(profile_mismatch(mailbox, MailboxType::Microsoft));
    };
    if *access_mode == p.mode {
        return Ok(None);
    }
    Ok(Some(Mailbox {
        profile: MailboxProfile::Microsoft {
            access_mode: p.mode,
            user_id: None,
            email: None,
            display_name: None,
        },
        ..mailbox.clone()
    }))
}

fn set_profile(mailbox: &Mailbox, payload: &Value) -> AppResult<Option<Mailbox>> {
    let p: ProfilePayload = decode("microsoft.set_profile", payload)?;
    let mut next = mailbox.clone();
    let MailboxProfile::Microsoft {
        user_id,
        email,
        display_name,
        ..
    } = &mut next.profile
    else {
        return Err(profile_mismatch(mailbox, MailboxType::Microsoft));
    };
    *user_id = clean(p.user_id);
    *email = clean(p.email);
    *display_name = clean(p.display_name);
    Ok(Some(next))
}

fn set_unread_mode(service: &Service, payload: &Value) -> AppResult<Option<Service>> {
    let p: UnreadModePayload = decode("microsoft_mail.set_unread_mode", payload)?;
    Ok(Some(with_setting(service, "unread_mode", Some(json!(p.mode)))))
}

fn set_drive(service: &Service, payload: &Value) -> AppResult<Option<Service>> {
    let p: DrivePayload = decode("microsoft_storage.set_drive", payload)?;
    Ok(Some(with_setting(
        service,
        "drive_id",
        clean(p.drive_id).map(Value::String),
    )))
}

fn set_open_files_externally(service: &Service, payload: &Value) -> AppResult<Option<Service>> {
    let p: TogglePayload = decode("microsoft_storage.set_open_files_externally", payload)?;
    Ok(Some(with_setting(
        service,
        "open_files_externally",
        Some(json!(p.value)),
    )))
}
