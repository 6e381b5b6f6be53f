//! Google mailbox reducers plus the mail, communication, calendar and
//! messenger service reducers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::mailbox::TogglePayload;
use super::service::{with_setting, with_unread};
use super::{ReducerSet, clean, decode, profile_mismatch};
use crate::errors::AppResult;
use crate::mailbox::{Mailbox, MailboxProfile, MailboxType, Service};

pub static MAILBOX_REDUCERS: ReducerSet<Mailbox> = ReducerSet {
    name: "google_mailbox",
    actions: &[
        ("google.set_profile", set_profile),
        ("google.clear_profile", clear_profile),
    ],
};

pub static DEFAULT_SERVICE_REDUCERS: ReducerSet<Service> = ReducerSet {
    name: "google_mail",
    actions: &[("google_mail.set_unread_mode", set_unread_mode)],
};

pub static COMMUNICATION_SERVICE_REDUCERS: ReducerSet<Service> = ReducerSet {
    name: "google_communication",
    actions: &[(
        "google_communication.set_unread_conversations",
        set_unread_conversations,
    )],
};

pub static CALENDAR_SERVICE_REDUCERS: ReducerSet<Service> = ReducerSet {
    name: "google_calendar",
    actions: &[("google_calendar.set_show_reminders", set_show_reminders)],
};

pub static MESSENGER_SERVICE_REDUCERS: ReducerSet<Service> = ReducerSet {
    name: "google_messenger",
    actions: &[("google_messenger.set_unread_threads", set_unread_threads)],
};

/// Which Gmail messages count towards the unread badge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoogleUnreadMode {
    Inbox,
    InboxUnread,
    InboxUnreadImportant,
    InboxUnreadPersonal,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfilePayload {
    email: Option<String>,
    display_name: Option<String>,
    avatar_url: Option<String>,
    synced_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UnreadModePayload {
    mode: GoogleUnreadMode,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConversationsPayload {
    conversation_ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ThreadsPayload {
    count: u32,
}

fn set_profile(mailbox: &Mailbox, payload: &Value) -> AppResult<Option<Mailbox>> {
    let p: ProfilePayload = decode("google.set_profile", payload)?;
    let mut next = mailbox.clone();
    let MailboxProfile::Google {
        email,
        display_name,
        avatar_url,
        profile_synced_at,
    } = &mut next.profile
    else {
        return Err(profile_mismatch(mailbox, MailboxType::Google));
    };
    *email = clean(p.email);
    *display_name = clean(p.display_name);
    *avatar_url = clean(p.avatar_url);
    *profile_synced_at = Some(p.synced_at);
    Ok(Some(next))
}

fn clear_profile(mailbox: &Mailbox, _payload: &Value) -> AppResult<Option<Mailbox>> {
    if !matches!(mailbox.profile, MailboxProfile::Google { .. }) {
        return Err(profile_mismatch(mailbox, MailboxType::Google));
    }
    Ok(Some(Mailbox {
        profile: MailboxProfile::blank(MailboxType::Google)?,
        ..mailbox.clone()
    }))
}

fn set_unread_mode(service: &Service, payload: &Value) -> AppResult<Option<Service>> {
    let p: UnreadModePayload = decode("google_mail.set_unread_mode", payload)?;
    Ok(Some(with_setting(service, "unread_mode", Some(json!(p.mode)))))
}

/// Store the unread conversation ids and derive the badge count from them
fn set_unread_conversations(service: &Service, payload: &Value) -> AppResult<Option<Service>> {
    let mut p: ConversationsPayload =
        decode("google_communication.set_unread_conversations", payload)?;
    p.conversation_ids.sort();
    p.conversation_ids.dedup();
    let count = u32::try_from(p.conversation_ids.len()).unwrap_or(u32::MAX);
    let next = with_setting(
        service,
        "unread_conversation_ids",
        Some(json!(p.conversation_ids)),
    );
    Ok(Some(with_unread(&next, Some(count)).unwrap_or(next)))
}

fn set_show_reminders(service: &Service, payload: &Value) -> AppResult<Option<Service>> {
    let p: TogglePayload = decode("google_calendar.set_show_reminders", payload)?;
    Ok(Some(with_setting(service, "show_reminders", Some(json!(p.value)))))
}

fn set_unread_threads(service: &Service, payload: &Value) -> AppResult<Option<Service>> {
    let p: ThreadsPayload = decode("google_messenger.set_unread_threads", payload)?;
    Ok(with_unread(service, Some(p.count)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{clear_profile, set_profile, set_unread_conversations, set_unread_mode};
    use crate::mailbox::{
        Capability, Mailbox, MailboxProfile, MailboxType, Service, ServiceType,
    };

    fn google_mailbox() -> Mailbox {
        Mailbox::new(
            "m1",
            MailboxProfile::blank(MailboxType::Google).expect("profile"),
        )
    }

    #[test]
    fn set_profile_records_sync_time() {
        let next = set_profile(
            &google_mailbox(),
            &json!({
                "email": "me@example.com",
                "display_name": "Me",
                "avatar_url": null,
                "synced_at": "2026-01-02T03:04:05Z"
            }),
        )
        .expect("ok")
        .expect("changed");

        let MailboxProfile::Google {
            email,
            profile_synced_at,
            ..
        } = &next.profile
        else {
            panic!("profile must stay google");
        };
        assert_eq!(email.as_deref(), Some("me@example.com"));
        assert!(profile_synced_at.is_some());
    }

    #[test]
    fn clear_profile_resets_to_blank() {
        let synced = set_profile(
            &google_mailbox(),
            &json!({
                "email": "me@example.com",
                "display_name": null,
                "avatar_url": null,
                "synced_at": "2026-01-02T03:04:05Z"
            }),
        )
        .expect("ok")
        .expect("changed");
        let cleared = clear_profile(&synced, &json!({})).expect("ok").expect("changed");
        assert_eq!(cleared, google_mailbox());
    }

    #[test]
    fn set_profile_rejects_other_providers() {
        let slack = Mailbox::new(
            "m2",
            MailboxProfile::blank(MailboxType::Slack).expect("profile"),
        );
        let err = set_profile(
            &slack,
            &json!({
                "email": null,
                "display_name": null,
                "avatar_url": null,
                "synced_at": "2026-01-02T03:04:05Z"
            }),
        )
        .expect_err("must fail");
        assert!(err.to_string().contains("expected Google"));
    }

    #[test]
    fn unread_mode_is_stored_in_settings() {
        let service = Service::new("s1", "m1", ServiceType::default_for(MailboxType::Google));
        let next = set_unread_mode(&service, &json!({ "mode": "inbox_unread_important" }))
            .expect("ok")
            .expect("changed");
        assert_eq!(
            next.settings.get("unread_mode"),
            Some(&json!("inbox_unread_important"))
        );
    }

    #[test]
    fn unread_conversations_derive_deduplicated_count() {
        let service = Service::new(
            "s2",
            "m1",
            ServiceType::new(MailboxType::Google, Capability::Communication),
        );
        let next = set_unread_conversations(
            &service,
            &json!({ "conversation_ids": ["c2", "c1", "c2"] }),
        )
        .expect("ok")
        .expect("changed");
        assert_eq!(next.unread_count, Some(2));
        assert_eq!(
            next.settings.get("unread_conversation_ids"),
            Some(&json!(["c1", "c2"]))
        );
    }
}
