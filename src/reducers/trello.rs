//! Trello mailbox and boards service reducers

use serde::Deserialize;
use serde_json::{Value, json};

use super::service::{with_setting, with_unread};
use super::{ReducerSet, clean, decode, profile_mismatch};
use crate::errors::AppResult;
use crate::mailbox::{Mailbox, MailboxProfile, MailboxType, Service};

pub static MAILBOX_REDUCERS: ReducerSet<Mailbox> = ReducerSet {
    name: "trello_mailbox",
    actions: &[
        ("trello.set_profile", set_profile),
        ("trello.set_home_board", set_home_board),
    ],
};

pub static DEFAULT_SERVICE_REDUCERS: ReducerSet<Service> = ReducerSet {
    name: "trello_service",
    actions: &[(
        "trello_service.set_unread_notifications",
        set_unread_notifications,
    )],
};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfilePayload {
    user_id: Option<String>,
    username: Option<String>,
    full_name: Option<String>,
    initials: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct HomeBoardPayload {
    board_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NotificationsPayload {
    notification_ids: Vec<String>,
}

fn set_profile(mailbox: &Mailbox, payload: &Value) -> AppResult<Option<Mailbox>> {
    let p: ProfilePayload = decode("trello.set_profile", payload)?;
    let mut next = mailbox.clone();
    let MailboxProfile::Trello {
        user_id,
        username,
        full_name,
        initials,
        ..
    } = &mut next.profile
    else {
        return Err(profile_mismatch(mailbox, MailboxType::Trello));
    };
    *user_id = clean(p.user_id);
    *username = clean(p.username);
    *full_name = clean(p.full_name);
    *initials = clean(p.initials);
    Ok(Some(next))
}

fn set_home_board(mailbox: &Mailbox, payload: &Value) -> AppResult<Option<Mailbox>> {
    let p: HomeBoardPayload = decode("trello.set_home_board", payload)?;
    let mut next = mailbox.clone();
    let MailboxProfile::Trello { home_board_id, .. } = &mut next.profile else {
        return Err(profile_mismatch(mailbox, MailboxType::Trello));
    };
    *home_board_id = clean(p.board_id);
    Ok(Some(next))
}

fn set_unread_notifications(service: &Service, payload: &Value) -> AppResult<Option<Service>> {
    let mut p: NotificationsPayload = decode("trello_service.set_unread_notifications", payload)?;
    p.notification_ids.sort();
    p.notification_ids.dedup();
    let count = u32::try_from(p.notification_ids.len()).unwrap_or(u32::MAX);
    let next = with_setting(
        service,
        "unread_notification_ids",
        Some(json!(p.notification_ids)),
    );
    Ok(Some(with_unread(&next, Some(count)).unwrap_or(next)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{set_home_board, set_unread_notifications};
    use crate::mailbox::{Mailbox, MailboxProfile, MailboxType, Service, ServiceType};

    #[test]
    fn home_board_can_be_cleared() {
        let mailbox = Mailbox::new(
            "m1",
            MailboxProfile::blank(MailboxType::Trello).expect("profile"),
        );
        let with_board = set_home_board(&mailbox, &json!({ "board_id": "b1" }))
            .expect("ok")
            .expect("changed");
        let cleared = set_home_board(&with_board, &json!({ "board_id": "" }))
            .expect("ok")
            .expect("changed");
        assert_eq!(cleared, mailbox);
    }

    #[test]
    fn notifications_drive_unread_count() {
        let service = Service::new("s1", "m1", ServiceType::default_for(MailboxType::Trello));
        let next = set_unread_notifications(&service, &json!({ "notification_ids": ["n1", "n2"] }))
            .expect("ok")
            .expect("changed");
        assert_eq!(next.unread_count, Some(2));
    }
}
