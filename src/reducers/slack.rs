//! Slack mailbox and team-chat service reducers

use serde::Deserialize;
use serde_json::{Value, json};

use super::service::{with_setting, with_unread};
use super::{ReducerSet, clean, decode, profile_mismatch};
use crate::errors::AppResult;
use crate::mailbox::{Mailbox, MailboxProfile, MailboxType, Service};

pub static MAILBOX_REDUCERS: ReducerSet<Mailbox> = ReducerSet {
    name: "slack_mailbox",
    actions: &[
        ("slack.set_team", set_team),
        ("slack.set_user", set_user),
    ],
};

pub static DEFAULT_SERVICE_REDUCERS: ReducerSet<Service> = ReducerSet {
    name: "slack_service",
    actions: &[("slack_service.set_unread_info", set_unread_info)],
};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TeamPayload {
    team_id: Option<String>,
    team_name: Option<String>,
    team_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UserPayload {
    user_id: Option<String>,
    user_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UnreadInfoPayload {
    unread_dm_count: u32,
    unread_mention_count: u32,
    #[serde(default)]
    has_unread_activity: bool,
}

fn set_team(mailbox: &Mailbox, payload: &Value) -> AppResult<Option<Mailbox>> {
    let p: TeamPayload = decode("slack.set_team", payload)?;
    let mut next = mailbox.clone();
    let MailboxProfile::Slack {
        team_id,
        team_name,
        team_url,
        ..
    } = &mut next.profile
    else {
        return Err(profile_mismatch(mailbox, MailboxType::Slack));
    };
    *team_id = clean(p.team_id);
    *team_name = clean(p.team_name);
    *team_url = clean(p.team_url);
    Ok(Some(next))
}

fn set_user(mailbox: &Mailbox, payload: &Value) -> AppResult<Option<Mailbox>> {
    let p: UserPayload = decode("slack.set_user", payload)?;
    let mut next = mailbox.clone();
    let MailboxProfile::Slack {
        user_id, user_name, ..
    } = &mut next.profile
    else {
        return Err(profile_mismatch(mailbox, MailboxType::Slack));
    };
    *user_id = clean(p.user_id);
    *user_name = clean(p.user_name);
    Ok(Some(next))
}

/// Badge count is direct messages plus mentions; channel activity without
/// a mention only sets the activity flag
fn set_unread_info(service: &Service, payload: &Value) -> AppResult<Option<Service>> {
    let p: UnreadInfoPayload = decode("slack_service.set_unread_info", payload)?;
    let next = with_setting(
        service,
        "has_unread_activity",
        Some(json!(p.has_unread_activity)),
    );
    let count = p.unread_dm_count.saturating_add(p.unread_mention_count);
    Ok(Some(with_unread(&next, Some(count)).unwrap_or(next)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{set_team, set_unread_info};
    use crate::mailbox::{Mailbox, MailboxProfile, MailboxType, Service, ServiceType};

    #[test]
    fn set_team_keeps_user_fields() {
        let mut mailbox = Mailbox::new(
            "m1",
            MailboxProfile::blank(MailboxType::Slack).expect("profile"),
        );
        if let MailboxProfile::Slack { user_name, .. } = &mut mailbox.profile {
            *user_name = Some("ada".to_owned());
        }

        let next = set_team(
            &mailbox,
            &json!({ "team_id": "T1", "team_name": "Acme", "team_url": null }),
        )
        .expect("ok")
        .expect("changed");
        let MailboxProfile::Slack {
            team_name,
            user_name,
            ..
        } = &next.profile
        else {
            panic!("profile must stay slack");
        };
        assert_eq!(team_name.as_deref(), Some("Acme"));
        assert_eq!(user_name.as_deref(), Some("ada"));
    }

    #[test]
    fn unread_info_sums_dms_and_mentions() {
        let service = Service::new("s1", "m1", ServiceType::default_for(MailboxType::Slack));
        let next = set_unread_info(
            &service,
            &json!({ "unread_dm_count": 2, "unread_mention_count": 3, "has_unread_activity": true }),
        )
        .expect("ok")
        .expect("changed");
        assert_eq!(next.unread_count, Some(5));
        assert_eq!(next.settings.get("has_unread_activity"), Some(&json!(true)));
    }
}
