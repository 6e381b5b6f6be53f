//! Routes named actions to the store through the resolved reducer chain
//!
//! An action targets a mailbox, or a service when `service_id` is set. The
//! chain is picked from the target's type, the most specific reducer that
//! defines the action name runs, and a changed result is committed.
//!
//! Unknown action names are a deliberate no-op: front ends and the core may
//! be on different versions, so an action the chain does not know is logged
//! and reported as [`DispatchOutcome::Unsupported`] instead of failing.
//! Unknown mailbox or service ids are hard `NotFound` errors.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};
use crate::reducers::{self, Resolved};
use crate::store::MailboxStore;

/// A named operation with its target and payload. Consumed by dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub mailbox_id: String,
    pub service_id: Option<String>,
    pub payload: Value,
}

impl Action {
    /// Action addressed to a mailbox
    pub fn mailbox(name: impl Into<String>, mailbox_id: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            mailbox_id: mailbox_id.into(),
            service_id: None,
            payload,
        }
    }

    /// Action addressed to one service of a mailbox
    pub fn service(
        name: impl Into<String>,
        mailbox_id: impl Into<String>,
        service_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            name: name.into(),
            mailbox_id: mailbox_id.into(),
            service_id: Some(service_id.into()),
            payload,
        }
    }
}

/// Result of a dispatch that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// State changed and was committed at this revision
    Applied { revision: u64, level: &'static str },
    /// The reducer ran but produced identical state; nothing was committed
    Unchanged { level: &'static str },
    /// No reducer in the chain defines the action
    Unsupported,
}

/// Dispatch one action: resolve, reduce, commit, notify
///
/// # Errors
///
/// - `NotFound` if the mailbox or service does not exist
/// - `InvalidInput` if the payload does not match the reducer's shape
/// - `Conflict` if the reducer output violates a store invariant
pub fn dispatch(store: &mut MailboxStore, action: Action) -> AppResult<DispatchOutcome> {
    let Action {
        name,
        mailbox_id,
        service_id,
        payload,
    } = action;

    match service_id {
        None => {
            let mailbox = store.get(&mailbox_id)?;
            let chain = reducers::mailbox_chain(mailbox.mailbox_type());
            let Some(Resolved { level, reduce }) = reducers::resolve(&chain, &name) else {
                return Ok(unsupported(&name, &mailbox_id, None));
            };
            match reduce(mailbox, &payload)? {
                Some(next) if next != *mailbox => {
                    store.commit_mailbox(next)?;
                    debug!(action = %name, %mailbox_id, level, "applied mailbox action");
                    Ok(DispatchOutcome::Applied {
                        revision: store.revision(),
                        level,
                    })
                }
                _ => Ok(DispatchOutcome::Unchanged { level }),
            }
        }
        Some(service_id) => {
            let service = store.get_service(&mailbox_id, &service_id)?;
            let chain = reducers::service_chain(service.service_type)?;
            let Some(Resolved { level, reduce }) = reducers::resolve(&chain, &name) else {
                return Ok(unsupported(&name, &mailbox_id, Some(&service_id)));
            };
            match reduce(service, &payload)? {
                Some(next) if next != *service => {
                    store.commit_service(next)?;
                    debug!(action = %name, %mailbox_id, %service_id, level, "applied service action");
                    Ok(DispatchOutcome::Applied {
                        revision: store.revision(),
                        level,
                    })
                }
                _ => Ok(DispatchOutcome::Unchanged { level }),
            }
        }
    }
}

/// Run the action's reducer against the current state without committing
///
/// Unknown action names pass; [`dispatch`] reports them as unsupported.
///
/// # Errors
///
/// The error [`dispatch`] would return before committing.
pub fn check(store: &MailboxStore, action: &Action) -> AppResult<()> {
    match &action.service_id {
        None => {
            let mailbox = store.get(&action.mailbox_id)?;
            let chain = reducers::mailbox_chain(mailbox.mailbox_type());
            if let Some(Resolved { reduce, .. }) = reducers::resolve(&chain, &action.name) {
                reduce(mailbox, &action.payload)?;
            }
        }
        Some(service_id) => {
            let service = store.get_service(&action.mailbox_id, service_id)?;
            let chain = reducers::service_chain(service.service_type)?;
            if let Some(Resolved { reduce, .. }) = reducers::resolve(&chain, &action.name) {
                reduce(service, &action.payload)?;
            }
        }
    }
    Ok(())
}

fn unsupported(name: &str, mailbox_id: &str, service_id: Option<&str>) -> DispatchOutcome {
    let err = AppError::UnsupportedAction(name.to_owned());
    warn!(%mailbox_id, service_id = service_id.unwrap_or("-"), error = %err, "ignoring action");
    DispatchOutcome::Unsupported
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::{Action, DispatchOutcome, dispatch};
    use crate::errors::AppError;
    use crate::mailbox::{Capability, MailboxType, Service, ServiceType};
    use crate::store::tests::seeded_store;

    #[test]
    fn rename_changes_only_the_name_and_keeps_position() {
        let mut store = seeded_store();
        let before = store.get("m1").expect("m1").clone();

        let outcome = dispatch(
            &mut store,
            Action::mailbox("mailbox.set_name", "m1", json!({ "name": "Work" })),
        )
        .expect("dispatch");
        assert!(matches!(outcome, DispatchOutcome::Applied { level: "mailbox", .. }));

        let after = store.get("m1").expect("m1");
        assert_eq!(after.name.as_deref(), Some("Work"));
        assert_eq!(after.color, before.color);
        assert_eq!(after.services, before.services);
        assert_eq!(after.profile, before.profile);
        let ids: Vec<&str> = store.all().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[test]
    fn unknown_action_leaves_state_untouched() {
        let mut store = seeded_store();
        let before = serde_json::to_vec(&store.snapshot().mailboxes).expect("serialize");
        let revision = store.revision();

        let outcome = dispatch(
            &mut store,
            Action::mailbox("slack.set_team", "m1", json!({ "team_id": "T1" })),
        )
        .expect("unsupported is not an error");
        assert_eq!(outcome, DispatchOutcome::Unsupported);

        let after = serde_json::to_vec(&store.snapshot().mailboxes).expect("serialize");
        assert_eq!(before, after);
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn missing_targets_are_hard_errors() {
        let mut store = seeded_store();
        let err = dispatch(
            &mut store,
            Action::mailbox("mailbox.set_name", "nope", json!({ "name": "x" })),
        )
        .expect_err("must fail");
        assert!(matches!(err, AppError::NotFound(_)));

        let err = dispatch(
            &mut store,
            Action::service("service.set_unread_count", "m1", "s2", json!({ "count": 1 })),
        )
        .expect_err("service belongs to m2");
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn repeated_idempotent_action_commits_once() {
        let mut store = seeded_store();
        let notifications = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notifications);
        store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let action = Action::mailbox("mailbox.set_color", "m1", json!({ "color": "#123456" }));
        let first = dispatch(&mut store, action.clone()).expect("first");
        let state_after_first = store.get("m1").expect("m1").clone();
        let second = dispatch(&mut store, action).expect("second");

        assert!(matches!(first, DispatchOutcome::Applied { .. }));
        assert_eq!(second, DispatchOutcome::Unchanged { level: "mailbox" });
        assert_eq!(*store.get("m1").expect("m1"), state_after_first);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn capability_action_reaches_capability_reducer() {
        let mut store = seeded_store();
        store
            .attach_service(Service::new(
                "s3",
                "m1",
                ServiceType::new(MailboxType::Google, Capability::Communication),
            ))
            .expect("attach");

        let outcome = dispatch(
            &mut store,
            Action::service(
                "google_communication.set_unread_conversations",
                "m1",
                "s3",
                json!({ "conversation_ids": ["a", "b", "c"] }),
            ),
        )
        .expect("dispatch");
        assert!(matches!(
            outcome,
            DispatchOutcome::Applied { level: "google_communication", .. }
        ));
        assert_eq!(
            store.get_service("m1", "s3").expect("s3").unread_count,
            Some(3)
        );

        let outcome = dispatch(
            &mut store,
            Action::service("google_mail.set_unread_mode", "m1", "s3", json!({ "mode": "inbox" })),
        )
        .expect("dispatch");
        assert_eq!(outcome, DispatchOutcome::Unsupported);
    }

    #[test]
    fn bad_payload_is_invalid_input_and_not_committed() {
        let mut store = seeded_store();
        let revision = store.revision();
        let err = dispatch(
            &mut store,
            Action::service("service.set_unread_count", "m1", "s1", json!({ "count": -4 })),
        )
        .expect_err("negative count");
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(store.revision(), revision);
    }
}
