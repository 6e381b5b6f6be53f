//! Action creators used by the IPC layer
//!
//! Each function builds an [`Action`] with the right name and payload shape
//! and dispatches it. Structural operations (create, remove, reorder,
//! attach) go straight to the store since they are not per-entity reducers.

use serde_json::{Value, json};
use uuid::Uuid;

use crate::dispatch::{Action, DispatchOutcome, check, dispatch};
use crate::errors::{AppError, AppResult};
use crate::mailbox::{Capability, Mailbox, MailboxProfile, MailboxType, Service, ServiceType};
use crate::store::MailboxStore;

/// Create a mailbox with its default service; returns the new mailbox id
pub fn create_mailbox(
    store: &mut MailboxStore,
    mailbox_type: MailboxType,
    container_id: Option<String>,
    name: Option<String>,
) -> AppResult<String> {
    let profile = match (mailbox_type, container_id) {
        (MailboxType::Container, Some(container_id)) if !container_id.trim().is_empty() => {
            MailboxProfile::Container {
                container_id: container_id.trim().to_owned(),
                url_subdomain: None,
            }
        }
        (MailboxType::Container, _) => {
            return Err(AppError::invalid(
                "container mailboxes require a container_id",
            ));
        }
        (_, Some(_)) => {
            return Err(AppError::invalid(
                "container_id is only valid for container mailboxes",
            ));
        }
        (other, None) => MailboxProfile::blank(other)?,
    };

    let mailbox_id = Uuid::new_v4().to_string();
    let service_id = Uuid::new_v4().to_string();
    let mut mailbox = Mailbox::new(mailbox_id.clone(), profile);
    mailbox.name = name
        .map(|n| n.trim().to_owned())
        .filter(|n| !n.is_empty());
    store.insert_mailbox(
        mailbox,
        Service::new(
            service_id,
            mailbox_id.clone(),
            ServiceType::default_for(mailbox_type),
        ),
    )?;
    Ok(mailbox_id)
}

pub fn remove_mailbox(store: &mut MailboxStore, mailbox_id: &str) -> AppResult<()> {
    store.remove_mailbox(mailbox_id).map(|_| ())
}

pub fn move_mailbox(store: &mut MailboxStore, mailbox_id: &str, index: usize) -> AppResult<()> {
    store.move_mailbox(mailbox_id, index)
}

/// Attach a capability service; returns the new service id
pub fn add_service(
    store: &mut MailboxStore,
    mailbox_id: &str,
    capability: Capability,
) -> AppResult<String> {
    let mailbox_type = store.get(mailbox_id)?.mailbox_type();
    let service_id = Uuid::new_v4().to_string();
    store.attach_service(Service::new(
        service_id.clone(),
        mailbox_id,
        ServiceType::new(mailbox_type, capability),
    ))?;
    Ok(service_id)
}

pub fn remove_service(store: &mut MailboxStore, mailbox_id: &str, service_id: &str) -> AppResult<()> {
    store.remove_service(mailbox_id, service_id).map(|_| ())
}

/// One typed change to a mailbox's own fields
#[derive(Debug, Clone, PartialEq)]
pub enum MailboxUpdate {
    Name(String),
    /// `None` clears the color
    Color(Option<String>),
    Avatar(Option<String>),
    OpenInBackground(bool),
    ShowUnreadBadge(bool),
}

impl MailboxUpdate {
    /// Field name reported back to callers
    pub fn field(&self) -> String {
        match self {
            Self::Name(_) => "name",
            Self::Color(_) => "color",
            Self::Avatar(_) => "avatar",
            Self::OpenInBackground(_) => "open_in_background",
            Self::ShowUnreadBadge(_) => "show_unread_badge",
        }
        .to_owned()
    }

    fn into_action(self, mailbox_id: &str) -> Action {
        let (name, payload) = match self {
            Self::Name(name) => ("mailbox.set_name", json!({ "name": name })),
            Self::Color(color) => ("mailbox.set_color", json!({ "color": color })),
            Self::Avatar(avatar) => ("mailbox.set_avatar", json!({ "avatar": avatar })),
            Self::OpenInBackground(value) => {
                ("mailbox.set_open_in_background", json!({ "value": value }))
            }
            Self::ShowUnreadBadge(value) => {
                ("mailbox.set_show_unread_badge", json!({ "value": value }))
            }
        };
        Action::mailbox(name, mailbox_id, payload)
    }
}

/// One typed change to a service, including its position in the mailbox
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceUpdate {
    DisplayName(Option<String>),
    Avatar(Option<String>),
    UnreadCount(Option<u32>),
    /// `None` removes the key
    Setting { key: String, value: Option<Value> },
    /// New position among the mailbox's services; clamped to the end
    Index(usize),
}

impl ServiceUpdate {
    pub fn field(&self) -> String {
        match self {
            Self::DisplayName(_) => "display_name".to_owned(),
            Self::Avatar(_) => "avatar".to_owned(),
            Self::UnreadCount(_) => "unread_count".to_owned(),
            Self::Setting { key, .. } => format!("settings.{key}"),
            Self::Index(_) => "index".to_owned(),
        }
    }

    fn into_action(self, mailbox_id: &str, service_id: &str) -> Action {
        let (name, payload) = match self {
            Self::Index(index) => {
                return Action::mailbox(
                    "mailbox.move_service",
                    mailbox_id,
                    json!({ "service_id": service_id, "index": index }),
                );
            }
            Self::DisplayName(name) => ("service.set_display_name", json!({ "name": name })),
            Self::Avatar(avatar) => ("service.set_avatar", json!({ "avatar": avatar })),
            Self::UnreadCount(count) => ("service.set_unread_count", json!({ "count": count })),
            Self::Setting { key, value } => {
                ("service.set_setting", json!({ "key": key, "value": value }))
            }
        };
        Action::service(name, mailbox_id, service_id, payload)
    }
}

/// Apply several updates to one mailbox, all or nothing
///
/// Returns one outcome per update, keyed by field name, in input order.
///
/// # Errors
///
/// Fails before committing anything if any update would fail.
pub fn update_mailbox(
    store: &mut MailboxStore,
    mailbox_id: &str,
    updates: Vec<MailboxUpdate>,
) -> AppResult<Vec<(String, DispatchOutcome)>> {
    let actions = updates
        .into_iter()
        .map(|update| (update.field(), update.into_action(mailbox_id)))
        .collect();
    apply_all(store, actions)
}

/// Apply several updates to one service, all or nothing
///
/// # Errors
///
/// Fails before committing anything if any update would fail.
pub fn update_service(
    store: &mut MailboxStore,
    mailbox_id: &str,
    service_id: &str,
    updates: Vec<ServiceUpdate>,
) -> AppResult<Vec<(String, DispatchOutcome)>> {
    store.get_service(mailbox_id, service_id)?;
    let actions = updates
        .into_iter()
        .map(|update| (update.field(), update.into_action(mailbox_id, service_id)))
        .collect();
    apply_all(store, actions)
}

/// Each update touches a different field, so checking them all against the
/// current state predicts the sequential result.
fn apply_all(
    store: &mut MailboxStore,
    actions: Vec<(String, Action)>,
) -> AppResult<Vec<(String, DispatchOutcome)>> {
    for (_, action) in &actions {
        check(store, action)?;
    }
    actions
        .into_iter()
        .map(|(field, action)| dispatch(store, action).map(|outcome| (field, outcome)))
        .collect()
}

/// Record the linker's identity reference on a service
///
/// Not a reducer action: only `MailboxLinker` may change `auth_ref`, so it
/// is committed directly and cannot be reached by name through [`reduce`].
pub(crate) fn set_service_auth_reference(
    store: &mut MailboxStore,
    mailbox_id: &str,
    service_id: &str,
    auth_ref: Option<&str>,
) -> AppResult<DispatchOutcome> {
    let service = store.get_service(mailbox_id, service_id)?;
    if service.auth_ref.as_deref() == auth_ref {
        return Ok(DispatchOutcome::Unchanged { level: "linker" });
    }
    let next = Service {
        auth_ref: auth_ref.map(str::to_owned),
        ..service.clone()
    };
    store.commit_service(next)?;
    Ok(DispatchOutcome::Applied {
        revision: store.revision(),
        level: "linker",
    })
}

/// Dispatch any named action, for provider-specific operations the typed
/// creators above do not cover
pub fn reduce(
    store: &mut MailboxStore,
    name: &str,
    mailbox_id: &str,
    service_id: Option<&str>,
    payload: Value,
) -> AppResult<DispatchOutcome> {
    let action = match service_id {
        Some(service_id) => Action::service(name, mailbox_id, service_id, payload),
        None => Action::mailbox(name, mailbox_id, payload),
    };
    dispatch(store, action)
}
