//! Reducer chains for mailboxes and services
//!
//! Every level (base, provider, default service, capability service) is a
//! [`ReducerSet`]: a static table of `(action name, pure function)` pairs.
//! A chain is the ordered list of sets for one `(mailbox type, service type)`
//! pair, most specific first. Resolution walks the chain and takes the first
//! set that defines the action; if none does, the action is unsupported.
//!
//! Action names are namespaced per level (`mailbox.*`, `service.*`,
//! `google.*`, `google_mail.*`, ...) so a name is defined by exactly one set
//! in any chain. The tests below enforce that.

pub mod container;
pub mod generic;
pub mod google;
pub mod mailbox;
pub mod microsoft;
pub mod service;
pub mod slack;
pub mod trello;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{AppError, AppResult};
use crate::mailbox::{Capability, Mailbox, MailboxType, Service, ServiceType};

/// Pure transformation: current state + payload → new state, or `None`
/// when the action leaves the state unchanged
pub type ReduceFn<S> = fn(&S, &Value) -> AppResult<Option<S>>;

/// One level of a reducer chain
pub struct ReducerSet<S: 'static> {
    /// Level name used in logs and diagnostics
    pub name: &'static str,
    pub actions: &'static [(&'static str, ReduceFn<S>)],
}

impl<S> ReducerSet<S> {
    pub fn find(&self, action: &str) -> Option<ReduceFn<S>> {
        self.actions
            .iter()
            .find(|(name, _)| *name == action)
            .map(|(_, reduce)| *reduce)
    }

    pub fn action_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.actions.iter().map(|(name, _)| *name)
    }
}

/// Reducer picked for an action, with the level that defined it
pub struct Resolved<S: 'static> {
    pub level: &'static str,
    pub reduce: ReduceFn<S>,
}

/// Mailbox chain for a mailbox type: provider reducer, then base
pub fn mailbox_chain(mailbox_type: MailboxType) -> [&'static ReducerSet<Mailbox>; 2] {
    let provider = match mailbox_type {
        MailboxType::Generic => &generic::MAILBOX_REDUCERS,
        MailboxType::Google => &google::MAILBOX_REDUCERS,
        MailboxType::Slack => &slack::MAILBOX_REDUCERS,
        MailboxType::Trello => &trello::MAILBOX_REDUCERS,
        MailboxType::Microsoft => &microsoft::MAILBOX_REDUCERS,
        MailboxType::Container => &container::MAILBOX_REDUCERS,
    };
    [provider, &mailbox::REDUCERS]
}

/// Service chain for a service type: capability or default-service reducer,
/// then base
///
/// # Errors
///
/// Returns `Conflict` for a capability the provider does not offer.
pub fn service_chain(service_type: ServiceType) -> AppResult<[&'static ReducerSet<Service>; 2]> {
    use Capability::{Calendar, Communication, Default, Messenger, Storage};
    use MailboxType::{Container, Generic, Google, Microsoft, Slack, Trello};

    let specific = match (service_type.provider, service_type.capability) {
        (Generic, Default) => &generic::DEFAULT_SERVICE_REDUCERS,
        (Google, Default) => &google::DEFAULT_SERVICE_REDUCERS,
        (Google, Communication) => &google::COMMUNICATION_SERVICE_REDUCERS,
        (Google, Calendar) => &google::CALENDAR_SERVICE_REDUCERS,
        (Google, Messenger) => &google::MESSENGER_SERVICE_REDUCERS,
        (Slack, Default) => &slack::DEFAULT_SERVICE_REDUCERS,
        (Trello, Default) => &trello::DEFAULT_SERVICE_REDUCERS,
        (Microsoft, Default) => &microsoft::DEFAULT_SERVICE_REDUCERS,
        (Microsoft, Storage) => &microsoft::STORAGE_SERVICE_REDUCERS,
        (Container, Default) => &container::DEFAULT_SERVICE_REDUCERS,
        _ => {
            return Err(AppError::Conflict(format!(
                "service type {service_type} is not supported"
            )));
        }
    };
    Ok([specific, &service::REDUCERS])
}

/// Find the most specific reducer in `chain` that defines `action`
pub fn resolve<S>(chain: &[&'static ReducerSet<S>], action: &str) -> Option<Resolved<S>> {
    chain.iter().find_map(|set| {
        set.find(action).map(|reduce| Resolved {
            level: set.name,
            reduce,
        })
    })
}

/// Decode an action payload into its typed form
pub(crate) fn decode<T: DeserializeOwned>(action: &str, payload: &Value) -> AppResult<T> {
    serde_json::from_value(payload.clone())
        .map_err(|e| AppError::InvalidInput(format!("invalid payload for {action}: {e}")))
}

/// Error for a provider reducer handed a mailbox of another provider.
/// Chains are selected by mailbox type so this indicates a broken table.
pub(crate) fn profile_mismatch(mailbox: &Mailbox, expected: MailboxType) -> AppError {
    AppError::Internal(format!(
        "mailbox '{}' is {:?}, expected {:?} profile",
        mailbox.id,
        mailbox.mailbox_type(),
        expected
    ))
}

/// Normalize an optional display string: trimmed, blank becomes `None`
pub(crate) fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
