//! In-memory authoritative mailbox and service state
//!
//! The store is the only owner of mutable state. Each mutation replaces one
//! entity (or one structural relation) and then notifies subscribers
//! synchronously, after the replacement is complete. Subscriber callbacks
//! only see the committed change, never the store itself, so they cannot
//! dispatch re-entrantly; follow-up work has to be deferred by the caller.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::mailbox::{Capability, Mailbox, Service};

/// Handle returned by [`MailboxStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// What a commit changed
#[derive(Debug, Clone, Copy)]
pub enum Change<'a> {
    Mailbox(&'a Mailbox),
    Service(&'a Service),
    MailboxRemoved(&'a str),
    ServiceRemoved {
        mailbox_id: &'a str,
        service_id: &'a str,
    },
    /// Mailbox display order changed
    Reordered,
    /// Whole state replaced from a snapshot
    Loaded,
}

/// Notification delivered to subscribers after each commit
#[derive(Debug, Clone, Copy)]
pub struct StoreChange<'a> {
    /// Monotonic commit counter
    pub revision: u64,
    pub change: Change<'a>,
}

type Subscriber = Box<dyn FnMut(&StoreChange<'_>) + Send>;

/// Serializable copy of the whole store, mailboxes in display order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub mailboxes: Vec<Mailbox>,
    pub services: Vec<Service>,
}

/// Mailbox and service state keyed by id, with insertion-ordered mailboxes
#[derive(Default)]
pub struct MailboxStore {
    mailboxes: HashMap<String, Mailbox>,
    /// Mailbox ids in display order
    order: Vec<String>,
    services: HashMap<String, Service>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
    revision: u64,
}

impl MailboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a snapshot, validating every invariant
    ///
    /// # Errors
    ///
    /// Returns `Conflict` or `InvalidInput` describing the first violated
    /// invariant (duplicate ids, orphan services, missing default service,
    /// unsupported capability).
    pub fn from_snapshot(snapshot: StoreSnapshot) -> AppResult<Self> {
        let mut store = Self::new();
        store.load(snapshot)?;
        Ok(store)
    }

    /// Current commit revision
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, mailbox_id: &str) -> AppResult<&Mailbox> {
        self.mailboxes
            .get(mailbox_id)
            .ok_or_else(|| AppError::NotFound(format!("mailbox '{mailbox_id}' does not exist")))
    }

    /// Look up a service, checking it belongs to the mailbox
    pub fn get_service(&self, mailbox_id: &str, service_id: &str) -> AppResult<&Service> {
        self.get(mailbox_id)?;
        self.services
            .get(service_id)
            .filter(|service| service.mailbox_id == mailbox_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "service '{service_id}' does not exist in mailbox '{mailbox_id}'"
                ))
            })
    }

    /// All mailboxes in insertion (display) order. The iterator is lazy and
    /// can be cloned to restart it.
    pub fn all(&self) -> impl Iterator<Item = &Mailbox> + Clone + '_ {
        self.order.iter().filter_map(|id| self.mailboxes.get(id))
    }

    /// Services of a mailbox in the mailbox's service order
    pub fn services_of(&self, mailbox_id: &str) -> AppResult<Vec<&Service>> {
        let mailbox = self.get(mailbox_id)?;
        Ok(mailbox
            .services
            .iter()
            .filter_map(|id| self.services.get(id))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Register a callback invoked once after every commit
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&StoreChange<'_>) + Send + 'static,
    {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a callback; returns whether it was registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        before != self.subscribers.len()
    }

    /// Replace a mailbox with a reducer's output
    ///
    /// The mailbox keeps its id, type and set of attached services; reducers
    /// may only reorder services.
    pub fn commit_mailbox(&mut self, next: Mailbox) -> AppResult<()> {
        let current = self.get(&next.id)?;
        if current.mailbox_type() != next.mailbox_type() {
            return Err(AppError::Conflict(format!(
                "mailbox '{}' cannot change type",
                next.id
            )));
        }
        let current_services: BTreeSet<&String> = current.services.iter().collect();
        let next_services: BTreeSet<&String> = next.services.iter().collect();
        if current_services != next_services || next_services.len() != next.services.len() {
            return Err(AppError::Conflict(format!(
                "mailbox '{}' service membership is managed by the store",
                next.id
            )));
        }

        let id = next.id.clone();
        self.mailboxes.insert(id.clone(), next);
        self.revision += 1;
        debug!(mailbox_id = %id, revision = self.revision, "committed mailbox");
        if let Some(mailbox) = self.mailboxes.get(&id) {
            notify(&mut self.subscribers, self.revision, Change::Mailbox(mailbox));
        }
        Ok(())
    }

    /// Replace a service with a reducer's output
    pub fn commit_service(&mut self, next: Service) -> AppResult<()> {
        let current = self.get_service(&next.mailbox_id, &next.id)?;
        if current.service_type != next.service_type {
            return Err(AppError::Conflict(format!(
                "service '{}' cannot change type",
                next.id
            )));
        }

        let id = next.id.clone();
        self.services.insert(id.clone(), next);
        self.revision += 1;
        debug!(service_id = %id, revision = self.revision, "committed service");
        if let Some(service) = self.services.get(&id) {
            notify(&mut self.subscribers, self.revision, Change::Service(service));
        }
        Ok(())
    }

    /// Add a mailbox together with its default service, appended last
    pub fn insert_mailbox(&mut self, mut mailbox: Mailbox, default_service: Service) -> AppResult<()> {
        if self.mailboxes.contains_key(&mailbox.id) {
            return Err(AppError::Conflict(format!(
                "mailbox '{}' already exists",
                mailbox.id
            )));
        }
        if !mailbox.services.is_empty() {
            return Err(AppError::invalid(
                "new mailboxes must not list services; attach them through the store",
            ));
        }
        check_service_fits(&mailbox, &default_service)?;
        if default_service.service_type.capability != Capability::Default {
            return Err(AppError::invalid(
                "the first service of a mailbox must be its default service",
            ));
        }
        if self.services.contains_key(&default_service.id) {
            return Err(AppError::Conflict(format!(
                "service '{}' already exists",
                default_service.id
            )));
        }

        mailbox.services.push(default_service.id.clone());
        let id = mailbox.id.clone();
        self.services.insert(default_service.id.clone(), default_service);
        self.mailboxes.insert(id.clone(), mailbox);
        self.order.push(id.clone());
        self.revision += 1;
        debug!(mailbox_id = %id, revision = self.revision, "inserted mailbox");
        if let Some(mailbox) = self.mailboxes.get(&id) {
            notify(&mut self.subscribers, self.revision, Change::Mailbox(mailbox));
        }
        Ok(())
    }

    /// Attach a capability service to an existing mailbox
    pub fn attach_service(&mut self, service: Service) -> AppResult<()> {
        let mailbox = self.get(&service.mailbox_id)?;
        check_service_fits(mailbox, &service)?;
        if service.service_type.capability == Capability::Default {
            return Err(AppError::Conflict(format!(
                "mailbox '{}' already has a default service",
                mailbox.id
            )));
        }
        if self.services.contains_key(&service.id) {
            return Err(AppError::Conflict(format!(
                "service '{}' already exists",
                service.id
            )));
        }

        let mailbox_id = service.mailbox_id.clone();
        let service_id = service.id.clone();
        self.services.insert(service_id.clone(), service);
        if let Some(mailbox) = self.mailboxes.get_mut(&mailbox_id) {
            mailbox.services.push(service_id.clone());
        }
        self.revision += 1;
        debug!(%mailbox_id, %service_id, revision = self.revision, "attached service");
        if let Some(mailbox) = self.mailboxes.get(&mailbox_id) {
            notify(&mut self.subscribers, self.revision, Change::Mailbox(mailbox));
        }
        Ok(())
    }

    /// Detach and drop a capability service. Default services live and die
    /// with their mailbox.
    pub fn remove_service(&mut self, mailbox_id: &str, service_id: &str) -> AppResult<Service> {
        let service = self.get_service(mailbox_id, service_id)?;
        if service.service_type.capability == Capability::Default {
            return Err(AppError::Conflict(format!(
                "service '{service_id}' is the default service of mailbox '{mailbox_id}'"
            )));
        }

        let removed = self
            .services
            .remove(service_id)
            .ok_or_else(|| AppError::Internal(format!("service '{service_id}' vanished")))?;
        if let Some(mailbox) = self.mailboxes.get_mut(mailbox_id) {
            mailbox.services.retain(|id| id != service_id);
        }
        self.revision += 1;
        debug!(%mailbox_id, %service_id, revision = self.revision, "removed service");
        notify(
            &mut self.subscribers,
            self.revision,
            Change::ServiceRemoved {
                mailbox_id,
                service_id,
            },
        );
        Ok(removed)
    }

    /// Remove a mailbox and every service attached to it
    pub fn remove_mailbox(&mut self, mailbox_id: &str) -> AppResult<Mailbox> {
        let removed = self
            .mailboxes
            .remove(mailbox_id)
            .ok_or_else(|| AppError::NotFound(format!("mailbox '{mailbox_id}' does not exist")))?;
        for service_id in &removed.services {
            self.services.remove(service_id);
        }
        self.order.retain(|id| id != mailbox_id);
        self.revision += 1;
        debug!(%mailbox_id, revision = self.revision, "removed mailbox");
        notify(
            &mut self.subscribers,
            self.revision,
            Change::MailboxRemoved(mailbox_id),
        );
        Ok(removed)
    }

    /// Move a mailbox to a new display position (clamped)
    pub fn move_mailbox(&mut self, mailbox_id: &str, index: usize) -> AppResult<()> {
        let from = self
            .order
            .iter()
            .position(|id| id == mailbox_id)
            .ok_or_else(|| AppError::NotFound(format!("mailbox '{mailbox_id}' does not exist")))?;
        let to = index.min(self.order.len() - 1);
        if from == to {
            return Ok(());
        }
        let id = self.order.remove(from);
        self.order.insert(to, id);
        self.revision += 1;
        notify(&mut self.subscribers, self.revision, Change::Reordered);
        Ok(())
    }

    /// Copy of the current state, mailboxes in display order
    pub fn snapshot(&self) -> StoreSnapshot {
        let mailboxes: Vec<Mailbox> = self.all().cloned().collect();
        let services = mailboxes
            .iter()
            .flat_map(|m| m.services.iter())
            .filter_map(|id| self.services.get(id).cloned())
            .collect();
        StoreSnapshot {
            mailboxes,
            services,
        }
    }

    /// Replace the whole state with a validated snapshot. On error the
    /// current state is left untouched.
    pub fn load(&mut self, snapshot: StoreSnapshot) -> AppResult<()> {
        let mut services: HashMap<String, Service> = HashMap::new();
        for service in snapshot.services {
            if services.contains_key(&service.id) {
                return Err(AppError::Conflict(format!(
                    "service '{}' appears twice in snapshot",
                    service.id
                )));
            }
            services.insert(service.id.clone(), service);
        }

        let mut mailboxes = HashMap::new();
        let mut order = Vec::with_capacity(snapshot.mailboxes.len());
        let mut claimed = BTreeSet::new();
        for mailbox in snapshot.mailboxes {
            if mailboxes.contains_key(&mailbox.id) {
                return Err(AppError::Conflict(format!(
                    "mailbox '{}' appears twice in snapshot",
                    mailbox.id
                )));
            }
            let mut defaults = 0;
            for service_id in &mailbox.services {
                let service = services.get(service_id).ok_or_else(|| {
                    AppError::invalid(format!(
                        "mailbox '{}' lists unknown service '{service_id}'",
                        mailbox.id
                    ))
                })?;
                check_service_fits(&mailbox, service)?;
                if !claimed.insert(service_id.clone()) {
                    return Err(AppError::Conflict(format!(
                        "service '{service_id}' is listed twice"
                    )));
                }
                if service.service_type.capability == Capability::Default {
                    defaults += 1;
                }
            }
            if defaults != 1 {
                return Err(AppError::invalid(format!(
                    "mailbox '{}' must have exactly one default service, found {defaults}",
                    mailbox.id
                )));
            }
            order.push(mailbox.id.clone());
            mailboxes.insert(mailbox.id.clone(), mailbox);
        }
        if claimed.len() != services.len() {
            return Err(AppError::invalid(
                "snapshot contains services not attached to any mailbox",
            ));
        }

        self.mailboxes = mailboxes;
        self.order = order;
        self.services = services;
        self.revision += 1;
        debug!(mailboxes = self.order.len(), revision = self.revision, "loaded snapshot");
        notify(&mut self.subscribers, self.revision, Change::Loaded);
        Ok(())
    }
}

/// Check a service may live in a mailbox: parent id, provider and capability
fn check_service_fits(mailbox: &Mailbox, service: &Service) -> AppResult<()> {
    if service.mailbox_id != mailbox.id {
        return Err(AppError::invalid(format!(
            "service '{}' belongs to mailbox '{}', not '{}'",
            service.id, service.mailbox_id, mailbox.id
        )));
    }
    let ty = service.service_type;
    if ty.provider != mailbox.mailbox_type() || !ty.provider.supports(ty.capability) {
        return Err(AppError::Conflict(format!(
            "service type {ty} is not supported by {} mailbox '{}'",
            mailbox.mailbox_type().as_str(),
            mailbox.id
        )));
    }
    if !ty.supports_unread() && service.unread_count.is_some() {
        return Err(AppError::invalid(format!(
            "service type {ty} does not report unread counts"
        )));
    }
    Ok(())
}

fn notify(subscribers: &mut [(SubscriptionId, Subscriber)], revision: u64, change: Change<'_>) {
    let event = StoreChange { revision, change };
    for (_, callback) in subscribers.iter_mut() {
        callback(&event);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use super::{Change, MailboxStore};
    use crate::mailbox::{Capability, Mailbox, MailboxProfile, MailboxType, Service, ServiceType};

    /// Store with Google mailbox `m1` (default `s1`) and Slack mailbox `m2` (default `s2`)
    pub(crate) fn seeded_store() -> MailboxStore {
        let mut store = MailboxStore::new();
        let mut google = Mailbox::new(
            "m1",
            MailboxProfile::blank(MailboxType::Google).expect("profile"),
        );
        google.name = Some("Personal".to_owned());
        store
            .insert_mailbox(
                google,
                Service::new("s1", "m1", ServiceType::default_for(MailboxType::Google)),
            )
            .expect("insert m1");
        store
            .insert_mailbox(
                Mailbox::new("m2", MailboxProfile::blank(MailboxType::Slack).expect("profile")),
                Service::new("s2", "m2", ServiceType::default_for(MailboxType::Slack)),
            )
            .expect("insert m2");
        store
    }

    #[test]
    fn all_preserves_insertion_order_and_restarts() {
        let store = seeded_store();
        let iter = store.all();
        let first: Vec<&str> = iter.clone().map(|m| m.id.as_str()).collect();
        let second: Vec<&str> = iter.map(|m| m.id.as_str()).collect();
        assert_eq!(first, vec!["m1", "m2"]);
        assert_eq!(first, second);
    }

    #[test]
    fn get_service_checks_parent_mailbox() {
        let store = seeded_store();
        assert!(store.get_service("m1", "s1").is_ok());
        let err = store.get_service("m2", "s1").expect_err("wrong parent");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn attach_service_enforces_capability_table() {
        let mut store = seeded_store();
        store
            .attach_service(Service::new(
                "s3",
                "m1",
                ServiceType::new(MailboxType::Google, Capability::Calendar),
            ))
            .expect("google supports calendar");
        assert_eq!(store.get("m1").expect("m1").services, vec!["s1", "s3"]);

        let err = store
            .attach_service(Service::new(
                "s4",
                "m2",
                ServiceType::new(MailboxType::Slack, Capability::Storage),
            ))
            .expect_err("slack has no storage");
        assert!(err.to_string().contains("not supported"));

        let err = store
            .attach_service(Service::new(
                "s5",
                "m2",
                ServiceType::default_for(MailboxType::Slack),
            ))
            .expect_err("second default");
        assert!(err.to_string().contains("already has a default"));
    }

    #[test]
    fn subscribers_see_each_commit_once_in_order() {
        let mut store = seeded_store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = store.subscribe(move |change| {
            if let Change::Mailbox(mailbox) = change.change {
                sink.lock()
                    .expect("lock")
                    .push((change.revision, mailbox.name.clone()));
            }
        });

        let mut next = store.get("m1").expect("m1").clone();
        next.name = Some("Work".to_owned());
        store.commit_mailbox(next.clone()).expect("commit");
        next.name = Some("Home".to_owned());
        store.commit_mailbox(next).expect("commit");

        let seen_now = seen.lock().expect("lock").clone();
        assert_eq!(seen_now.len(), 2);
        assert!(seen_now[0].0 < seen_now[1].0);
        assert_eq!(seen_now[1].1.as_deref(), Some("Home"));

        assert!(store.unsubscribe(sub));
        assert!(!store.unsubscribe(sub));
    }

    #[test]
    fn commit_rejects_membership_changes() {
        let mut store = seeded_store();
        let mut next = store.get("m1").expect("m1").clone();
        next.services.push("s2".to_owned());
        let err = store.commit_mailbox(next).expect_err("must fail");
        assert!(err.to_string().contains("membership"));
    }

    #[test]
    fn remove_mailbox_drops_its_services() {
        let mut store = seeded_store();
        store.remove_mailbox("m1").expect("remove");
        assert!(store.get("m1").is_err());
        assert!(store.get_service("m1", "s1").is_err());
        assert_eq!(store.snapshot().services.len(), 1);
    }

    #[test]
    fn default_service_cannot_be_removed_alone() {
        let mut store = seeded_store();
        let err = store.remove_service("m1", "s1").expect_err("must fail");
        assert!(err.to_string().contains("default service"));
    }

    #[test]
    fn move_mailbox_clamps_and_reorders() {
        let mut store = seeded_store();
        store.move_mailbox("m1", 10).expect("move");
        let ids: Vec<&str> = store.all().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m1"]);
    }

    #[test]
    fn snapshot_round_trips_through_load() {
        let store = seeded_store();
        let snapshot = store.snapshot();
        let reloaded = MailboxStore::from_snapshot(snapshot.clone()).expect("valid snapshot");
        assert_eq!(reloaded.snapshot(), snapshot);
    }

    #[test]
    fn load_rejects_mailbox_without_default_and_keeps_state() {
        let mut store = seeded_store();
        let mut snapshot = store.snapshot();
        snapshot.mailboxes[0].services.clear();
        snapshot.services.retain(|s| s.mailbox_id != "m1");
        let err = store.load(snapshot).expect_err("must fail");
        assert!(err.to_string().contains("exactly one default"));
        assert_eq!(store.len(), 2);
    }
}
