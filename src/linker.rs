//! External identity linkage for services
//!
//! Services only carry an opaque `auth_ref`; the linker owns what it points
//! at (account identity and access token). Tokens are held as
//! `SecretString` so they never end up in logs or serialized state.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tracing::{debug, info};
use uuid::Uuid;

use crate::actions;
use crate::errors::{AppError, AppResult};
use crate::mailbox::MailboxType;
use crate::store::MailboxStore;

/// Account identity behind a service's `auth_ref`
#[derive(Debug, Clone)]
pub struct LinkedIdentity {
    pub provider: MailboxType,
    pub account_email: Option<String>,
    access_token: SecretString,
    pub expires_at: Option<DateTime<Utc>>,
}

impl LinkedIdentity {
    pub fn new(
        provider: MailboxType,
        account_email: Option<String>,
        access_token: SecretString,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            provider,
            account_email,
            access_token,
            expires_at,
        }
    }

    #[cfg(test)]
    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }
}

/// Owner of all linked identities, keyed by `auth_ref`
#[derive(Debug, Default)]
pub struct MailboxLinker {
    identities: HashMap<String, LinkedIdentity>,
}

impl MailboxLinker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session partition name for a mailbox's web content
    pub fn partition_for(mailbox_id: &str) -> String {
        format!("persist:{mailbox_id}")
    }

    /// Link an identity to a service, replacing any previous link.
    /// Returns the new `auth_ref`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the service does not exist
    /// - `Conflict` if the identity's provider differs from the service's
    pub fn link(
        &mut self,
        store: &mut MailboxStore,
        mailbox_id: &str,
        service_id: &str,
        identity: LinkedIdentity,
    ) -> AppResult<String> {
        let service = store.get_service(mailbox_id, service_id)?;
        if service.service_type.provider != identity.provider {
            return Err(AppError::Conflict(format!(
                "cannot link a {} identity to {} service '{service_id}'",
                identity.provider.as_str(),
                service.service_type
            )));
        }
        let previous = service.auth_ref.clone();

        let auth_ref = Uuid::new_v4().to_string();
        self.identities.insert(auth_ref.clone(), identity);
        if let Err(e) =
            actions::set_service_auth_reference(store, mailbox_id, service_id, Some(&auth_ref))
        {
            self.identities.remove(&auth_ref);
            return Err(e);
        }
        if let Some(previous) = previous {
            self.identities.remove(&previous);
        }
        info!(%mailbox_id, %service_id, "linked service identity");
        Ok(auth_ref)
    }

    /// Identity currently linked to a service, if any
    pub fn resolve(
        &self,
        store: &MailboxStore,
        mailbox_id: &str,
        service_id: &str,
    ) -> AppResult<Option<&LinkedIdentity>> {
        let service = store.get_service(mailbox_id, service_id)?;
        Ok(service
            .auth_ref
            .as_ref()
            .and_then(|auth_ref| self.identities.get(auth_ref)))
    }

    /// Whether the identity behind `auth_ref` has expired. Unknown refs
    /// count as expired; identities without an expiry never expire.
    pub fn is_expired(&self, auth_ref: &str, now: DateTime<Utc>) -> bool {
        match self.identities.get(auth_ref) {
            Some(identity) => identity.expires_at.is_some_and(|at| at <= now),
            None => true,
        }
    }

    /// Remove a service's link; returns whether one existed
    pub fn unlink(
        &mut self,
        store: &mut MailboxStore,
        mailbox_id: &str,
        service_id: &str,
    ) -> AppResult<bool> {
        let Some(auth_ref) = store.get_service(mailbox_id, service_id)?.auth_ref.clone() else {
            return Ok(false);
        };
        actions::set_service_auth_reference(store, mailbox_id, service_id, None)?;
        Ok(self.identities.remove(&auth_ref).is_some())
    }

    /// Drop identities no service references any more (after removals);
    /// returns how many were dropped
    pub fn prune(&mut self, store: &MailboxStore) -> usize {
        if self.is_empty() {
            return 0;
        }
        let referenced: BTreeSet<String> = store
            .snapshot()
            .services
            .into_iter()
            .filter_map(|s| s.auth_ref)
            .collect();
        let before = self.identities.len();
        self.identities.retain(|auth_ref, _| referenced.contains(auth_ref));
        let dropped = before - self.identities.len();
        if dropped > 0 {
            debug!(dropped, "pruned orphaned identities");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}
