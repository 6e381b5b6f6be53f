//! Two-phase context-menu binding for content surfaces
//!
//! A created surface first registers an intent to bind. The binding is
//! confirmed once the surface is observably attached to a window. Intents
//! that are never confirmed expire after a TTL and the pending table is
//! capped, oldest intents evicted first.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use super::collaborators::{SurfaceId, SurfaceOwner, WindowId};

/// Upper bound on unconfirmed intents kept at once
const MAX_PENDING: usize = 256;

/// How a bound surface relates to its window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// Main content of a recognized top-level window
    Window,
    /// Auxiliary surface that carries its own menu listener
    Surface,
}

/// An attached context-menu listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub surface: SurfaceId,
    pub window: WindowId,
    pub kind: BindingKind,
}

/// Bound surfaces plus pending bind intents
#[derive(Debug)]
pub struct SurfaceBinder {
    /// Lifetime of an unconfirmed intent
    ttl: Duration,
    /// Intent expiry keyed by surface
    pending: HashMap<SurfaceId, Instant>,
    /// The bound set; a surface appears here at most once
    bound: HashMap<SurfaceId, Binding>,
}

impl SurfaceBinder {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: HashMap::new(),
            bound: HashMap::new(),
        }
    }

    /// Phase one: record that `surface` should be bound once attached.
    /// Returns `false` if it is already bound or already pending.
    pub fn register_intent(&mut self, surface: SurfaceId, now: Instant) -> bool {
        self.cleanup(now);
        if self.bound.contains_key(&surface) || self.pending.contains_key(&surface) {
            debug!(surface, "duplicate surface creation ignored");
            return false;
        }
        self.pending.insert(surface, now + self.ttl);
        self.evict_if_needed();
        true
    }

    /// Phase two: bind a pending surface now that its owner is known.
    ///
    /// Returns the new binding, or `None` when there is nothing to do: the
    /// surface has no live intent, is already bound, or is still
    /// unattached (the intent stays pending in that case).
    pub fn confirm(
        &mut self,
        surface: SurfaceId,
        owner: SurfaceOwner,
        now: Instant,
    ) -> Option<Binding> {
        self.cleanup(now);
        if self.bound.contains_key(&surface) {
            return None;
        }
        if !self.pending.contains_key(&surface) {
            debug!(surface, "no live bind intent");
            return None;
        }
        let binding = match owner {
            SurfaceOwner::TopLevel(window) => Binding {
                surface,
                window,
                kind: BindingKind::Window,
            },
            SurfaceOwner::Hosted(window) => Binding {
                surface,
                window,
                kind: BindingKind::Surface,
            },
            SurfaceOwner::Unattached => return None,
        };
        self.pending.remove(&surface);
        self.bound.insert(surface, binding);
        Some(binding)
    }

    /// Remove the binding (or intent) for a destroyed surface
    pub fn unbind(&mut self, surface: SurfaceId) -> bool {
        let pending = self.pending.remove(&surface).is_some();
        self.bound.remove(&surface).is_some() || pending
    }

    pub fn is_bound(&self, surface: SurfaceId) -> bool {
        self.bound.contains_key(&surface)
    }

    pub fn binding(&self, surface: SurfaceId) -> Option<Binding> {
        self.bound.get(&surface).copied()
    }

    pub fn bound_count(&self) -> usize {
        self.bound.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop everything; used on shutdown
    pub fn clear(&mut self) {
        self.pending.clear();
        self.bound.clear();
    }

    fn cleanup(&mut self, now: Instant) {
        self.pending.retain(|_, expires_at| *expires_at > now);
    }

    fn evict_if_needed(&mut self) {
        if self.pending.len() <= MAX_PENDING {
            return;
        }
        let overflow = self.pending.len() - MAX_PENDING;
        let mut by_expiry: Vec<(SurfaceId, Instant)> =
            self.pending.iter().map(|(id, at)| (*id, *at)).collect();
        by_expiry.sort_by_key(|(_, expires_at)| *expires_at);
        for (id, _) in by_expiry.into_iter().take(overflow) {
            self.pending.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{BindingKind, MAX_PENDING, SurfaceBinder};
    use crate::context_menu::collaborators::SurfaceOwner;

    #[test]
    fn duplicate_creation_binds_once() {
        let mut binder = SurfaceBinder::new(Duration::from_secs(5));
        let now = Instant::now();
        assert!(binder.register_intent(3, now));
        assert!(!binder.register_intent(3, now));

        let binding = binder
            .confirm(3, SurfaceOwner::TopLevel(1), now)
            .expect("bound");
        assert_eq!(binding.kind, BindingKind::Window);
        assert!(!binder.register_intent(3, now));
        assert!(binder.confirm(3, SurfaceOwner::TopLevel(1), now).is_none());
        assert_eq!(binder.bound_count(), 1);
    }

    #[test]
    fn destroy_removes_from_bound_set() {
        let mut binder = SurfaceBinder::new(Duration::from_secs(5));
        let now = Instant::now();
        binder.register_intent(3, now);
        binder.confirm(3, SurfaceOwner::Hosted(1), now);
        assert!(binder.is_bound(3));
        assert!(binder.unbind(3));
        assert!(!binder.is_bound(3));
        assert!(!binder.unbind(3));
    }

    #[test]
    fn unattached_surface_stays_pending() {
        let mut binder = SurfaceBinder::new(Duration::from_secs(5));
        let now = Instant::now();
        binder.register_intent(4, now);
        assert!(binder.confirm(4, SurfaceOwner::Unattached, now).is_none());
        assert_eq!(binder.pending_count(), 1);
        let binding = binder
            .confirm(4, SurfaceOwner::Hosted(2), now)
            .expect("bound after attach");
        assert_eq!(binding.kind, BindingKind::Surface);
        assert_eq!(binding.window, 2);
    }

    #[test]
    fn expired_intent_is_not_confirmed() {
        let mut binder = SurfaceBinder::new(Duration::from_millis(50));
        let now = Instant::now();
        binder.register_intent(5, now);
        let later = now + Duration::from_millis(60);
        assert!(binder.confirm(5, SurfaceOwner::TopLevel(1), later).is_none());
        assert_eq!(binder.pending_count(), 0);
    }

    #[test]
    fn confirm_without_intent_is_ignored() {
        let mut binder = SurfaceBinder::new(Duration::from_secs(5));
        assert!(
            binder
                .confirm(9, SurfaceOwner::TopLevel(1), Instant::now())
                .is_none()
        );
    }

    #[test]
    fn pending_table_is_capped() {
        let mut binder = SurfaceBinder::new(Duration::from_secs(5));
        let start = Instant::now();
        for surface in 0..(MAX_PENDING as u64 + 3) {
            binder.register_intent(surface, start + Duration::from_millis(surface));
        }
        assert_eq!(binder.pending_count(), MAX_PENDING);
        assert!(
            binder
                .confirm(0, SurfaceOwner::TopLevel(1), start + Duration::from_secs(1))
                .is_none()
        );
    }
}
