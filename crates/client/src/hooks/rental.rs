//! Realtime snapshot of one rental for its detail view.
//!
//! Push updates and the REST seed race for the same snapshot. Both carry
//! `updated_at`; whichever is older loses when both sides have one.

use std::sync::Arc;

use rentline_shared::{EventKind, Rental, ServerEvent};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use super::{is_stale, seed_wins, track_membership};
use crate::ws::{listener, Listener, RealtimeClient, Room};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RentalState {
    pub joined: bool,
    pub snapshot: Option<Rental>,
}

impl RentalState {
    /// Apply a `rental_updated` push for `key` (numeric id or UID).
    pub fn apply_push(&mut self, key: &str, rental: &Rental) -> bool {
        if !rental.matches(key) {
            return false;
        }
        if let Some(current) = &self.snapshot {
            if is_stale(rental.updated_at, current.updated_at) {
                crate::log_warn!(
                    "dropping stale update for rental {} ({:?} < {:?})",
                    key,
                    rental.updated_at,
                    current.updated_at
                );
                return false;
            }
        }
        self.snapshot = Some(rental.clone());
        true
    }

    /// Apply a REST-fetched snapshot. Only wins over a push when strictly
    /// newer.
    pub fn apply_seed(&mut self, rental: Rental) -> bool {
        match &self.snapshot {
            None => {
                self.snapshot = Some(rental);
                true
            }
            Some(current) if seed_wins(rental.updated_at, current.updated_at) => {
                self.snapshot = Some(rental);
                true
            }
            Some(_) => false,
        }
    }
}

/// A mounted rental view. Dropping it leaves the rental room and removes
/// both of its listeners.
pub struct RealtimeRental {
    client: RealtimeClient,
    key: String,
    state: Arc<watch::Sender<RentalState>>,
    listeners: Vec<(EventKind, Listener)>,
    membership: AbortHandle,
}

impl RealtimeRental {
    pub fn mount(client: &RealtimeClient, key: impl Into<String>) -> Self {
        Self::mount_with_created(client, key, |_: &Rental| {})
    }

    /// Mount and forward `rental_created` pushes to `on_created`. They never
    /// touch the snapshot.
    pub fn mount_with_created<F>(client: &RealtimeClient, key: impl Into<String>, on_created: F) -> Self
    where
        F: Fn(&Rental) + Send + Sync + 'static,
    {
        let key = key.into();
        let state = Arc::new(watch::channel(RentalState::default()).0);

        client.join(&Room::Rental(key.as_str().into()));
        state.send_modify(|s| s.joined = true);
        let membership = track_membership(client, &state, |s: &mut RentalState| {
            std::mem::replace(&mut s.joined, false)
        });

        let on_updated = {
            let state = state.clone();
            let key = key.clone();
            listener(move |event| {
                if let ServerEvent::RentalUpdated(rental) = event {
                    state.send_if_modified(|s| s.apply_push(&key, rental));
                }
            })
        };
        let on_created = listener(move |event| {
            if let ServerEvent::RentalCreated(rental) = event {
                on_created(rental);
            }
        });

        let listeners = vec![
            (EventKind::RentalUpdated, on_updated),
            (EventKind::RentalCreated, on_created),
        ];
        for (kind, l) in &listeners {
            client.on(*kind, l.clone());
        }

        Self {
            client: client.clone(),
            key,
            state,
            listeners,
            membership,
        }
    }

    /// Join the rental room again after the client forgot it.
    pub fn rejoin(&self) {
        self.client.join(&Room::Rental(self.key.as_str().into()));
        self.state.send_modify(|s| s.joined = true);
    }

    /// Seed from a REST fetch. Returns false if a newer (or unversioned)
    /// push already set the snapshot.
    pub fn seed(&self, rental: Rental) -> bool {
        let applied = self.state.send_if_modified(|s| s.apply_seed(rental));
        if !applied {
            crate::log_warn!("ignoring stale seed for rental {}", self.key);
        }
        applied
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn snapshot(&self) -> Option<Rental> {
        self.state.borrow().snapshot.clone()
    }

    pub fn state(&self) -> RentalState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RentalState> {
        self.state.subscribe()
    }
}

impl Drop for RealtimeRental {
    fn drop(&mut self) {
        self.membership.abort();
        self.client.leave(&Room::Rental(self.key.as_str().into()));
        for (kind, l) in self.listeners.drain(..) {
            self.client.off(kind, Some(&l));
        }
        self.state.send_modify(|s| s.joined = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn rental(id: i64, status: &str, minute: Option<u32>) -> Rental {
        Rental {
            id: Some(id.into()),
            rental_status: Some(status.to_string()),
            updated_at: minute.map(|m| Utc.with_ymd_and_hms(2026, 3, 1, 12, m, 0).unwrap()),
            ..Rental::default()
        }
    }

    #[test]
    fn push_for_another_rental_is_ignored() {
        let mut state = RentalState::default();
        assert!(state.apply_push("100", &rental(100, "active", None)));
        assert!(!state.apply_push("100", &rental(999, "cancelled", None)));
        assert_eq!(state.snapshot, Some(rental(100, "active", None)));
    }

    #[test]
    fn push_matches_uid() {
        let mut state = RentalState::default();
        let by_uid = Rental {
            uid: Some("RNT-7".to_string()),
            ..Rental::default()
        };
        assert!(state.apply_push("RNT-7", &by_uid));
    }

    #[test]
    fn older_push_is_dropped() {
        let mut state = RentalState::default();
        state.apply_push("100", &rental(100, "active", Some(30)));
        assert!(!state.apply_push("100", &rental(100, "pending", Some(10))));
        assert!(state.apply_push("100", &rental(100, "returned", Some(45))));
        assert!(state.apply_push("100", &rental(100, "closed", None)));
    }

    #[test]
    fn seed_loses_to_newer_push() {
        let mut state = RentalState::default();
        state.apply_push("100", &rental(100, "active", Some(30)));
        assert!(!state.apply_seed(rental(100, "pending", Some(10))));
        assert!(!state.apply_seed(rental(100, "pending", None)));
        assert!(state.apply_seed(rental(100, "returned", Some(31))));
    }

    #[test]
    fn seed_fills_empty_snapshot() {
        let mut state = RentalState::default();
        assert!(state.apply_seed(rental(100, "pending", None)));
    }
}
