//! Realtime snapshot of one product listing (stock and details).

use std::sync::Arc;

use rentline_shared::{EntityId, EventKind, Product, ServerEvent};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use super::{is_stale, seed_wins, track_membership};
use crate::ws::{listener, Listener, RealtimeClient, Room};

const WATCHED: [EventKind; 3] = [
    EventKind::ProductUpdated,
    EventKind::QuantityUpdated,
    EventKind::ProductDeleted,
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductState {
    pub joined: bool,
    pub snapshot: Option<Product>,
    pub deleted: bool,
}

impl ProductState {
    pub fn apply(&mut self, id: &EntityId, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::ProductUpdated(product) if &product.id == id => {
                if let Some(current) = &self.snapshot {
                    if current == product {
                        return false;
                    }
                    if is_stale(product.updated_at, current.updated_at) {
                        crate::log_warn!(
                            "dropping stale update for product {} ({:?} < {:?})",
                            id,
                            product.updated_at,
                            current.updated_at
                        );
                        return false;
                    }
                }
                self.snapshot = Some(product.clone());
                true
            }
            ServerEvent::QuantityUpdated(update) if &update.product_id == id => {
                let snapshot = self.snapshot.get_or_insert_with(|| Product {
                    id: id.clone(),
                    ..Product::default()
                });
                if snapshot.quantity == Some(update.quantity) {
                    return false;
                }
                snapshot.quantity = Some(update.quantity);
                true
            }
            ServerEvent::ProductDeleted(target) if target.id() == id => {
                !std::mem::replace(&mut self.deleted, true)
            }
            _ => false,
        }
    }
}

pub struct RealtimeProduct {
    client: RealtimeClient,
    product_id: EntityId,
    state: Arc<watch::Sender<ProductState>>,
    listener: Listener,
    membership: AbortHandle,
}

impl RealtimeProduct {
    pub fn mount(client: &RealtimeClient, product_id: impl Into<EntityId>) -> Self {
        let product_id = product_id.into();
        let state = Arc::new(watch::channel(ProductState::default()).0);

        client.join(&Room::Product(product_id.clone()));
        state.send_modify(|s| s.joined = true);
        let membership = track_membership(client, &state, |s: &mut ProductState| {
            std::mem::replace(&mut s.joined, false)
        });

        let on_event = {
            let state = state.clone();
            let id = product_id.clone();
            listener(move |event| {
                state.send_if_modified(|s| s.apply(&id, event));
            })
        };
        for kind in WATCHED {
            client.on(kind, on_event.clone());
        }

        Self {
            client: client.clone(),
            product_id,
            state,
            listener: on_event,
            membership,
        }
    }

    /// Join the product room again after the client forgot it.
    pub fn rejoin(&self) {
        self.client.join(&Room::Product(self.product_id.clone()));
        self.state.send_modify(|s| s.joined = true);
    }

    /// Seed from a REST fetch unless a push already filled the snapshot with
    /// something at least as new.
    pub fn seed(&self, product: Product) -> bool {
        self.state.send_if_modified(|s| {
            let newer = match &s.snapshot {
                None => true,
                Some(current) => seed_wins(product.updated_at, current.updated_at),
            };
            if newer {
                s.snapshot = Some(product);
            }
            newer
        })
    }

    pub fn product_id(&self) -> &EntityId {
        &self.product_id
    }

    pub fn snapshot(&self) -> Option<Product> {
        self.state.borrow().snapshot.clone()
    }

    pub fn state(&self) -> ProductState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProductState> {
        self.state.subscribe()
    }
}

impl Drop for RealtimeProduct {
    fn drop(&mut self) {
        self.membership.abort();
        self.client.leave(&Room::Product(self.product_id.clone()));
        for kind in WATCHED {
            self.client.off(kind, Some(&self.listener));
        }
        self.state.send_modify(|s| s.joined = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentline_shared::{ProductRef, QuantityUpdate};

    fn product(id: &str, quantity: i64) -> Product {
        Product {
            id: id.into(),
            name: Some("Tent".to_string()),
            quantity: Some(quantity),
            ..Product::default()
        }
    }

    #[test]
    fn quantity_updates_only_touch_the_watched_product() {
        let id = EntityId::from("p1");
        let mut state = ProductState::default();
        assert!(state.apply(&id, &ServerEvent::ProductUpdated(product("p1", 4))));
        let other = QuantityUpdate {
            product_id: "p2".into(),
            quantity: 0,
        };
        assert!(!state.apply(&id, &ServerEvent::QuantityUpdated(other)));
        let mine = QuantityUpdate {
            product_id: "p1".into(),
            quantity: 2,
        };
        assert!(state.apply(&id, &ServerEvent::QuantityUpdated(mine.clone())));
        assert!(!state.apply(&id, &ServerEvent::QuantityUpdated(mine)));
        assert_eq!(state.snapshot.unwrap().quantity, Some(2));
    }

    #[test]
    fn older_update_does_not_replace_newer_snapshot() {
        use chrono::{TimeZone, Utc};

        let id = EntityId::from("p1");
        let at = |minute| Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap());
        let mut state = ProductState {
            snapshot: Some(Product {
                updated_at: at(30),
                ..product("p1", 5)
            }),
            ..ProductState::default()
        };

        let older = Product {
            updated_at: at(10),
            ..product("p1", 9)
        };
        assert!(!state.apply(&id, &ServerEvent::ProductUpdated(older)));
        assert_eq!(state.snapshot.as_ref().unwrap().quantity, Some(5));

        let newer = Product {
            updated_at: at(40),
            ..product("p1", 1)
        };
        assert!(state.apply(&id, &ServerEvent::ProductUpdated(newer)));
        assert_eq!(state.snapshot.unwrap().quantity, Some(1));
    }

    #[test]
    fn deletion_is_reported_once() {
        let id = EntityId::from("p1");
        let mut state = ProductState::default();
        let deleted = ServerEvent::ProductDeleted(ProductRef::Id("p1".into()));
        assert!(state.apply(&id, &deleted));
        assert!(!state.apply(&id, &deleted));
        assert!(state.deleted);
    }
}
