//! View-scoped realtime state. Mounting joins a room and registers
//! listeners; dropping the returned value undoes exactly that.
//!
//! Mounting must happen inside a Tokio runtime: each hook keeps a small task
//! that clears its `joined` flag when the client reports that rooms were
//! forgotten (see [`RealtimeClient::membership_resets`]). The owning view
//! calls `rejoin` once it wants the room back.

mod chat;
mod product;
mod rental;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::ws::RealtimeClient;

pub use chat::{ChatState, RealtimeChat};
pub use product::{ProductState, RealtimeProduct};
pub use rental::{RealtimeRental, RentalState};

/// An incoming snapshot is stale only when both sides carry a version and
/// the incoming one is older.
pub(crate) fn is_stale(incoming: Option<DateTime<Utc>>, current: Option<DateTime<Utc>>) -> bool {
    matches!((incoming, current), (Some(incoming), Some(current)) if incoming < current)
}

/// A seed wins only when strictly newer than what a push already delivered.
pub(crate) fn seed_wins(incoming: Option<DateTime<Utc>>, current: Option<DateTime<Utc>>) -> bool {
    matches!((incoming, current), (Some(incoming), Some(current)) if incoming > current)
}

/// Run `forget` on the hook state every time the client drops its rooms.
pub(crate) fn track_membership<T, F>(
    client: &RealtimeClient,
    state: &Arc<watch::Sender<T>>,
    forget: F,
) -> AbortHandle
where
    T: Send + Sync + 'static,
    F: Fn(&mut T) -> bool + Send + 'static,
{
    let mut resets = client.membership_resets();
    let state = state.clone();
    tokio::spawn(async move {
        while resets.changed().await.is_ok() {
            state.send_if_modified(|s| forget(s));
        }
    })
    .abort_handle()
}
