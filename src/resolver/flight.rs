//! Per-name single-flight slots
//!
//! Each connection name maps to either a cached connection or an in-flight
//! construction. The first caller to miss becomes the leader and holds a
//! [`Flight`]; later callers get a receiver and wait for the leader's
//! outcome. The slot map lock is only held for map operations.

use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Cache key. `None` is the name used when no name was given and no
/// default is configured; it never collides with a string name.
pub(crate) type ConnectionName = Option<String>;

/// Outcome of a construction as seen by waiters; `None` until settled
pub(super) type Outcome<T> = Option<Result<Arc<T>>>;

pub(super) enum Slot<T> {
    Ready(Arc<T>),
    InFlight(watch::Receiver<Outcome<T>>),
}

pub(super) type Slots<T> = Mutex<HashMap<ConnectionName, Slot<T>>>;

pub(super) enum Role<'a, T> {
    /// Cache hit
    Ready(Arc<T>),
    /// This caller constructs
    Leader(Flight<'a, T>),
    /// Another caller is constructing
    Waiter(watch::Receiver<Outcome<T>>),
}

/// Look up `name`, registering an in-flight slot on a miss
pub(super) fn join<'a, T>(slots: &'a Slots<T>, name: &ConnectionName) -> Role<'a, T> {
    let mut map = slots.lock();
    match map.get(name) {
        Some(Slot::Ready(conn)) => Role::Ready(conn.clone()),
        Some(Slot::InFlight(rx)) => Role::Waiter(rx.clone()),
        None => {
            let (tx, rx) = watch::channel(None);
            map.insert(name.clone(), Slot::InFlight(rx));
            Role::Leader(Flight {
                slots,
                name: name.clone(),
                tx,
                settled: false,
            })
        }
    }
}

/// Remove and return the cached connection for `name`, if any
pub(super) fn evict<T>(slots: &Slots<T>, name: &ConnectionName) -> Option<Arc<T>> {
    let mut map = slots.lock();
    if !matches!(map.get(name), Some(Slot::Ready(_))) {
        return None;
    }
    match map.remove(name) {
        Some(Slot::Ready(conn)) => Some(conn),
        _ => None,
    }
}

/// Remove and return every cached connection; in-flight slots stay
pub(super) fn drain<T>(slots: &Slots<T>) -> Vec<(ConnectionName, Arc<T>)> {
    let mut drained = Vec::new();
    slots.lock().retain(|name, slot| match slot {
        Slot::Ready(conn) => {
            drained.push((name.clone(), conn.clone()));
            false
        }
        Slot::InFlight(_) => true,
    });
    drained
}

/// Number of cached connections
pub(super) fn ready_count<T>(slots: &Slots<T>) -> usize {
    slots
        .lock()
        .values()
        .filter(|slot| matches!(slot, Slot::Ready(_)))
        .count()
}

/// Names with a cached connection
pub(super) fn ready_names<T>(slots: &Slots<T>) -> Vec<ConnectionName> {
    slots
        .lock()
        .iter()
        .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
        .map(|(name, _)| name.clone())
        .collect()
}

pub(super) fn is_ready<T>(slots: &Slots<T>, name: &ConnectionName) -> bool {
    matches!(slots.lock().get(name), Some(Slot::Ready(_)))
}

/// Leader's claim on an in-flight slot.
///
/// Dropping it unsettled (leader cancelled) frees the slot and closes the
/// channel, so waiters retry instead of hanging.
pub(super) struct Flight<'a, T> {
    slots: &'a Slots<T>,
    name: ConnectionName,
    tx: watch::Sender<Outcome<T>>,
    settled: bool,
}

impl<T> Flight<'_, T> {
    pub(super) fn name(&self) -> &ConnectionName {
        &self.name
    }

    /// Settle the flight and wake every waiter.
    ///
    /// A successful connection is cached unless `reject` returns an error,
    /// in which case that error is published and the connection is handed
    /// back for disposal. Failures are never cached.
    pub(super) fn complete(
        mut self,
        result: Result<Arc<T>>,
        reject: impl FnOnce() -> Option<Error>,
    ) -> (Result<Arc<T>>, Option<Arc<T>>) {
        let (published, discarded) = {
            let mut map = self.slots.lock();
            match result {
                Ok(conn) => match reject() {
                    Some(err) => {
                        map.remove(&self.name);
                        (Err(err), Some(conn))
                    }
                    None => {
                        map.insert(self.name.clone(), Slot::Ready(conn.clone()));
                        (Ok(conn), None)
                    }
                },
                Err(err) => {
                    map.remove(&self.name);
                    (Err(err), None)
                }
            }
        };
        self.settled = true;
        self.tx.send_replace(Some(published.clone()));
        (published, discarded)
    }
}

impl<T> Drop for Flight<'_, T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut map = self.slots.lock();
        if matches!(map.get(&self.name), Some(Slot::InFlight(_))) {
            map.remove(&self.name);
        }
    }
}
