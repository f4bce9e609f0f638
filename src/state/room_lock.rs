use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub(crate) type RoomGates = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Exclusive hold on the room record `room_id`.
///
/// Releasing the last hold on a room also forgets its gate, so rooms that are gone or
/// finished leave nothing behind.
pub struct RoomLock {
    room_id: String,
    gates: RoomGates,
    gate: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl RoomLock {
    pub(crate) async fn acquire(gates: &RoomGates, room_id: &str) -> Self {
        let gate = gates.entry(room_id.to_owned()).or_default().clone();
        let guard = gate.clone().lock_owned().await;
        Self {
            room_id: room_id.to_owned(),
            gates: gates.clone(),
            gate,
            guard: Some(guard),
        }
    }

    /// Room this lock serializes.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }
}

impl Drop for RoomLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        // the map and this lock are the only owners: nobody waits on the gate
        self.gates.remove_if(&self.room_id, |_, gate| {
            Arc::ptr_eq(gate, &self.gate) && Arc::strong_count(gate) == 2
        });
    }
}
