//! Transaction coordinator (C3, spec.md §4.1). `begin`/`commit`/`rollback`
//! issue raw SQL over the writer's long-held connection rather than a
//! `rusqlite::Transaction<'conn>` borrow, since the rest of the crate holds
//! that connection across many `spawn_blocking` hops (§5; teacher's
//! `PooledConnection`). Single-writer `bb8` pool sizing is what actually
//! makes this safe, not any locking done here.

use crate::connection::PooledConnection;
use crate::contact::ContactId;
use crate::error::StoreError;
use crate::external::NotificationSink;

/// The three insertion-ordered id lists accumulated over one transaction's
/// lifetime. Lives on `ContactWriter` behind a `tokio::sync::Mutex` so nested
/// (reentrant) orchestrator calls can record into the same outstanding
/// transaction without threading it through every call (spec.md §5).
#[derive(Debug, Default)]
pub struct TxnState {
    pub added: Vec<ContactId>,
    pub changed: Vec<ContactId>,
    pub removed: Vec<ContactId>,
}

impl TxnState {
    pub fn record_added(&mut self, id: ContactId) {
        if !self.added.contains(&id) {
            self.added.push(id);
        }
    }

    pub fn record_changed(&mut self, id: ContactId) {
        if !self.added.contains(&id) && !self.changed.contains(&id) {
            self.changed.push(id);
        }
    }

    pub fn record_removed(&mut self, id: ContactId) {
        self.added.retain(|x| *x != id);
        self.changed.retain(|x| *x != id);
        if !self.removed.contains(&id) {
            self.removed.push(id);
        }
    }

    fn take(&mut self) -> (Vec<ContactId>, Vec<ContactId>, Vec<ContactId>) {
        (std::mem::take(&mut self.removed), std::mem::take(&mut self.changed), std::mem::take(&mut self.added))
    }
}

pub async fn begin(conn: &PooledConnection) -> Result<(), StoreError> { conn.with_connection(|c| c.execute_batch("BEGIN IMMEDIATE").map_err(StoreError::from)).await }

/// Commits the SQL transaction, then publishes the accumulated id lists to
/// `notifier` in order {removed, changed, added} (spec.md §5) and clears them.
pub async fn commit(conn: &PooledConnection, state: &mut TxnState, notifier: &dyn NotificationSink) -> Result<(), StoreError> {
    conn.with_connection(|c| c.execute_batch("COMMIT").map_err(StoreError::from)).await?;
    let (removed, changed, added) = state.take();
    if !removed.is_empty() {
        notifier.contacts_removed(removed).await;
    }
    if !changed.is_empty() {
        notifier.contacts_changed(changed).await;
    }
    if !added.is_empty() {
        notifier.contacts_added(added).await;
    }
    Ok(())
}

/// Rolls back the SQL transaction and discards the accumulated id lists
/// without publishing them (spec.md §4.1).
pub async fn rollback(conn: &PooledConnection, state: &mut TxnState) -> Result<(), StoreError> {
    conn.with_connection(|c| c.execute_batch("ROLLBACK").map_err(StoreError::from)).await?;
    state.take();
    Ok(())
}
