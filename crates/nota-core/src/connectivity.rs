//! Connectivity Monitor: tracks the online/offline boundary and hands the
//! offline→online edge to the sync engine.

use std::cell::Cell;

use tracing::info;

use crate::{
    Error, KeyValueStore, NoteService, Reachability, ReconcileOutcome, SyncEngine, SyncEvent,
};

pub struct ConnectivityMonitor<'e, R, S> {
    engine: &'e SyncEngine<R, S>,
    online: Cell<bool>,
}

impl<'e, R: NoteService, S: KeyValueStore> ConnectivityMonitor<'e, R, S> {
    pub fn new(engine: &'e SyncEngine<R, S>, initially_online: bool) -> Self {
        Self {
            engine,
            online: Cell::new(initially_online),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.get()
    }

    /// Record an observation of the connection state.
    ///
    /// Repeating the current state is a no-op. A change emits exactly one
    /// [`SyncEvent::ConnectivityChanged`]; going online also runs one
    /// reconciliation, whose outcome is returned.
    pub async fn set_online(&self, online: bool) -> Result<Option<ReconcileOutcome>, Error> {
        if self.online.replace(online) == online {
            return Ok(None);
        }
        info!(online, "connectivity changed");
        self.engine.emit(SyncEvent::ConnectivityChanged { online });

        if !online {
            return Ok(None);
        }
        self.engine.sync_pending_changes().await.map(Some)
    }

    /// Ask `probe` whether the server answers and feed the result in.
    pub async fn poll<P: Reachability>(
        &self,
        probe: &P,
    ) -> Result<Option<ReconcileOutcome>, Error> {
        let reachable = probe.is_reachable().await;
        self.set_online(reachable).await
    }
}
