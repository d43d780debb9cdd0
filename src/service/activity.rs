//! Debounced "last active" tracking.
//!
//! [`ActivityTracker::touch`] sets a per-account marker in the cache with the
//! debounce window as its TTL. Only the call that creates the marker queues a
//! durable write, so each account is written at most once per window. Writes
//! are executed by [`LastActiveWriter`], a long-lived task that owns its own
//! cancellation token and is unaffected by request cancellation.

use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{repo::accounts::AccountsRepo, service::cache::MarkerCache};

const LAST_ACTIVE_KEY: &str = "last-active";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LastActiveWrite {
    pub account_id: Uuid,
    pub at: DateTime<Utc>,
}

pub fn write_queue(
    capacity: usize,
) -> (mpsc::Sender<LastActiveWrite>, mpsc::Receiver<LastActiveWrite>) {
    mpsc::channel(capacity.max(1))
}

pub struct ActivityTracker {
    cache: Arc<dyn MarkerCache>,
    writes: mpsc::Sender<LastActiveWrite>,
    window: Duration,
    key_prefix: String,
}

impl ActivityTracker {
    pub fn new(
        cache: Arc<dyn MarkerCache>,
        writes: mpsc::Sender<LastActiveWrite>,
        window: Duration,
        key_prefix: String,
    ) -> Self {
        Self {
            cache,
            writes,
            window,
            key_prefix,
        }
    }

    fn key(&self, account_id: Uuid) -> String {
        format!("{}:{}:{}", self.key_prefix, LAST_ACTIVE_KEY, account_id)
    }

    /// Best effort. Never fails and never waits for the durable write.
    pub async fn touch(&self, account_id: Uuid) {
        let key = self.key(account_id);
        let first_in_window = match self.cache.set_if_absent(&key, "active", self.window).await {
            Ok(value) => value,
            Err(err) => {
                error!(%account_id, error = %err, "failed to set last-active marker");
                return;
            }
        };

        if !first_in_window {
            debug!(%account_id, "last-active already recorded in this window");
            return;
        }

        let write = LastActiveWrite {
            account_id,
            at: Utc::now(),
        };
        match self.writes.try_send(write) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(%account_id, "last-active write queue is full; dropping update");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(%account_id, "last-active writer has stopped; dropping update");
            }
        }
    }
}

pub struct LastActiveWriter {
    accounts: Arc<dyn AccountsRepo>,
    writes: mpsc::Receiver<LastActiveWrite>,
    shutdown: CancellationToken,
}

impl LastActiveWriter {
    pub fn new(
        accounts: Arc<dyn AccountsRepo>,
        writes: mpsc::Receiver<LastActiveWrite>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            accounts,
            writes,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Processes writes until cancelled, then drains whatever is already queued.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                write = self.writes.recv() => match write {
                    Some(write) => self.apply(write).await,
                    None => return,
                },
            }
        }

        self.writes.close();
        let mut drained = 0usize;
        while let Some(write) = self.writes.recv().await {
            self.apply(write).await;
            drained += 1;
        }
        info!(drained, "last-active writer stopped");
    }

    async fn apply(&self, write: LastActiveWrite) {
        if let Err(err) = self
            .accounts
            .update_last_active_at(write.account_id, write.at)
            .await
        {
            error!(
                account_id = %write.account_id,
                error = %err,
                "failed to update last active time"
            );
        }
    }
}
