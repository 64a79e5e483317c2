//! The process-wide swap supervisor.
//!
//! The manager owns one task per monitored swap. Each task maintains a
//! subscription to the counterparty (push transport with reconnect backoff,
//! falling back to polling after repeated failures) and feeds the lifecycle
//! state machine. Completions, failures, actions and transport events fan
//! out over a broadcast bus.

use crate::ark::ArkProvider;
use crate::boltz::CounterpartyApi;
use crate::boltz::SwapUpdate;
use crate::boltz::UpdateStream;
use crate::claim::ClaimEngine;
use crate::config::SwapConfig;
use crate::error::Error;
use crate::events::SwapCompletion;
use crate::events::SwapEvent;
use crate::lifecycle::Lifecycle;
use crate::storage::SwapRepository;
use crate::swap::Swap;
use crate::swap::SwapKind;
use crate::wallet::SwapWallet;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio::sync::watch;
use tokio::task::JoinHandle;

type CompletionResult = Option<Result<SwapCompletion, Error>>;

struct SwapHandle {
    kind: SwapKind,
    join: JoinHandle<()>,
    completion_tx: watch::Sender<CompletionResult>,
    completion_rx: watch::Receiver<CompletionResult>,
}

impl SwapHandle {
    fn is_settled(&self) -> bool {
        self.completion_rx.borrow().is_some()
    }
}

/// Counters reported by [`SwapManager::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapStats {
    pub tracked: usize,
    pub pending_reverse: usize,
    pub pending_submarine: usize,
    pub pending_chain: usize,
}

pub struct SwapManager<C, A, W, R> {
    engine: Arc<ClaimEngine<C, A, W>>,
    repo: Arc<R>,
    events: broadcast::Sender<SwapEvent>,
    swaps: Mutex<HashMap<String, SwapHandle>>,
    stopped: AtomicBool,
}

impl<C, A, W, R> SwapManager<C, A, W, R>
where
    C: CounterpartyApi + 'static,
    A: ArkProvider + 'static,
    W: SwapWallet + 'static,
    R: SwapRepository + 'static,
{
    pub fn new(engine: Arc<ClaimEngine<C, A, W>>, repo: Arc<R>) -> Self {
        let (events, _) = broadcast::channel(256);

        Self {
            engine,
            repo,
            events,
            swaps: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Subscribe to the fleet-wide event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SwapEvent> {
        self.events.subscribe()
    }

    /// Register every non-final swap for monitoring.
    pub fn start(self: &Arc<Self>, initial_swaps: Vec<Swap>) {
        for swap in initial_swaps {
            if swap.is_final() {
                tracing::debug!(
                    swap_id = swap.id(),
                    status = %swap.status(),
                    "Skipping final swap at startup"
                );
                continue;
            }

            if let Err(e) = self.add_swap(swap) {
                tracing::warn!("Failed to monitor swap at startup: {e}");
            }
        }
    }

    /// Start monitoring a swap. No-op when the swap is already tracked.
    pub fn add_swap(self: &Arc<Self>, swap: Swap) -> Result<(), Error> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }

        let swap_id = swap.id().to_string();
        let kind = swap.kind();

        let mut swaps = self.swaps.lock().expect("lock");

        if swaps.contains_key(&swap_id) {
            return Ok(());
        }

        let (completion_tx, completion_rx) = watch::channel(None);

        let manager = Arc::clone(self);
        let task_swap_id = swap_id.clone();
        let task_completion_tx = completion_tx.clone();

        let join = tokio::spawn(async move {
            let lifecycle = Lifecycle {
                engine: Arc::clone(&manager.engine),
                repo: Arc::clone(&manager.repo),
                events: manager.events.clone(),
            };

            let mut updates = manager.monitored_updates(task_swap_id.clone());

            let result = lifecycle.drive(swap, &mut updates).await;

            match &result {
                Ok(completion) => {
                    tracing::info!(
                        swap_id = task_swap_id,
                        status = %completion.status,
                        "Swap completed"
                    );

                    let _ = manager.events.send(SwapEvent::Completed(completion.clone()));
                }
                Err(e) => {
                    tracing::warn!(swap_id = task_swap_id, "Swap failed: {e}");

                    let _ = manager.events.send(SwapEvent::Failed {
                        swap_id: task_swap_id.clone(),
                        error: e.clone(),
                    });
                }
            }

            task_completion_tx.send_replace(Some(result));

            // The swap is settled either way; close its server-side
            // subscription.
            if let Err(e) = manager
                .engine
                .counterparty()
                .unsubscribe(&task_swap_id)
                .await
            {
                tracing::debug!(
                    swap_id = task_swap_id,
                    "Failed to unsubscribe from swap updates: {e}"
                );
            }
        });

        swaps.insert(
            swap_id,
            SwapHandle {
                kind,
                join,
                completion_tx,
                completion_rx,
            },
        );

        Ok(())
    }

    /// Stop monitoring a swap. Pending completion waiters resolve with
    /// [`Error::Cancelled`]. In-flight Ark calls are not interrupted; their
    /// results are discarded.
    pub fn remove_swap(&self, swap_id: &str) {
        let handle = {
            let mut swaps = self.swaps.lock().expect("lock");
            swaps.remove(swap_id)
        };

        if let Some(handle) = handle {
            if !handle.is_settled() {
                handle.completion_tx.send_replace(Some(Err(Error::Cancelled)));
            }

            handle.join.abort();
            self.unsubscribe_later(swap_id.to_string());

            tracing::debug!(swap_id, "Stopped monitoring swap");
        }
    }

    /// Close the counterparty-side subscription of a swap whose task is
    /// gone. Best effort, off the caller's path.
    fn unsubscribe_later(&self, swap_id: String) {
        let counterparty = Arc::clone(self.engine.counterparty());

        tokio::spawn(async move {
            if let Err(e) = counterparty.unsubscribe(&swap_id).await {
                tracing::debug!(swap_id, "Failed to unsubscribe from swap updates: {e}");
            }
        });
    }

    pub fn has_swap(&self, swap_id: &str) -> bool {
        self.swaps.lock().expect("lock").contains_key(swap_id)
    }

    /// Whether any monitored swap is still in flight.
    pub fn is_processing(&self) -> bool {
        self.swaps
            .lock()
            .expect("lock")
            .values()
            .any(|handle| !handle.is_settled())
    }

    /// Ids of swaps still being monitored.
    pub fn pending_swap_ids(&self) -> Vec<String> {
        self.swaps
            .lock()
            .expect("lock")
            .iter()
            .filter(|(_, handle)| !handle.is_settled())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn stats(&self) -> SwapStats {
        let swaps = self.swaps.lock().expect("lock");

        let mut stats = SwapStats {
            tracked: swaps.len(),
            ..SwapStats::default()
        };

        for handle in swaps.values() {
            if handle.is_settled() {
                continue;
            }

            match handle.kind {
                SwapKind::Reverse => stats.pending_reverse += 1,
                SwapKind::Submarine => stats.pending_submarine += 1,
                SwapKind::Chain => stats.pending_chain += 1,
            }
        }

        stats
    }

    /// Wait until the given swap completes, fails, or is cancelled.
    pub async fn wait_for_completion(&self, swap_id: &str) -> Result<SwapCompletion, Error> {
        let mut rx = {
            let swaps = self.swaps.lock().expect("lock");
            let handle = swaps
                .get(swap_id)
                .ok_or_else(|| Error::ad_hoc(format!("swap not monitored: {swap_id}")))?;

            handle.completion_rx.clone()
        };

        loop {
            if let Some(result) = rx.borrow().clone() {
                return result;
            }

            if rx.changed().await.is_err() {
                return Err(Error::Cancelled);
            }
        }
    }

    /// Cancel every subscription and resolve all in-flight waiters with
    /// [`Error::Cancelled`].
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);

        let handles = {
            let mut swaps = self.swaps.lock().expect("lock");
            std::mem::take(&mut *swaps)
        };

        for (swap_id, handle) in handles {
            if !handle.is_settled() {
                handle.completion_tx.send_replace(Some(Err(Error::Cancelled)));
            }

            handle.join.abort();
            self.unsubscribe_later(swap_id.clone());

            tracing::debug!(swap_id, "Cancelled swap subscription");
        }
    }

    /// A status stream that survives transport failures.
    ///
    /// Push subscriptions reconnect with exponential backoff bounded by
    /// `max_reconnect_delay`; after `max_consecutive_ws_failures` the stream
    /// degrades to polling at `poll_interval`. On every (re)connect the
    /// current status is fetched once so transitions missed while offline
    /// are not lost.
    fn monitored_updates(self: &Arc<Self>, swap_id: String) -> UpdateStream {
        let counterparty = Arc::clone(self.engine.counterparty());
        let config = self.engine.config().clone();
        let events = self.events.clone();

        Box::pin(async_stream::stream! {
            let mut failures: u32 = 0;

            loop {
                if failures >= config.max_consecutive_ws_failures {
                    tracing::warn!(swap_id, failures, "Falling back to polling subscription");

                    let mut poll = counterparty.subscribe_poll(&swap_id, config.poll_interval);

                    while let Some(item) = poll.next().await {
                        match item {
                            Ok(update) => yield Ok(update),
                            Err(e) => {
                                tracing::warn!(swap_id, "Polling subscription failed: {e}");
                                break;
                            }
                        }
                    }

                    tokio::time::sleep(config.poll_interval).await;
                    continue;
                }

                match counterparty.subscribe_push(&swap_id).await {
                    Ok(mut stream) => {
                        failures = 0;
                        let _ = events.send(SwapEvent::TransportConnected {
                            swap_id: swap_id.clone(),
                        });

                        // Catch up on whatever happened while not subscribed.
                        match counterparty.get_status(&swap_id).await {
                            Ok(update) => yield Ok(update),
                            Err(e) => {
                                tracing::debug!(swap_id, "Status catch-up failed: {e}");
                            }
                        }

                        while let Some(item) = stream.next().await {
                            match item {
                                Ok(update) => yield Ok(update),
                                Err(e) => {
                                    tracing::warn!(swap_id, "Push subscription dropped: {e}");
                                    break;
                                }
                            }
                        }

                        let _ = events.send(SwapEvent::TransportDisconnected {
                            swap_id: swap_id.clone(),
                        });

                        failures += 1;
                    }
                    Err(e) => {
                        tracing::warn!(swap_id, "Push subscription failed: {e}");
                        failures += 1;
                    }
                }

                let delay = reconnect_delay(&config, failures);
                tokio::time::sleep(delay).await;
            }
        })
    }

    /// Poll the counterparty for the current status of every monitored swap
    /// and hand the transitions to their streams out-of-band.
    ///
    /// Exposed for the caller-facing best-effort re-sync; the per-swap tasks
    /// keep their own subscriptions.
    pub async fn current_statuses(&self) -> Vec<(String, Result<SwapUpdate, Error>)> {
        let ids = self.pending_swap_ids();

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let status = self.engine.counterparty().get_status(&id).await;
            results.push((id, status));
        }

        results
    }
}

fn reconnect_delay(config: &SwapConfig, failures: u32) -> std::time::Duration {
    let exponent = failures.saturating_sub(1).min(16);
    let delay = config.reconnect_base_delay.saturating_mul(1 << exponent);

    delay.min(config.max_reconnect_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_delay_backs_off_exponentially_and_caps() {
        let config = SwapConfig::default();

        assert_eq!(reconnect_delay(&config, 1), config.reconnect_base_delay);
        assert_eq!(
            reconnect_delay(&config, 2),
            config.reconnect_base_delay * 2
        );
        assert_eq!(
            reconnect_delay(&config, 3),
            config.reconnect_base_delay * 4
        );
        assert_eq!(reconnect_delay(&config, 30), config.max_reconnect_delay);
    }
}
