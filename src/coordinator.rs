//! Debounced refresh coordination.
//!
//! The coordinator receives change signals from the analyzers and the
//! profile settings, coalesces bursts of metric changes with a trailing
//! debounce, invalidates the affected caches and tells subscribers once
//! per coalesced change that the radar should be rebuilt.
//!
//! State machine:
//!
//! ```text
//!            metric change                 timer expiry
//!   Idle ─────────────────────▶ Debouncing ─────────────▶ Dispatching ─▶ Idle
//!     │                          │  ▲  metric change
//!     │ profile / manual / view  │  └── resets the timer
//!     └──────────────────────────┴──────────────────────▶ Dispatching ─▶ Idle
//! ```
//!
//! Debounce timers run as Tokio tasks. Outside a Tokio runtime there is
//! no timer to arm, so metric changes are dispatched immediately instead.

use crate::analysis::{MetricAggregator, TargetMapper};
use crate::models::{HandleOutcome, RefreshNotification, UpdateTrigger};
use crate::providers::CapabilityGate;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Quiet period after the last metric change before a refresh goes out.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Settings for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub debounce: Duration,
    /// Buffered notifications per subscriber before the slowest lags.
    pub notification_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            notification_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    Idle,
    Debouncing,
    Dispatching,
}

struct PendingBurst {
    trigger: UpdateTrigger,
    /// First event of the burst.
    received_at: DateTime<Utc>,
    timer: JoinHandle<()>,
}

struct CoordinatorState {
    listening: bool,
    phase: CoordinatorPhase,
    pending: Option<PendingBurst>,
    /// Bumped whenever a pending timer becomes obsolete.
    epoch: u64,
}

struct Inner {
    config: CoordinatorConfig,
    aggregator: Arc<MetricAggregator>,
    mapper: Arc<TargetMapper>,
    gate: Arc<dyn CapabilityGate>,
    state: Mutex<CoordinatorState>,
    tx: broadcast::Sender<RefreshNotification>,
}

/// Coalesces change signals into refresh notifications.
#[derive(Clone)]
pub struct UpdateCoordinator {
    inner: Arc<Inner>,
}

impl UpdateCoordinator {
    /// Create a coordinator. It starts out not listening.
    pub fn new(
        config: CoordinatorConfig,
        aggregator: Arc<MetricAggregator>,
        mapper: Arc<TargetMapper>,
        gate: Arc<dyn CapabilityGate>,
    ) -> Self {
        let (tx, _) = broadcast::channel(config.notification_capacity.max(1));
        info!(
            "Update coordinator initialized (debounce {}ms)",
            config.debounce.as_millis()
        );

        Self {
            inner: Arc::new(Inner {
                config,
                aggregator,
                mapper,
                gate,
                state: Mutex::new(CoordinatorState {
                    listening: false,
                    phase: CoordinatorPhase::Idle,
                    pending: None,
                    epoch: 0,
                }),
                tx,
            }),
        }
    }

    pub fn start_listening(&self) {
        let mut state = self.inner.lock_state();
        state.listening = true;
        debug!("Coordinator listening");
    }

    /// Stop processing triggers. A pending burst is abandoned.
    pub fn stop_listening(&self) {
        let mut state = self.inner.lock_state();
        state.listening = false;
        if let Some(pending) = state.pending.take() {
            pending.timer.abort();
            debug!("Abandoned pending {} burst", pending.trigger);
        }
        state.epoch = state.epoch.wrapping_add(1);
        state.phase = CoordinatorPhase::Idle;
        debug!("Coordinator stopped listening");
    }

    pub fn is_listening(&self) -> bool {
        self.inner.lock_state().listening
    }

    pub fn phase(&self) -> CoordinatorPhase {
        self.inner.lock_state().phase
    }

    /// Register a subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshNotification> {
        self.inner.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.tx.receiver_count()
    }

    /// Feed one trigger into the state machine.
    ///
    /// Never panics. Called outside a Tokio runtime, a metric change
    /// skips the debounce window and is dispatched right away.
    pub fn handle(&self, trigger: UpdateTrigger) -> HandleOutcome {
        if !self.inner.gate.is_enabled() {
            debug!("Ignoring {}: radar capability not enabled", trigger);
            return HandleOutcome::Denied;
        }

        let mut state = self.inner.lock_state();
        if !state.listening {
            debug!("Dropping {}: not listening", trigger);
            return HandleOutcome::Dropped;
        }

        let now = Utc::now();

        let runtime = if trigger.is_debounced() {
            match Handle::try_current() {
                Ok(runtime) => Some(runtime),
                Err(_) => {
                    warn!(
                        "No Tokio runtime for the debounce timer, dispatching {} now",
                        trigger
                    );
                    None
                }
            }
        } else {
            None
        };

        if let Some(runtime) = runtime {
            let received_at = match state.pending.take() {
                Some(pending) => {
                    pending.timer.abort();
                    pending.received_at
                }
                None => now,
            };

            state.epoch = state.epoch.wrapping_add(1);
            let epoch = state.epoch;
            let inner = Arc::clone(&self.inner);
            let window = self.inner.config.debounce;
            let deadline = tokio::time::Instant::now() + window;
            let timer = runtime.spawn(async move {
                tokio::time::sleep_until(deadline).await;
                inner.on_timer(epoch);
            });

            debug!("Debouncing {} ({}ms window)", trigger, window.as_millis());
            state.pending = Some(PendingBurst {
                trigger,
                received_at,
                timer,
            });
            state.phase = CoordinatorPhase::Debouncing;
            return HandleOutcome::Debouncing;
        }

        // Immediate triggers absorb any pending burst.
        let absorbed = match state.pending.take() {
            Some(pending) => {
                pending.timer.abort();
                debug!("{} absorbs pending {} burst", trigger, pending.trigger);
                true
            }
            None => false,
        };
        state.epoch = state.epoch.wrapping_add(1);

        self.inner.dispatch(&mut state, trigger, true, now, absorbed);
        HandleOutcome::Dispatched
    }

    /// Handle triggers from a channel until it closes.
    pub fn listen(&self, mut rx: mpsc::Receiver<UpdateTrigger>) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            while let Some(trigger) = rx.recv().await {
                coordinator.handle(trigger);
            }
            debug!("Trigger channel closed");
        })
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        // The state stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn on_timer(&self, epoch: u64) {
        let mut state = self.lock_state();
        if state.epoch != epoch || !state.listening {
            return;
        }
        let Some(pending) = state.pending.take() else {
            return;
        };

        if !self.gate.is_enabled() {
            debug!("Dropping {} burst: radar capability not enabled", pending.trigger);
            state.phase = CoordinatorPhase::Idle;
            return;
        }

        self.dispatch(&mut state, pending.trigger, false, pending.received_at, false);
    }

    /// Invalidate caches for `trigger` and notify subscribers.
    ///
    /// Invalidation failures are logged; the notification goes out regardless.
    fn dispatch(
        &self,
        state: &mut CoordinatorState,
        trigger: UpdateTrigger,
        was_immediate: bool,
        received_at: DateTime<Utc>,
        include_metrics: bool,
    ) {
        state.phase = CoordinatorPhase::Dispatching;

        if include_metrics || trigger.invalidates_metrics() {
            if let Err(e) = self.aggregator.invalidate_cache() {
                warn!("Failed to invalidate metric snapshot: {}", e);
            }
        }

        let targets = match &trigger {
            UpdateTrigger::ProfileChanged {
                profile_id: Some(id),
            } => Some(self.mapper.invalidate_cache(id)),
            UpdateTrigger::ProfileChanged { profile_id: None } | UpdateTrigger::ManualRefresh => {
                Some(self.mapper.invalidate_all_caches())
            }
            _ => None,
        };
        if let Some(Err(e)) = targets {
            warn!("Failed to invalidate target overlay: {}", e);
        }

        let notification = RefreshNotification {
            trigger,
            was_immediate,
            received_at,
            dispatched_at: Utc::now(),
        };

        let label = notification.trigger.to_string();
        match self.tx.send(notification) {
            Ok(count) => info!("Dispatched {} refresh to {} subscribers", label, count),
            Err(_) => debug!("Dispatched {} refresh with no subscribers", label),
        }

        state.phase = CoordinatorPhase::Idle;
    }
}
