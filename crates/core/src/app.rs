//! Application wiring: owned registries, explicit references
//!
//! All state lives in one [`App`] value constructed at startup - no process
//! globals. Components receive explicit `Arc`s, so tests build one app each
//! with scripted collaborators and throw it away.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::audio::{AudioConverter, PcmConverter};
use crate::clock::Clock;
use crate::config::Config;
use crate::detect::{VadDetector, WakewordDetector};
use crate::error::Result;
use crate::provider::{ProviderFactory, ProviderPool};
use crate::queue::AudioQueue;
use crate::recording::{RecordingService, WavRecorder};
use crate::store::{
    expired_session_ids, Action, ActionRole, ReducerContext, StateChange, Store, StoreState,
};
use crate::timer::TimerService;
use crate::coordinator::SessionCoordinator;

/// The swappable leaves the core drives. Model implementations and engines
/// live outside this crate.
pub struct Collaborators {
    /// Wake-word model
    pub wakeword: Arc<dyn WakewordDetector>,
    /// VAD model
    pub vad: Arc<dyn VadDetector>,
    /// Builds pooled ASR provider instances
    pub provider_factory: ProviderFactory,
    /// Format converter override; defaults to [`PcmConverter`]
    pub converter: Option<Arc<dyn AudioConverter>>,
    /// Recording service override; defaults to [`WavRecorder`]
    pub recorder: Option<Arc<dyn RecordingService>>,
    /// Clock override for deterministic tests; defaults to monotonic
    pub clock: Option<Clock>,
}

/// One running ASRHub core: store, queue, pool, timers, coordinator, and
/// the expiry sweep. Construct inside a tokio runtime.
pub struct App {
    store: Arc<Store>,
    queue: Arc<AudioQueue>,
    pool: Arc<ProviderPool>,
    timers: TimerService,
    clock: Clock,
    config: Arc<Config>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl App {
    /// Validate the config, build every component, and start the
    /// coordinator and expiry-sweep tasks.
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Arc<Self>> {
        config.validate()?;
        let config = Arc::new(config);

        let clock = collaborators.clock.unwrap_or_else(Clock::monotonic);
        let session_ttl = chrono::Duration::milliseconds((config.session.ttl * 1000.0) as i64);
        let store = Store::new(ReducerContext { session_ttl });
        let queue = Arc::new(AudioQueue::new(clock.clone(), &config.queue));
        let pool = Arc::new(ProviderPool::new(
            config.pool.size,
            collaborators.provider_factory,
        )?);
        let timers = TimerService::new();

        let recorder: Arc<dyn RecordingService> = match collaborators.recorder {
            Some(recorder) => recorder,
            None => Arc::new(WavRecorder::new(queue.clone(), &config.recording)?),
        };
        let converter: Arc<dyn AudioConverter> = collaborators
            .converter
            .unwrap_or_else(|| Arc::new(PcmConverter));

        // Subscribe before anything can dispatch so the coordinator sees
        // every action from the first one on.
        let changes = store.subscribe();
        let coordinator = SessionCoordinator::new(
            store.clone(),
            queue.clone(),
            pool.clone(),
            timers.clone(),
            recorder,
            converter,
            collaborators.wakeword,
            collaborators.vad,
            config.clone(),
            clock.clone(),
        );
        let coordinator_task = tokio::spawn(coordinator.run(changes));

        let app = Arc::new(Self {
            store,
            queue,
            pool,
            timers,
            clock,
            config,
            tasks: parking_lot::Mutex::new(vec![coordinator_task]),
        });

        let sweep_task = tokio::spawn(Self::expiry_sweep(
            app.store.clone(),
            app.config.session.expiry_sweep_interval,
        ));
        app.tasks.lock().push(sweep_task);

        tracing::info!("ASRHub core started");
        Ok(app)
    }

    /// Periodically reclaim sessions whose TTL elapsed.
    async fn expiry_sweep(store: Arc<Store>, interval_secs: f64) {
        let period = Duration::from_secs_f64(interval_secs.max(0.001));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // immediate first tick
        loop {
            ticker.tick().await;
            for session_id in expired_session_ids(&store.state(), Utc::now()) {
                tracing::info!("Session {} expired", session_id);
                let _ = store.dispatch(Action::SessionExpired { session_id });
            }
        }
    }

    /// Enqueue an action.
    pub fn dispatch(&self, action: Action) -> Result<()> {
        self.store.dispatch(action)
    }

    /// Current immutable state snapshot.
    pub fn state(&self) -> Arc<StoreState> {
        self.store.state()
    }

    /// Subscribe to every state change.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.store.subscribe()
    }

    /// Subscribe to Output-role actions only - the feed transports publish
    /// to clients (`transcribe_done`, `play_asr_feedback`, `error_reported`).
    pub fn subscribe_outputs(&self) -> mpsc::UnboundedReceiver<Action> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut changes = self.store.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        if change.action.kind().role() == ActionRole::Output
                            && tx.send(change.action).is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Output subscriber lagged by {}", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.tasks.lock().push(task);
        rx
    }

    /// The timestamped audio queue.
    pub fn queue(&self) -> &Arc<AudioQueue> {
        &self.queue
    }

    /// The provider pool.
    pub fn pool(&self) -> &Arc<ProviderPool> {
        &self.pool
    }

    /// The per-session timer service.
    pub fn timers(&self) -> &TimerService {
        &self.timers
    }

    /// The monotonic clock shared by queue and coordinator.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// The validated configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop the dispatcher and every background task.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down ASRHub core");
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.store.shutdown();
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.shutdown();
    }
}
