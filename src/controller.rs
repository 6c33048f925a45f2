use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::phase::{AtomicPhase, Phase};
use crate::storage::{BlockingQueue, QueueStats};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControllerStats {
    pub phase: Phase,
    pub transitions: u64,
    pub running: bool,
    pub queue: QueueStats,
}

/// State shared with the cycling thread.
struct Shared {
    phase: AtomicPhase,
    queue: BlockingQueue<Phase>,
    transitions: AtomicU64,
    stop: AtomicBool,
}

/// Traffic light that cycles Red/Green on a background thread and publishes
/// each new phase to a blocking queue.
///
/// The light starts `Red`. [`simulate`](Self::simulate) starts the cycling
/// thread; [`stop`](Self::stop) or dropping the controller cancels and joins
/// it.
pub struct PhaseController {
    shared: Arc<Shared>,
    config: ControllerConfig,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PhaseController {
    /// Controller with the default 4-6 s phase timing.
    pub fn new() -> Self {
        Self::build(ControllerConfig::default())
    }

    pub fn with_config(config: ControllerConfig) -> Result<Self, ControllerError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ControllerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                phase: AtomicPhase::new(Phase::Red),
                queue: BlockingQueue::with_config(config.queue),
                transitions: AtomicU64::new(0),
                stop: AtomicBool::new(false),
            }),
            config,
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Snapshot of the current phase. Never blocks.
    pub fn current_phase(&self) -> Phase {
        self.shared.phase.load()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Block until a `Green` phase is received from the queue.
    pub fn wait_for_green(&self) {
        self.wait_for_phase(Phase::Green);
    }

    /// Block until `target` is received from the queue, discarding any other
    /// phase received meanwhile. Concurrent waiters compete for the same
    /// notifications.
    pub fn wait_for_phase(&self, target: Phase) {
        loop {
            std::thread::sleep(self.config.poll_interval);
            let phase = self.shared.queue.receive();
            if phase == target {
                return;
            }
            trace!(%phase, %target, "discarded phase notification");
        }
    }

    /// Like [`wait_for_green`](Self::wait_for_green) but gives up after
    /// `timeout`. Returns whether a green phase was received.
    pub fn wait_for_green_timeout(&self, timeout: Duration) -> bool {
        self.wait_for_phase_timeout(Phase::Green, timeout)
    }

    /// A timeout too large to express as a deadline waits like
    /// [`wait_for_phase`](Self::wait_for_phase).
    pub fn wait_for_phase_timeout(&self, target: Phase, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait_for_phase(target);
            return true;
        };
        loop {
            std::thread::sleep(self.config.poll_interval);
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.shared.queue.receive_timeout(remaining) {
                Some(phase) if phase == target => return true,
                Some(phase) => trace!(%phase, %target, "discarded phase notification"),
                None => return false,
            }
        }
    }

    /// Start the cycling thread and return immediately.
    ///
    /// Fails with [`ControllerError::AlreadyRunning`] if cycling has already
    /// been started and not stopped since.
    pub fn simulate(&self) -> Result<(), ControllerError> {
        // Held until the handle is stored so `stop` never sees a half-started task.
        let mut tasks = self.tasks.lock();
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(ControllerError::AlreadyRunning);
        }
        self.shared.stop.store(false, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let handle = std::thread::Builder::new()
            .name("phase-cycler".to_string())
            .spawn(move || cycle_through_phases(&shared, &config))
            .map_err(|err| {
                self.running.store(false, Ordering::Release);
                ControllerError::SpawnFailed(err)
            })?;
        tasks.push(handle);
        Ok(())
    }

    /// Cancel the cycling thread and wait for it to exit. The phase keeps its
    /// last value and cycling may be started again with `simulate`.
    pub fn stop(&self) {
        let mut tasks = self.tasks.lock();
        self.shared.stop.store(true, Ordering::Release);
        for handle in tasks.drain(..) {
            if handle.join().is_err() {
                warn!("phase cycling thread panicked");
            }
        }
        self.running.store(false, Ordering::Release);
    }

    pub fn stats(&self) -> ControllerStats {
        ControllerStats {
            phase: self.current_phase(),
            transitions: self.shared.transitions.load(Ordering::Relaxed),
            running: self.is_running(),
            queue: self.shared.queue.stats(),
        }
    }
}

impl Default for PhaseController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PhaseController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn draw_cycle_duration<R: Rng>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    if min >= max {
        return max;
    }
    Duration::from_secs_f64(rng.gen_range(min.as_secs_f64()..=max.as_secs_f64()))
}

fn cycle_through_phases(shared: &Shared, config: &ControllerConfig) {
    let mut rng = rand::thread_rng();
    let mut cycle_duration = draw_cycle_duration(&mut rng, config.cycle_min, config.cycle_max);
    let mut last_flip = Instant::now();
    info!(?cycle_duration, "phase cycling started");

    while !shared.stop.load(Ordering::Acquire) {
        std::thread::sleep(config.poll_interval);

        let elapsed = last_flip.elapsed();
        if elapsed < cycle_duration {
            continue;
        }

        let phase = shared.phase.flip();
        shared.transitions.fetch_add(1, Ordering::Relaxed);
        shared.queue.send(phase);
        debug!(%phase, ?elapsed, ?cycle_duration, "phase changed");
        last_flip = Instant::now();

        if config.redraw_each_cycle {
            cycle_duration = draw_cycle_duration(&mut rng, config.cycle_min, config.cycle_max);
        }
    }

    info!(
        transitions = shared.transitions.load(Ordering::Relaxed),
        "phase cycling stopped"
    );
}
