//! # Driver
//! Spawns worker threads that hammer a [ResourceManager] with request/release cycles
//! and records what they did into a [Trace].
//!
//! Everything a run needs (seed, worker ids, the trace) lives in a [RunContext],
//! so runs don't share any hidden state and can go in parallel.

use std::{
    sync::Arc,
    thread::{self, sleep},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    error::Result,
    manager::{Priority, ResourceManager},
    trace::{Event, EventKind, Trace},
};

/// Spacing between the seeds of consecutive workers.
const SEED_STEP: u64 = 46856;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub a_workers: usize,
    pub b_workers: usize,
    pub rounds: usize,
    /// upper bound of the pause before each request
    pub max_think: Duration,
    /// upper bound of how long the resource is held
    pub max_use: Duration,
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            a_workers: 2,
            b_workers: 1,
            rounds: 100,
            max_think: Duration::from_millis(100),
            max_use: Duration::from_millis(300),
            seed: clock_seed(),
        }
    }
}

pub fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

/// Per-run state handed to every worker.
pub struct RunContext {
    next_id: usize,
    next_seed: u64,
    manager: Arc<ResourceManager>,
    trace: Arc<Trace>,
}

impl RunContext {
    pub fn new(seed: u64, manager: Arc<ResourceManager>) -> Self {
        Self {
            next_id: 1,
            next_seed: seed,
            manager,
            trace: Arc::new(Trace::new()),
        }
    }

    pub fn trace(&self) -> &Arc<Trace> {
        &self.trace
    }

    /// Creates the next worker with its own id and RNG stream.
    pub fn worker(&mut self, priority: Priority) -> Worker {
        let worker = Worker {
            id: self.next_id,
            priority,
            rng: StdRng::seed_from_u64(self.next_seed),
            manager: self.manager.clone(),
            trace: self.trace.clone(),
        };
        self.next_id += 1;
        self.next_seed = self.next_seed.wrapping_add(SEED_STEP);
        worker
    }
}

pub struct Worker {
    id: usize,
    priority: Priority,
    rng: StdRng,
    manager: Arc<ResourceManager>,
    trace: Arc<Trace>,
}

impl Worker {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    fn pause(&mut self, max: Duration) {
        if max.is_zero() {
            return;
        }
        sleep(self.rng.gen_range(Duration::ZERO..max));
    }

    /// One request-use-release cycle.
    pub fn cycle(&mut self, max_think: Duration, max_use: Duration) -> Result<()> {
        let (id, priority) = (self.id, self.priority);
        self.pause(max_think);

        let trace = &self.trace;
        self.manager
            .request_with(priority, &mut || trace.record(priority, id, EventKind::Req))?;
        self.trace.record(priority, id, EventKind::Use);

        self.pause(max_use);

        let trace = &self.trace;
        self.manager
            .release_with(&mut || trace.record(priority, id, EventKind::Rel))
    }

    pub fn run(mut self, config: &RunConfig) -> Result<()> {
        debug!("worker {}-{} starts", self.priority, self.id);
        for _ in 0..config.rounds {
            self.cycle(config.max_think, config.max_use)?;
        }
        debug!("worker {}-{} is done", self.priority, self.id);
        Ok(())
    }
}

/// Runs all the workers of `config` to completion and returns what they recorded.
///
/// # Panics
/// If a worker thread can't be spawned or panics.
pub fn run(config: &RunConfig) -> Result<Vec<Event>> {
    info!(
        "running {} A and {} B workers, {} rounds each, seed {}",
        config.a_workers, config.b_workers, config.rounds, config.seed
    );
    let mut ctx = RunContext::new(config.seed, Arc::new(ResourceManager::new()));
    let workers: Vec<Worker> = (0..config.a_workers)
        .map(|_| Priority::A)
        .chain((0..config.b_workers).map(|_| Priority::B))
        .map(|p| ctx.worker(p))
        .collect();

    thread::scope(|s| {
        let handles: Vec<_> = workers
            .into_iter()
            .map(|w| {
                thread::Builder::new()
                    .name(format!("{}-{}", w.priority(), w.id()))
                    .spawn_scoped(s, move || w.run(config))
                    .expect("failed to spawn a worker")
            })
            .collect();
        handles
            .into_iter()
            .try_for_each(|h| h.join().expect("worker panicked"))
    })?;

    let events = ctx.trace.events();
    info!("run finished with {} events", events.len());
    Ok(events)
}
