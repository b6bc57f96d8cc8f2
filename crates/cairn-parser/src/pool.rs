//! Worker pool for parsing many source units
//!
//! Parsing is synchronous and CPU-bound, so units are handed to a fixed set of
//! worker threads over a channel. Callers either block on a result or await it
//! from async code through `spawn_blocking`.

use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use cairn_core::TypeRegistry;

use crate::error::ParseError;
use crate::parser::{ParseOutcome, ParsedUnit, SourceUnit, parse_unit};

/// One unit to parse, with the registry of the session it belongs to.
#[derive(Clone)]
pub struct ParseRequest {
    pub unit: SourceUnit,
    pub registry: Arc<TypeRegistry>,
}

type UnitResult = std::result::Result<ParsedUnit, ParseError>;

/// A request plus the channel its result goes back on.
struct WorkerRequest {
    request: ParseRequest,
    response_sender: Sender<UnitResult>,
}

/// Thread-backed parser pool. Cloning shares the same workers.
#[derive(Clone)]
pub struct ParserPool {
    sender: Sender<WorkerRequest>,
    workers: usize,
}

impl ParserPool {
    /// Spawns `num_workers` threads (at least one).
    pub fn new(num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        let (sender, receiver) = channel::<WorkerRequest>();
        let receiver = Arc::new(Mutex::new(receiver));

        for worker in 0..num_workers {
            let receiver = receiver.clone();
            std::thread::spawn(move || Self::run_worker(worker, receiver));
        }

        Self {
            sender,
            workers: num_workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn run_worker(worker: usize, receiver: Arc<Mutex<Receiver<WorkerRequest>>>) {
        tracing::debug!(worker, "parse worker up");

        loop {
            let next = match receiver.lock() {
                Ok(guard) => guard.recv(),
                Err(_) => break,
            };
            let Ok(WorkerRequest {
                request,
                response_sender,
            }) = next
            else {
                break;
            };

            let ParseRequest { unit, registry } = request;
            let result = parse_unit(&unit.content, &unit.origin, &registry);
            if response_sender.send(result).is_err() {
                tracing::warn!(origin = %unit.origin, "caller dropped before its parse result arrived");
            }
        }
        tracing::debug!(worker, "parse worker exiting, channel closed");
    }

    fn submit(sender: &Sender<WorkerRequest>, request: ParseRequest) -> Result<Receiver<UnitResult>> {
        let (response_sender, response_receiver) = channel();
        sender
            .send(WorkerRequest {
                request,
                response_sender,
            })
            .map_err(|_| anyhow::anyhow!("parser pool has no workers left"))?;
        Ok(response_receiver)
    }

    /// Parse one unit, blocking the current thread until it is done.
    ///
    /// The outer error is a pool failure; the inner one a syntax error.
    pub fn parse_blocking(&self, request: ParseRequest) -> Result<UnitResult> {
        let receiver = Self::submit(&self.sender, request)?;
        receiver.recv().map_err(|_| anyhow::anyhow!("parse worker exited without answering"))
    }

    /// Parse one unit from async code.
    pub async fn parse(&self, request: ParseRequest) -> Result<UnitResult> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.parse_blocking(request))
            .await
            .map_err(|e| anyhow::anyhow!("parse task failed: {e}"))?
    }

    /// Parse every unit of one session across the workers. Results are
    /// collected in origin order, so the outcome does not depend on which
    /// worker finished first.
    pub fn parse_all_blocking(&self, mut units: Vec<SourceUnit>, registry: Arc<TypeRegistry>) -> Result<ParseOutcome> {
        units.sort_by(|a, b| a.origin.cmp(&b.origin));
        let pending = units
            .into_iter()
            .map(|unit| {
                Self::submit(
                    &self.sender,
                    ParseRequest {
                        unit,
                        registry: registry.clone(),
                    },
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let mut outcome = ParseOutcome::default();
        for receiver in pending {
            let result = receiver
                .recv()
                .map_err(|_| anyhow::anyhow!("parse worker exited without answering"))?;
            outcome.push(result);
        }
        tracing::info!(
            fragments = outcome.fragments.len(),
            errors = outcome.errors.len(),
            "Parsed source units"
        );
        Ok(outcome)
    }

    pub async fn parse_all(&self, units: Vec<SourceUnit>, registry: Arc<TypeRegistry>) -> Result<ParseOutcome> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.parse_all_blocking(units, registry))
            .await
            .map_err(|e| anyhow::anyhow!("parse task failed: {e}"))?
    }
}

/// Pool sized to the available parallelism, never fewer than two workers.
pub fn create_parser_pool() -> ParserPool {
    let workers = std::thread::available_parallelism().map_or(2, |n| n.get().max(2));
    ParserPool::new(workers)
}
