//! Simulated progress stream for a collection run.
//!
//! The emitter is a pull-based state machine: each [`ProgressEmitter::next`]
//! call first serves the delay owed by the previous search event, then produces
//! exactly one event. Nothing runs between calls, so a consumer that stops
//! pulling (or drops the emitter) stops all work. Counts are cosmetic and are
//! not tied to what a [`crate::ResourceCollector`] run returns.

use std::ops::RangeInclusive;
use std::time::Duration;

use futures::Stream;
use mcphub_core::{CollectRequest, ProgressEvent, ProgressStep, SECONDARY_TERMS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, warn};

pub const PRIMARY_INCREMENT: RangeInclusive<u64> = 2..=6;
pub const SECONDARY_INCREMENT: RangeInclusive<u64> = 3..=10;
pub const FAILURE_MESSAGE: &str = "Collection failed. Please try again.";

/// Source of the simulated per-term discovery increments.
pub trait CountSource: Send {
    fn next_increment(&mut self, range: RangeInclusive<u64>) -> u64;
}

#[derive(Debug, Clone)]
pub struct RandomCounts<R = StdRng>(R);

impl RandomCounts<StdRng> {
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> CountSource for RandomCounts<R> {
    fn next_increment(&mut self, range: RangeInclusive<u64>) -> u64 {
        self.0.gen_range(range)
    }
}

#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// Simulated latency after each search event.
    pub term_delay: Duration,
    /// Simulated latency between the dedup and completed events.
    pub completion_delay: Duration,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            term_delay: Duration::from_millis(1000),
            completion_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
enum EmitterError {
    #[error("discovered-count overflow")]
    CountOverflow,
    #[error("step counter overflow")]
    StepOverflow,
    #[error("emitter already finished")]
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Primary(usize),
    Secondary(usize),
    Deduplication,
    Completion,
    Done,
}

#[derive(Debug, Clone)]
struct Pending {
    delay: Duration,
    increment: Option<RangeInclusive<u64>>,
}

pub struct ProgressEmitter<C: CountSource = RandomCounts> {
    terms: Vec<String>,
    include_secondary: bool,
    total_steps: usize,
    step: usize,
    collected: u64,
    phase: Phase,
    pending: Option<Pending>,
    counts: C,
    config: EmitterConfig,
}

impl ProgressEmitter<RandomCounts> {
    pub fn new(request: &CollectRequest, config: EmitterConfig) -> Self {
        Self::with_counts(request, config, RandomCounts::from_entropy())
    }
}

impl<C: CountSource> ProgressEmitter<C> {
    pub fn with_counts(request: &CollectRequest, config: EmitterConfig, counts: C) -> Self {
        Self {
            terms: request.terms().to_vec(),
            include_secondary: request.include_secondary_source(),
            total_steps: request.total_steps(),
            step: 0,
            collected: 0,
            phase: Phase::Primary(0),
            pending: None,
            counts,
            config,
        }
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Next event, or `None` once a terminal event has been produced.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        if self.phase == Phase::Done {
            return None;
        }
        match self.advance().await {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(error = %err, step = self.step, "progress emission failed");
                self.phase = Phase::Done;
                self.pending = None;
                Some(failure_event())
            }
        }
    }

    async fn advance(&mut self) -> Result<ProgressEvent, EmitterError> {
        if let Some(pending) = &self.pending {
            tokio::time::sleep(pending.delay).await;
            // taken only after the sleep so a cancelled `next` keeps its debt
            if let Some(range) = self.pending.take().and_then(|p| p.increment) {
                let increment = self.counts.next_increment(range);
                self.collected = self
                    .collected
                    .checked_add(increment)
                    .ok_or(EmitterError::CountOverflow)?;
            }
        }

        loop {
            match self.phase {
                Phase::Primary(index) => {
                    let Some(term) = self.terms.get(index).cloned() else {
                        self.phase = Phase::Secondary(0);
                        continue;
                    };
                    self.phase = Phase::Primary(index + 1);
                    let message = format!("Searching: {term}");
                    return self.search_event(ProgressStep::PrimarySearch, term, message, PRIMARY_INCREMENT);
                }
                Phase::Secondary(index) => {
                    let term = SECONDARY_TERMS
                        .get(index)
                        .filter(|_| self.include_secondary)
                        .map(|t| t.to_string());
                    let Some(term) = term else {
                        self.phase = Phase::Deduplication;
                        continue;
                    };
                    self.phase = Phase::Secondary(index + 1);
                    let message = format!("Searching GitHub: {term}");
                    return self.search_event(
                        ProgressStep::SecondarySearch,
                        term,
                        message,
                        SECONDARY_INCREMENT,
                    );
                }
                Phase::Deduplication => {
                    self.phase = Phase::Completion;
                    self.pending = Some(Pending {
                        delay: self.config.completion_delay,
                        increment: None,
                    });
                    return Ok(self.summary_event(
                        ProgressStep::Deduplication,
                        "Deduplicating and organizing resources...".to_string(),
                    ));
                }
                Phase::Completion => {
                    self.phase = Phase::Done;
                    let message = format!("Collection complete! Collected {} resources", self.collected);
                    debug!(collected = self.collected, "progress stream completed");
                    return Ok(self.summary_event(ProgressStep::Completed, message));
                }
                Phase::Done => return Err(EmitterError::Finished),
            }
        }
    }

    fn search_event(
        &mut self,
        step: ProgressStep,
        term: String,
        message: String,
        increment: RangeInclusive<u64>,
    ) -> Result<ProgressEvent, EmitterError> {
        self.step = self.step.checked_add(1).ok_or(EmitterError::StepOverflow)?;
        self.pending = Some(Pending {
            delay: self.config.term_delay,
            increment: Some(increment),
        });
        Ok(ProgressEvent {
            step,
            progress: self.step,
            total_steps: self.total_steps,
            current_keyword: Some(term),
            collected_count: self.collected,
            message,
        })
    }

    fn summary_event(&self, step: ProgressStep, message: String) -> ProgressEvent {
        ProgressEvent {
            step,
            progress: self.total_steps,
            total_steps: self.total_steps,
            current_keyword: None,
            collected_count: self.collected,
            message,
        }
    }
}

impl<C: CountSource + 'static> ProgressEmitter<C> {
    /// Consumer-paced stream; dropping it cancels any pending delay.
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        futures::stream::unfold(self, |mut emitter| async move {
            emitter.next().await.map(|event| (event, emitter))
        })
    }
}

/// Terminal event replacing `completed` when emission fails.
pub fn failure_event() -> ProgressEvent {
    ProgressEvent {
        step: ProgressStep::Error,
        progress: 0,
        total_steps: 0,
        current_keyword: None,
        collected_count: 0,
        message: FAILURE_MESSAGE.to_string(),
    }
}
