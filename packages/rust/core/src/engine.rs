//! Iterative enrichment engine.
//!
//! Each record walks a round table as a small state machine:
//!
//! ```text
//! Pending(r) --delay--> Querying(r, a) --ok--> Merging(r) --> Pending(r + 1)
//!                          |  ^                                    ...
//!                transient |  | backoff                       Pending(K) --> Done
//!                          +--+
//! ```
//!
//! Transient failures retry the same round up to `max_attempts`, then the round
//! contributes nothing. A fatal provider error, or an unmet mandatory round
//! under [`MandatoryPolicy::Enforce`], ends the record early with whatever was
//! merged so far.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use medcontact_provider::{ProviderError, SearchProvider};
use medcontact_shared::{
    EmailLikelihood, EngineConfig, Field, FieldProvenance, MandatoryPolicy, Record,
};
use medcontact_storage::TranscriptEntry;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::merge::MergePolicy;
use crate::parser::parse_response;
use crate::prompt::build_prompt;
use crate::rounds::{RoundDescriptor, RoundKind};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// How a round ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Response parsed; these fields changed (possibly none).
    Merged { changed: Vec<Field> },
    /// Response held no usable object.
    Empty,
    /// Every attempt failed transiently.
    Abandoned { error: String },
    /// Provider refused outright; the record stopped here.
    Fatal { error: String },
}

/// Per-round log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub id: String,
    pub attempts: u32,
    pub outcome: RoundOutcome,
}

/// Outcome of processing one record.
#[derive(Debug, Clone)]
pub struct RecordResult {
    /// Final state, derived columns included.
    pub record: Record,
    /// State as loaded.
    pub original: Record,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub rounds: Vec<RoundReport>,
    pub provenance: Vec<FieldProvenance>,
    pub error: Option<String>,
}

impl RecordResult {
    /// A record that could not be processed at all.
    pub fn failed(original: Record, error: impl Into<String>) -> Self {
        let error = error.into();
        let now = Local::now();
        let record = original.clone().with(Field::Error, error.clone());
        Self {
            record,
            original,
            started_at: now,
            finished_at: now,
            rounds: Vec::new(),
            provenance: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Transcript section for this record.
    pub fn transcript_entry(&self) -> TranscriptEntry {
        TranscriptEntry {
            label: self.original.label(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            fields: self
                .record
                .filled()
                .filter(|(field, _)| *field != Field::Error)
                .map(|(field, value)| (field, value.to_string()))
                .collect(),
            provenance: self.provenance.clone(),
            error: self.error.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

enum State {
    Pending { round: usize },
    Querying { round: usize, attempt: u32 },
    Merging { round: usize, attempt: u32, response: String },
    Done,
}

/// Mutable state of one record while it is processed.
struct Run {
    original: Record,
    record: Record,
    reports: Vec<RoundReport>,
    provenance: Vec<FieldProvenance>,
    likelihoods: Option<[EmailLikelihood; 2]>,
    error: Option<String>,
}

/// Runs the round table against one provider channel.
pub struct EnrichmentEngine<P> {
    provider: P,
    rounds: Arc<[RoundDescriptor]>,
    config: EngineConfig,
    merge: MergePolicy,
}

impl<P: SearchProvider> EnrichmentEngine<P> {
    pub fn new(
        provider: P,
        rounds: Arc<[RoundDescriptor]>,
        config: EngineConfig,
        merge: MergePolicy,
    ) -> Self {
        Self {
            provider,
            rounds,
            config,
            merge,
        }
    }

    /// Sleep before the first attempt of `round`.
    pub fn delay_before(&self, round: usize) -> Duration {
        if round == 0 {
            return Duration::ZERO;
        }
        if self.rounds.get(round).is_some_and(|r| r.extended_delay) {
            return self.config.extended_delay;
        }
        self.config
            .delay_step
            .saturating_mul(u32::try_from(round).unwrap_or(u32::MAX))
            .min(self.config.delay_ceiling)
    }

    /// Process one record through every round. Never fails: errors end up in
    /// [`RecordResult::error`].
    #[instrument(skip_all, fields(record = %record.label()))]
    pub async fn enrich(&self, record: Record) -> RecordResult {
        let started_at = Local::now();
        let clock = Instant::now();
        info!(rounds = self.rounds.len(), "enriching record");

        let mut run = Run {
            original: record.clone(),
            record,
            reports: Vec::new(),
            provenance: Vec::new(),
            likelihoods: None,
            error: None,
        };

        let mut state = State::Pending { round: 0 };
        loop {
            state = match state {
                State::Pending { round } if round >= self.rounds.len() => State::Done,
                State::Pending { round } => {
                    let delay = self.delay_before(round);
                    if !delay.is_zero() {
                        debug!(round = %self.rounds[round].id, ?delay, "waiting before round");
                        tokio::time::sleep(delay).await;
                    }
                    State::Querying { round, attempt: 1 }
                }
                State::Querying { round, attempt } => self.query(&mut run, round, attempt).await,
                State::Merging {
                    round,
                    attempt,
                    response,
                } => self.apply(&mut run, round, attempt, &response),
                State::Done => break,
            };
        }

        let elapsed = clock.elapsed();
        run.record
            .set(Field::ProcessingTime, format!("{:.2}", elapsed.as_secs_f64()));
        if let Some([first, second]) = run.likelihoods {
            run.record.set(Field::Email1Likelihood, first.label());
            run.record.set(Field::Email2Likelihood, second.label());
        }
        run.record
            .set(Field::Error, run.error.clone().unwrap_or_default());

        match &run.error {
            Some(err) => warn!(error = %err, elapsed = ?elapsed, "record ended early"),
            None => info!(
                changed = run.provenance.len(),
                elapsed = ?elapsed,
                "record enriched"
            ),
        }

        RecordResult {
            record: run.record,
            original: run.original,
            started_at,
            finished_at: Local::now(),
            rounds: run.reports,
            provenance: run.provenance,
            error: run.error,
        }
    }

    async fn query(&self, run: &mut Run, round: usize, attempt: u32) -> State {
        let descriptor = &self.rounds[round];
        let prompt = build_prompt(descriptor, &run.original, &run.record);

        let reply = match self.provider.complete(&prompt).await {
            Ok(text) if text.trim().is_empty() => {
                Err(ProviderError::Transient("empty response text".into()))
            }
            other => other,
        };

        match reply {
            Ok(response) => State::Merging {
                round,
                attempt,
                response,
            },
            Err(ProviderError::Transient(msg)) if attempt < self.config.max_attempts => {
                warn!(
                    round = %descriptor.id,
                    attempt,
                    max_attempts = self.config.max_attempts,
                    error = %msg,
                    "provider call failed, retrying"
                );
                if !self.config.backoff.is_zero() {
                    tokio::time::sleep(self.config.backoff).await;
                }
                State::Querying {
                    round,
                    attempt: attempt + 1,
                }
            }
            Err(ProviderError::Transient(msg)) => {
                warn!(round = %descriptor.id, attempts = attempt, error = %msg, "round abandoned");
                run.reports.push(RoundReport {
                    id: descriptor.id.clone(),
                    attempts: attempt,
                    outcome: RoundOutcome::Abandoned { error: msg },
                });
                self.advance(run, round)
            }
            Err(err @ ProviderError::Fatal(_)) => {
                error!(round = %descriptor.id, error = %err, "provider rejected request");
                run.reports.push(RoundReport {
                    id: descriptor.id.clone(),
                    attempts: attempt,
                    outcome: RoundOutcome::Fatal {
                        error: err.to_string(),
                    },
                });
                run.error = Some(err.to_string());
                State::Done
            }
        }
    }

    fn apply(&self, run: &mut Run, round: usize, attempt: u32, response: &str) -> State {
        let descriptor = &self.rounds[round];
        let parsed = parse_response(response);

        let outcome = if parsed.is_empty() {
            debug!(round = %descriptor.id, "round contributed nothing");
            RoundOutcome::Empty
        } else {
            if descriptor.kind == RoundKind::EmailPlausibility {
                run.likelihoods = Some(stage_likelihoods(&parsed));
            }

            let changes = self.merge.merge(&mut run.record, &parsed);
            for change in &changes {
                debug!(round = %descriptor.id, field = %change.field, value = %change.value, "field updated");
                match run.provenance.iter_mut().find(|p| p.field == change.field) {
                    Some(entry) => entry.round = round,
                    None => run.provenance.push(FieldProvenance {
                        field: change.field,
                        round,
                        previous: change.previous.clone(),
                    }),
                }
            }
            RoundOutcome::Merged {
                changed: changes.iter().map(|c| c.field).collect(),
            }
        };

        run.reports.push(RoundReport {
            id: descriptor.id.clone(),
            attempts: attempt,
            outcome,
        });
        self.advance(run, round)
    }

    /// Check the mandatory contract of `round`, then move on.
    fn advance(&self, run: &mut Run, round: usize) -> State {
        let descriptor = &self.rounds[round];
        let met = descriptor
            .enrichable_fields()
            .any(|field| run.record.is_filled(field));

        if descriptor.mandatory && !met {
            let keys: Vec<&str> = descriptor.enrichable_fields().map(Field::key).collect();
            match self.config.mandatory {
                MandatoryPolicy::Advisory => {
                    warn!(round = %descriptor.id, "mandatory round found nothing");
                }
                MandatoryPolicy::Enforce => {
                    let message = format!(
                        "mandatory round {} found none of: {}",
                        descriptor.id,
                        keys.join(", ")
                    );
                    error!(round = %descriptor.id, "{message}");
                    run.error = Some(message);
                    return State::Done;
                }
            }
        }

        State::Pending { round: round + 1 }
    }
}

/// Ratings for `email1` and `email2`; anything missing or unrecognised is unlikely.
fn stage_likelihoods(parsed: &std::collections::BTreeMap<String, String>) -> [EmailLikelihood; 2] {
    let rating = |target: Field| {
        parsed
            .iter()
            .filter(|(key, _)| Field::from_alias(key) == Some(target))
            .find_map(|(_, value)| EmailLikelihood::parse(value))
            .unwrap_or(EmailLikelihood::Unlikely)
    };
    [
        rating(Field::Email1Likelihood),
        rating(Field::Email2Likelihood),
    ]
}
