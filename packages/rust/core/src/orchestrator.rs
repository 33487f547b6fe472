//! Batch orchestrator: partitions records into chunks, runs each chunk on its
//! own credential, and reassembles results in input order.

use std::sync::Arc;

use medcontact_provider::ProviderFactory;
use medcontact_shared::{Credential, EngineConfig, MedContactError, Record, Result};
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use crate::engine::{EnrichmentEngine, RecordResult};
use crate::merge::MergePolicy;
use crate::rounds::RoundDescriptor;

/// Progress callbacks for a batch run.
pub trait BatchProgress: Send + Sync {
    /// Called once before any chunk starts.
    fn started(&self, records: usize, chunks: usize);
    /// Called after each record finishes, from the worker task.
    fn record_done(&self, result: &RecordResult);
    /// Called when a chunk had to fall back to its original rows.
    fn chunk_failed(&self, chunk: usize, error: &str);
    /// Called once every chunk has been collected.
    fn finished(&self);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl BatchProgress for SilentProgress {
    fn started(&self, _records: usize, _chunks: usize) {}
    fn record_done(&self, _result: &RecordResult) {}
    fn chunk_failed(&self, _chunk: usize, _error: &str) {}
    fn finished(&self) {}
}

/// Records per chunk: the override when set, otherwise an even split across
/// credentials. Always at least 1.
pub fn chunk_size(records: usize, credentials: usize, requested: Option<usize>) -> usize {
    requested
        .unwrap_or_else(|| records.div_ceil(credentials.max(1)))
        .max(1)
}

/// Fans records out over a pool of credentials.
pub struct Orchestrator<F: ProviderFactory> {
    factory: Arc<F>,
    credentials: Arc<[Credential]>,
    rounds: Arc<[RoundDescriptor]>,
    config: EngineConfig,
    merge: MergePolicy,
}

impl<F: ProviderFactory> Orchestrator<F> {
    pub fn new(
        factory: F,
        credentials: Vec<Credential>,
        rounds: Vec<RoundDescriptor>,
        config: EngineConfig,
    ) -> Result<Self> {
        if credentials.is_empty() {
            return Err(MedContactError::credential("at least one credential is required"));
        }
        Ok(Self {
            factory: Arc::new(factory),
            credentials: credentials.into(),
            rounds: rounds.into(),
            config,
            merge: MergePolicy::default(),
        })
    }

    /// Replace the default merge policy.
    pub fn with_merge_policy(mut self, merge: MergePolicy) -> Self {
        self.merge = merge;
        self
    }

    /// Enrich every record. The output has exactly one result per input
    /// record, in input order, whatever happens inside the workers.
    #[instrument(skip_all, fields(records = records.len(), credentials = self.credentials.len()))]
    pub async fn run(
        &self,
        records: Vec<Record>,
        progress: Arc<dyn BatchProgress>,
    ) -> Vec<RecordResult> {
        if records.is_empty() {
            progress.started(0, 0);
            progress.finished();
            return Vec::new();
        }

        let size = chunk_size(records.len(), self.credentials.len(), self.config.chunk_size);
        let chunks: Vec<Vec<Record>> = records.chunks(size).map(<[Record]>::to_vec).collect();
        let total = records.len();

        info!(chunks = chunks.len(), chunk_size = size, "starting batch");
        progress.started(total, chunks.len());

        let semaphore = Arc::new(Semaphore::new(self.credentials.len()));
        let mut handles = Vec::with_capacity(chunks.len());

        for (index, chunk) in chunks.iter().enumerate() {
            let worker = ChunkWorker {
                index,
                credential: self.credentials[index % self.credentials.len()].clone(),
                factory: Arc::clone(&self.factory),
                rounds: Arc::clone(&self.rounds),
                config: self.config.clone(),
                merge: self.merge.clone(),
                progress: Arc::clone(&progress),
            };
            let sem = Arc::clone(&semaphore);
            let chunk = chunk.clone();

            handles.push(tokio::spawn(async move {
                // The semaphore is never closed while tasks are running.
                let _permit = sem.acquire_owned().await.ok();
                worker.run(chunk).await
            }));
        }

        let mut results = Vec::with_capacity(total);
        for (index, (handle, originals)) in handles.into_iter().zip(chunks).enumerate() {
            match handle.await {
                Ok(chunk_results) => results.extend(chunk_results),
                Err(join_err) => {
                    let message = format!("chunk {index} aborted: {join_err}");
                    error!(chunk = index, rows = originals.len(), error = %join_err, "chunk worker failed, keeping original rows");
                    progress.chunk_failed(index, &message);
                    results.extend(
                        originals
                            .into_iter()
                            .map(|record| RecordResult::failed(record, message.clone())),
                    );
                }
            }
        }

        let failed = results.iter().filter(|r| !r.is_ok()).count();
        info!(records = results.len(), failed, "batch complete");
        progress.finished();
        results
    }
}

/// Everything one chunk task owns.
struct ChunkWorker<F: ProviderFactory> {
    index: usize,
    credential: Credential,
    factory: Arc<F>,
    rounds: Arc<[RoundDescriptor]>,
    config: EngineConfig,
    merge: MergePolicy,
    progress: Arc<dyn BatchProgress>,
}

impl<F: ProviderFactory> ChunkWorker<F> {
    /// Process the chunk sequentially on this worker's credential.
    #[instrument(skip_all, fields(chunk = self.index, key = %self.credential, rows = chunk.len()))]
    async fn run(self, chunk: Vec<Record>) -> Vec<RecordResult> {
        let provider = match self.factory.connect(&self.credential) {
            Ok(provider) => provider,
            Err(err) => {
                warn!(error = %err, "cannot open provider channel, failing chunk records");
                let message = err.to_string();
                return chunk
                    .into_iter()
                    .map(|record| {
                        let result = RecordResult::failed(record, message.clone());
                        self.progress.record_done(&result);
                        result
                    })
                    .collect();
            }
        };

        let engine = EnrichmentEngine::new(provider, self.rounds, self.config, self.merge);
        let mut results = Vec::with_capacity(chunk.len());
        for record in chunk {
            let result = engine.enrich(record).await;
            self.progress.record_done(&result);
            results.push(result);
        }
        results
    }
}
