//! End-to-end `enrich` pipeline: keys → table → orchestrator → table + transcript.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{info, instrument};
use uuid::Uuid;

use medcontact_provider::{GeminiFactory, ProviderFactory};
use medcontact_shared::{EngineConfig, ProviderConfig, Result, TableSchemaKind};
use medcontact_storage::{
    DerivedColumns, OutputPaths, RunHeader, TableSchema, load_credentials, load_table,
    write_table, write_transcript,
};

use crate::engine::RecordResult;
use crate::orchestrator::{BatchProgress, Orchestrator};
use crate::rounds::round_table;

/// Configuration for one batch run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Physician table to enrich.
    pub input: PathBuf,
    /// Directory receiving the enriched table and transcript.
    pub output_dir: PathBuf,
    /// Column layout of input and output.
    pub schema: TableSchemaKind,
    /// Secret files, one key per line.
    pub key_files: Vec<PathBuf>,
    /// Provider endpoint settings.
    pub provider: ProviderConfig,
    /// Round schedule, retries and chunking.
    pub engine: EngineConfig,
}

/// Result of a batch run.
#[derive(Debug)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub paths: OutputPaths,
    /// Rows written; always equals rows read.
    pub records: usize,
    /// Rows whose processing ended with an error.
    pub failed: usize,
    pub elapsed: Duration,
}

/// Run the full `enrich` pipeline against the Gemini provider.
pub async fn run_batch(
    config: &BatchConfig,
    progress: Arc<dyn BatchProgress>,
) -> Result<BatchSummary> {
    let factory = GeminiFactory::new(&config.provider)?;
    run_batch_with(config, factory, progress).await
}

/// Run the pipeline with any provider factory.
///
/// Credentials and the input table are read before any provider call; those
/// are the only failures that abort the run. Once records are dispatched the
/// output always has one row per input row.
#[instrument(skip_all, fields(input = %config.input.display(), profile = ?config.engine.profile))]
pub async fn run_batch_with<F: ProviderFactory>(
    config: &BatchConfig,
    factory: F,
    progress: Arc<dyn BatchProgress>,
) -> Result<BatchSummary> {
    let run_id = Uuid::now_v7();
    let started_at = Local::now();
    let clock = Instant::now();
    info!(%run_id, "starting enrichment run");

    // --- Startup: keys and table ---
    let credentials = load_credentials(&config.key_files)?;
    let mut table = load_table(&config.input, TableSchema::new(config.schema))?;

    let orchestrator = Orchestrator::new(
        factory,
        credentials,
        round_table(config.engine.profile),
        config.engine.clone(),
    )?;

    // --- Enrichment ---
    let records = std::mem::take(&mut table.records);
    let input_rows = records.len();
    let results = orchestrator.run(records, progress).await;
    debug_assert_eq!(results.len(), input_rows);

    // --- Output ---
    let paths = OutputPaths::new(&config.output_dir, started_at);
    table.records = results.iter().map(|r| r.record.clone()).collect();
    write_table(&paths.table, &table, DerivedColumns::Include)?;

    let header = RunHeader {
        run_id,
        started_at,
        finished_at: Local::now(),
    };
    let entries: Vec<_> = results.iter().map(RecordResult::transcript_entry).collect();
    write_transcript(&paths.transcript, &header, &entries)?;

    let summary = BatchSummary {
        run_id,
        paths,
        records: results.len(),
        failed: results.iter().filter(|r| !r.is_ok()).count(),
        elapsed: clock.elapsed(),
    };

    info!(
        %run_id,
        records = summary.records,
        failed = summary.failed,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        output = %summary.paths.table.display(),
        "enrichment run complete"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::SilentProgress;
    use crate::testing::{Behaviour, ScriptedFactory};
    use medcontact_shared::{Field, ProfileKind};

    const ANSWER: &str =
        "```json\n{\"cidade\": \"Recife\", \"telefone_a1\": \"+55 (81) 3333-4444\"}\n```";

    fn setup(input: &str, keys: &[&str]) -> (PathBuf, BatchConfig) {
        let dir = std::env::temp_dir().join(format!("mc-pipeline-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("input.csv"), input).unwrap();

        let mut key_files = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            let path = dir.join(format!("gemini{i}.key"));
            std::fs::write(&path, format!("{key}\n")).unwrap();
            key_files.push(path);
        }

        let mut engine = EngineConfig::default().without_delays();
        engine.profile = ProfileKind::Standard;
        engine.max_attempts = 1;

        let config = BatchConfig {
            input: dir.join("input.csv"),
            output_dir: dir.join("out"),
            schema: TableSchemaKind::Legacy,
            key_files,
            provider: ProviderConfig::default(),
            engine,
        };
        (dir, config)
    }

    #[tokio::test]
    async fn writes_enriched_table_and_transcript() {
        let (dir, config) = setup(
            "Nome,Sobrenome,CRM,UF,Cidade,Origem\n\
             Ana,Souza,1,PE,,lista-a\n\
             Bruno,Lima,2,PE,Olinda,lista-b\n\
             Carla,Reis,3,PE,,lista-c\n",
            &["key-a", "key-b"],
        );
        let factory = ScriptedFactory::answering(ANSWER).with("key-b", Behaviour::Reject);

        let summary = run_batch_with(&config, factory, Arc::new(SilentProgress))
            .await
            .unwrap();

        assert_eq!(summary.records, 3);
        assert_eq!(summary.failed, 1);

        let table = load_table(&summary.paths.table, TableSchema::new(TableSchemaKind::Legacy))
            .unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.records[0].get(Field::City), "Recife");
        assert_eq!(table.records[0].get(Field::Phone1), "+55 (81) 3333-4444");
        assert_eq!(table.records[1].get(Field::City), "Olinda");
        assert!(table.records[0].is_filled(Field::ProcessingTime));
        assert_eq!(table.records[2].get(Field::City), "");
        assert!(table.records[2].get(Field::Error).contains("malformed credential"));
        assert_eq!(table.records[2].extra("Origem"), Some("lista-c"));

        let transcript = std::fs::read_to_string(&summary.paths.transcript).unwrap();
        assert!(transcript.contains(&summary.run_id.to_string()));
        assert!(transcript.contains("=== CRM 1/PE ==="));
        assert!(transcript.contains("Records:  3 (2 ok, 1 failed)"));

        let name = summary.paths.table.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("enriched_") && name.ends_with(".csv"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn blank_input_rows_are_written_back() {
        let (dir, config) = setup(
            "Nome,Sobrenome,CRM,UF,Cidade,Origem\n\
             Ana,Souza,1,PE,,lista-a\n\
             ,,,,,\n\
             Carla,Reis,3,PE,,lista-c\n",
            &["key-a"],
        );

        let summary = run_batch_with(&config, ScriptedFactory::answering(ANSWER), Arc::new(SilentProgress))
            .await
            .unwrap();
        assert_eq!(summary.records, 3);

        let table = load_table(&summary.paths.table, TableSchema::new(TableSchemaKind::Legacy))
            .unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.records[1].get(Field::Crm), "");
        assert_eq!(table.records[2].get(Field::Crm), "3");
        assert_eq!(table.records[2].extra("Origem"), Some("lista-c"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn missing_key_file_aborts_before_any_call() {
        let (dir, mut config) = setup("CRM,UF\n1,SP\n", &["key-a"]);
        config.key_files.push(dir.join("absent.key"));

        let err = run_batch_with(&config, ScriptedFactory::answering(ANSWER), Arc::new(SilentProgress))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("absent.key"));
        assert!(!config.output_dir.exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn missing_crm_column_aborts() {
        let (dir, config) = setup("Nome,UF\nAna,SP\n", &["key-a"]);

        let err = run_batch_with(&config, ScriptedFactory::answering(ANSWER), Arc::new(SilentProgress))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("CRM"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
