use crate::audit::AuditLog;
use crate::embedding::Embedder;
use crate::llm::{Oracle, OracleError, propose_with_timeout};
use crate::models::{ResolutionRecord, RunSummary};
use crate::pipeline::{LabelProcessor, PreparedLabel, Stage};
use crate::tabular::{Table, TableError, TableSink};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinSet},
};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("final output write to {target} failed (fallback copy: {fallback:?}): {source}")]
    FinalWrite {
        target: String,
        fallback: Option<String>,
        #[source]
        source: TableError,
    },
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub max_concurrent: usize,
    pub checkpoint_interval: usize,
    pub oracle_timeout: Duration,
}

type OracleReply = (usize, Result<String, OracleError>);

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub records: Vec<ResolutionRecord>,
    pub summary: RunSummary,
    pub checkpoints_written: usize,
}

/// Results so far, one slot per input row. Only the orchestrator writes it.
struct RunState<'t> {
    input: &'t Table,
    slots: Vec<Option<ResolutionRecord>>,
    completed: usize,
    checkpoint_interval: usize,
    checkpoints_written: usize,
    run_id: Uuid,
}

impl<'t> RunState<'t> {
    fn new(input: &'t Table, checkpoint_interval: usize, run_id: Uuid) -> Self {
        Self {
            input,
            slots: vec![None; input.rows.len()],
            completed: 0,
            checkpoint_interval,
            checkpoints_written: 0,
            run_id,
        }
    }

    fn store(&mut self, row: usize, record: ResolutionRecord, checkpoint: &mut dyn TableSink) {
        if let Some(slot) = self.slots.get_mut(row) {
            *slot = Some(record);
        }
        self.completed += 1;
        if self.checkpoint_interval > 0 && self.completed % self.checkpoint_interval == 0 {
            self.write_checkpoint(checkpoint);
        }
    }

    fn write_checkpoint(&mut self, checkpoint: &mut dyn TableSink) {
        let snapshot = self.input.with_results(&self.slots);
        match checkpoint.write_table(&snapshot) {
            Ok(()) => {
                self.checkpoints_written += 1;
                info!(
                    target: "catmap.sink",
                    run_id = %self.run_id,
                    completed = self.completed,
                    destination = %checkpoint.describe(),
                    "checkpoint_written"
                );
            }
            Err(err) => warn!(
                target: "catmap.sink",
                run_id = %self.run_id,
                completed = self.completed,
                error = %err,
                "checkpoint_failed"
            ),
        }
    }

    fn into_outcome(self) -> BatchOutcome {
        let records: Vec<ResolutionRecord> = self
            .slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(ResolutionRecord::error))
            .collect();
        let summary = RunSummary::from_records(&records);
        BatchOutcome {
            records,
            summary,
            checkpoints_written: self.checkpoints_written,
        }
    }
}

/// Drives the label processor over every input row. Ranking and prompting
/// run eagerly on this task; only oracle calls are admitted through the
/// semaphore.
pub struct BatchOrchestrator<'a, E, O> {
    processor: LabelProcessor<'a, E>,
    oracle: Arc<O>,
    settings: BatchSettings,
    run_id: Uuid,
}

impl<'a, E: Embedder, O: Oracle> BatchOrchestrator<'a, E, O> {
    pub fn new(
        processor: LabelProcessor<'a, E>,
        oracle: Arc<O>,
        settings: BatchSettings,
        run_id: Uuid,
    ) -> Self {
        Self {
            processor,
            oracle,
            settings,
            run_id,
        }
    }

    pub async fn run(
        &self,
        input: &Table,
        audit: &mut AuditLog,
        checkpoint: &mut dyn TableSink,
    ) -> BatchOutcome {
        let started = Instant::now();
        let labels = input.labels();
        let mut state = RunState::new(input, self.settings.checkpoint_interval, self.run_id);
        let gate = Arc::new(Semaphore::new(self.settings.max_concurrent.max(1)));
        let mut calls: JoinSet<OracleReply> = JoinSet::new();
        let mut waiting: HashMap<usize, PreparedLabel> = HashMap::new();

        info!(
            target: "catmap.batch",
            run_id = %self.run_id,
            labels = labels.len(),
            max_concurrent = self.settings.max_concurrent,
            "batch_started"
        );

        for (row, label) in labels.iter().enumerate() {
            match self.processor.prepare(row, label, audit) {
                Stage::Done(resolution) => state.store(row, resolution.record, checkpoint),
                Stage::AwaitingOracle(prepared) => {
                    self.spawn_call(&mut calls, &gate, row, prepared.prompt.clone());
                    waiting.insert(row, prepared);
                }
            }
            while let Some(joined) = calls.try_join_next() {
                self.complete(joined, &mut waiting, &mut state, checkpoint);
            }
        }

        while let Some(joined) = calls.join_next().await {
            self.complete(joined, &mut waiting, &mut state, checkpoint);
        }

        // Tasks that panicked never reported their row.
        let mut abandoned: Vec<usize> = waiting.keys().copied().collect();
        abandoned.sort_unstable();
        for row in abandoned {
            if let Some(prepared) = waiting.remove(&row) {
                let reply = Err(OracleError::Aborted("oracle task did not complete".into()));
                let resolution = self.processor.finish(&prepared, reply);
                state.store(row, resolution.record, checkpoint);
            }
        }

        let outcome = state.into_outcome();
        crate::metrics::stage_elapsed("batch", started.elapsed().as_millis());
        info!(
            target: "catmap.batch",
            run_id = %self.run_id,
            success = outcome.summary.success,
            needs_check = outcome.summary.needs_check,
            errors = outcome.summary.errors,
            skipped = outcome.summary.skipped,
            "batch_finished"
        );
        outcome
    }

    fn spawn_call(
        &self,
        calls: &mut JoinSet<OracleReply>,
        gate: &Arc<Semaphore>,
        row: usize,
        prompt: String,
    ) {
        let oracle = Arc::clone(&self.oracle);
        let gate = Arc::clone(gate);
        let timeout = self.settings.oracle_timeout;
        calls.spawn(async move {
            let reply = match gate.acquire_owned().await {
                Ok(_permit) => {
                    let started = Instant::now();
                    let reply = propose_with_timeout(oracle.as_ref(), prompt, timeout).await;
                    crate::metrics::stage_elapsed("oracle_call", started.elapsed().as_millis());
                    reply
                }
                Err(err) => Err(OracleError::Aborted(err.to_string())),
            };
            (row, reply)
        });
    }

    fn complete(
        &self,
        joined: Result<OracleReply, JoinError>,
        waiting: &mut HashMap<usize, PreparedLabel>,
        state: &mut RunState<'_>,
        checkpoint: &mut dyn TableSink,
    ) {
        let (row, reply) = match joined {
            Ok(done) => done,
            Err(err) => {
                error!(target: "catmap.batch", run_id = %self.run_id, error = %err, "oracle_task_failed");
                return;
            }
        };
        let Some(prepared) = waiting.remove(&row) else {
            return;
        };
        let resolution = self.processor.finish(&prepared, reply);
        state.store(row, resolution.record, checkpoint);
    }
}

/// Writes the complete result table. When the output cannot be written the
/// same table goes to the checkpoint sink so the run is not lost, and the
/// output error is still returned.
pub fn write_final(
    input: &Table,
    outcome: &BatchOutcome,
    output: &mut dyn TableSink,
    checkpoint: &mut dyn TableSink,
) -> Result<(), BatchError> {
    let slots: Vec<Option<ResolutionRecord>> =
        outcome.records.iter().cloned().map(Some).collect();
    let table = input.with_results(&slots);
    let err = match output.write_table(&table) {
        Ok(()) => {
            info!(target: "catmap.sink", destination = %output.describe(), "final_output_written");
            return Ok(());
        }
        Err(err) => err,
    };

    error!(target: "catmap.sink", destination = %output.describe(), error = %err, "final_output_failed");
    let fallback = match checkpoint.write_table(&table) {
        Ok(()) => {
            warn!(target: "catmap.sink", destination = %checkpoint.describe(), "final_output_saved_to_checkpoint");
            Some(checkpoint.describe())
        }
        Err(fallback_err) => {
            error!(target: "catmap.sink", error = %fallback_err, "checkpoint_fallback_failed");
            None
        }
    };
    Err(BatchError::FinalWrite {
        target: output.describe(),
        fallback,
        source: err,
    })
}
