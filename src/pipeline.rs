use crate::audit::AuditLog;
use crate::embedding::Embedder;
use crate::llm::OracleError;
use crate::models::{MatchMethod, Resolution};
use crate::prompt::build_prompt;
use crate::resolve::{Resolver, ResolverSettings};
use crate::taxonomy::{CandidateRanker, RankedCandidate, Taxonomy};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
}

impl PipelineError {
    pub fn new(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }
}

/// A label that has been ranked and prompted and now waits on the oracle.
#[derive(Debug, Clone)]
pub struct PreparedLabel {
    pub row: usize,
    pub label: String,
    pub candidates: Vec<RankedCandidate>,
    pub prompt: String,
}

#[derive(Debug)]
pub enum Stage {
    /// Finished without the oracle: skipped or failed before the call.
    Done(Resolution),
    AwaitingOracle(PreparedLabel),
}

/// Everything a label needs that stays fixed for the whole run.
pub struct LabelContext<'a, E> {
    pub taxonomy: &'a Taxonomy,
    pub ranker: &'a CandidateRanker,
    pub embedder: &'a E,
    pub settings: &'a ResolverSettings,
    pub top_n: usize,
    pub run_id: Uuid,
}

/// Per-label pipeline: rank, prompt, audit, then resolve the oracle reply.
/// Results are returned by value; no shared state is touched.
pub struct LabelProcessor<'a, E> {
    ctx: LabelContext<'a, E>,
}

impl<'a, E: Embedder> LabelProcessor<'a, E> {
    pub fn new(ctx: LabelContext<'a, E>) -> Self {
        Self { ctx }
    }

    pub fn prepare(&self, row: usize, label: &str, audit: &mut AuditLog) -> Stage {
        let label = label.trim();
        if label.is_empty() {
            warn!(target: "catmap.batch", run_id = %self.ctx.run_id, row = row + 1, "empty_label_skipped");
            crate::metrics::record_outcome("skipped");
            return Stage::Done(Resolution::skipped());
        }

        let started = Instant::now();
        let candidates = match self.ctx.ranker.rank(
            label,
            self.ctx.taxonomy,
            self.ctx.embedder,
            self.ctx.top_n,
        ) {
            Ok(candidates) => candidates,
            Err(err) => return Stage::Done(self.fail(row, PipelineError::new("rank", err.to_string()))),
        };
        crate::metrics::stage_elapsed("rank", started.elapsed().as_millis());
        debug!(
            target: "catmap.batch",
            run_id = %self.ctx.run_id,
            row = row + 1,
            candidates = candidates.len(),
            top_score = candidates.first().map(|c| c.score as f64).unwrap_or_default(),
            "candidates_ranked"
        );

        if let Err(err) = audit.record(row, label, &candidates) {
            warn!(target: "catmap.audit", run_id = %self.ctx.run_id, row = row + 1, error = %err, "audit_write_failed");
        }

        let prompt = build_prompt(label, &candidates);
        Stage::AwaitingOracle(PreparedLabel {
            row,
            label: label.to_string(),
            candidates,
            prompt,
        })
    }

    pub fn finish(&self, prepared: &PreparedLabel, reply: Result<String, OracleError>) -> Resolution {
        let row = prepared.row;
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                return self.fail(
                    row,
                    PipelineError::new("oracle", format!("{err} (label `{}`)", prepared.label)),
                );
            }
        };

        let resolver = Resolver::new(
            self.ctx.taxonomy,
            self.ctx.ranker,
            self.ctx.embedder,
            self.ctx.settings,
        );
        let resolution = match resolver.resolve(&reply, &prepared.candidates) {
            Ok(resolution) => resolution,
            Err(err) => return self.fail(row, PipelineError::new("resolve", err.to_string())),
        };

        let mapped = resolution.record.mapped_category.as_str();
        let run_id = self.ctx.run_id;
        match &resolution.method {
            MatchMethod::Exact => {
                info!(target: "catmap.resolve", %run_id, row = row + 1, mapped, "exact_match");
                crate::metrics::record_outcome("exact");
            }
            MatchMethod::Trailing { depth } => {
                info!(target: "catmap.resolve", %run_id, row = row + 1, mapped, depth, "trailing_match");
                crate::metrics::record_outcome("trailing");
            }
            MatchMethod::Semantic { score } => {
                info!(target: "catmap.resolve", %run_id, row = row + 1, reply = %reply, mapped, score = *score as f64, "semantic_fallback");
                crate::metrics::record_outcome("semantic");
            }
            MatchMethod::Unresolved => {
                warn!(target: "catmap.resolve", %run_id, row = row + 1, reply = %mapped, "low_confidence");
                crate::metrics::record_outcome("unresolved");
            }
            MatchMethod::Skipped | MatchMethod::Error { .. } => {}
        }
        resolution
    }

    fn fail(&self, row: usize, err: PipelineError) -> Resolution {
        error!(
            target: "catmap.batch",
            run_id = %self.ctx.run_id,
            row = row + 1,
            stage = err.stage(),
            error = %err,
            "label_failed"
        );
        crate::metrics::record_outcome("error");
        Resolution::error(err.to_string())
    }
}
