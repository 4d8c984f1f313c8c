//! Three-stage comparison pipeline.
//!
//! Original → Cropped → Aligned → Done. Oracle calls within a stage run
//! concurrently; their votes are appended in plan order. Early stopping is
//! evaluated only at stage boundaries. No failure after the run starts is
//! fatal: oracle errors become abstentions, preprocessing errors switch the
//! stage to fallback votes.

use crate::config::{CroppedRole, PipelineConfig};
use crate::oracle::{Opinion, OracleError, OracleSet};
use crate::preprocess::{ImagePair, PreprocessError, Preprocessor};
use crate::run::ComparisonRun;
use crate::sink::{Abstention, ComparisonRecord, InputFingerprint, ResultSink};
use chrono::Utc;
use facevote_core::{
    apply_conditional_split_rule, build_breakdown, calculate_weighted_vote, check_early_stopping,
    render_report, Decision, OracleId, SplitOpinion, SplitWeights, Stage, StopCheck, Vote,
};
use futures::future::join_all;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// One oracle slot's result within a stage.
type Consultation = (OracleId, Result<Opinion, OracleError>);

pub struct Orchestrator {
    oracles: OracleSet,
    preprocessor: Option<Arc<dyn Preprocessor>>,
    sink: Option<Arc<dyn ResultSink>>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(oracles: OracleSet, config: PipelineConfig) -> Self {
        Self {
            oracles,
            preprocessor: None,
            sink: None,
            config,
        }
    }

    /// Without a preprocessor, Cropped and Aligned always run in fallback mode.
    pub fn with_preprocessor(mut self, preprocessor: Arc<dyn Preprocessor>) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Compare one validated image pair and hand the record to the sink.
    pub async fn run(&self, pair: &ImagePair, inputs: &[InputFingerprint]) -> ComparisonRecord {
        let run = ComparisonRun::new(Uuid::new_v4());
        let span = tracing::info_span!("comparison", run_id = %run.id());
        self.execute(run, pair, inputs).instrument(span).await
    }

    async fn execute(
        &self,
        mut run: ComparisonRun,
        pair: &ImagePair,
        inputs: &[InputFingerprint],
    ) -> ComparisonRecord {
        let original = self.original_stage(&mut run, pair).await;
        if let Some(decision) = self.stage_boundary(&mut run) {
            return self.finish(run, decision, inputs);
        }

        self.cropped_stage(&mut run, pair, &original).await;
        if let Some(decision) = self.stage_boundary(&mut run) {
            return self.finish(run, decision, inputs);
        }

        self.aligned_stage(&mut run, pair, &original).await;
        run.advance();

        let decision = calculate_weighted_vote(run.votes());
        self.finish(run, decision, inputs)
    }

    /// Evaluate early stopping after a complete stage batch.
    fn stage_boundary(&self, run: &mut ComparisonRun) -> Option<Decision> {
        let stage = run.state().stage();
        tracing::info!(stage = ?stage, votes = run.votes().len(), "stage complete");

        match check_early_stopping(run.votes(), self.config.early_stop) {
            StopCheck::Stop(decision) => {
                run.stop_early();
                Some(decision)
            }
            StopCheck::Continue => {
                run.advance();
                None
            }
        }
    }

    async fn original_stage(&self, run: &mut ComparisonRun, pair: &ImagePair) -> Vec<Consultation> {
        tracing::info!("stage 1: original images");
        let results = self
            .consult_all(run, Stage::Original, &self.config.plan.original, pair)
            .await;
        for (id, result) in &results {
            run.push(self.direct_vote(Stage::Original, id, result));
        }
        results
    }

    async fn cropped_stage(
        &self,
        run: &mut ComparisonRun,
        pair: &ImagePair,
        original: &[Consultation],
    ) {
        tracing::info!("stage 2: cropped faces");
        let plan = &self.config.plan;
        let roster: Vec<OracleId> = plan.cropped_oracles().cloned().collect();

        let cropped = match self.preprocess(Stage::Cropped, pair).await {
            Ok(cropped) => {
                run.record_preprocessing(Stage::Cropped, true);
                cropped
            }
            Err(err) => {
                run.record_preprocessing(Stage::Cropped, false);
                tracing::warn!(error = %err, "crop failed; re-emitting original-stage outcomes");
                self.emit_fallback(run, Stage::Cropped, &roster, original);
                return;
            }
        };

        let needs_reference = plan.cropped.iter().any(|s| s.role == CroppedRole::Split);
        let mut ids = roster;
        if needs_reference {
            ids.push(plan.reference.clone());
        }

        let mut results = self.consult_all(run, Stage::Cropped, &ids, &cropped).await;
        let reference = if needs_reference { results.pop() } else { None };

        let weights = &self.config.weights;
        for (slot, (id, result)) in plan.cropped.iter().zip(&results) {
            let opinion = match (slot.role, result) {
                (_, Err(err)) => {
                    run.push(Vote::abstain(id.clone(), Stage::Cropped, abstain_reason(err)));
                    continue;
                }
                (CroppedRole::Direct, Ok(_)) => {
                    run.push(self.direct_vote(Stage::Cropped, id, result));
                    continue;
                }
                (CroppedRole::Split, Ok(opinion)) => opinion,
            };

            match &reference {
                Some((reference_id, Ok(reference_opinion))) => {
                    run.extend(apply_conditional_split_rule(
                        SplitOpinion {
                            oracle: id,
                            outcome: opinion.outcome,
                            provenance: &opinion.provenance,
                        },
                        SplitOpinion {
                            oracle: reference_id,
                            outcome: reference_opinion.outcome,
                            provenance: &reference_opinion.provenance,
                        },
                        SplitWeights {
                            primary: weights.base_weight(Stage::Cropped, id),
                            reference: weights.reference_weight,
                            residual: weights.residual_weight,
                        },
                    ));
                }
                // Reference abstained: keep the opinion at the residual weight.
                _ => run.push(Vote::cast(
                    id.clone(),
                    opinion.outcome,
                    weights.residual_weight,
                    Stage::Cropped,
                    format!("{} (unreferenced)", opinion.provenance),
                )),
            }
        }

        if let Some((reference_id, Err(err))) = &reference {
            run.push(Vote::abstain(
                reference_id.clone(),
                Stage::Cropped,
                abstain_reason(err),
            ));
        }
    }

    async fn aligned_stage(
        &self,
        run: &mut ComparisonRun,
        pair: &ImagePair,
        original: &[Consultation],
    ) {
        tracing::info!("stage 3: aligned faces");
        let roster = &self.config.plan.aligned;

        let aligned = match self.preprocess(Stage::Aligned, pair).await {
            Ok(aligned) => {
                run.record_preprocessing(Stage::Aligned, true);
                aligned
            }
            Err(err) => {
                run.record_preprocessing(Stage::Aligned, false);
                tracing::warn!(error = %err, "alignment failed; re-emitting original-stage outcomes");
                self.emit_fallback(run, Stage::Aligned, roster, original);
                return;
            }
        };

        let results = self.consult_all(run, Stage::Aligned, roster, &aligned).await;
        for (id, result) in &results {
            run.push(self.direct_vote(Stage::Aligned, id, result));
        }
    }

    async fn preprocess(&self, stage: Stage, pair: &ImagePair) -> Result<ImagePair, PreprocessError> {
        let Some(preprocessor) = &self.preprocessor else {
            return Err(PreprocessError::NotConfigured);
        };
        match stage {
            Stage::Original => Ok(pair.clone()),
            Stage::Cropped => preprocessor.crop(pair).await,
            Stage::Aligned => preprocessor.align(pair).await,
        }
    }

    /// Call every listed oracle concurrently; results come back in `ids` order.
    async fn consult_all(
        &self,
        run: &mut ComparisonRun,
        stage: Stage,
        ids: &[OracleId],
        pair: &ImagePair,
    ) -> Vec<Consultation> {
        let invoked = ids.iter().filter(|id| self.oracles.contains(id)).count();
        run.count_oracle_calls(invoked);

        let results = join_all(ids.iter().map(|id| self.consult(stage, id, pair))).await;
        ids.iter().cloned().zip(results).collect()
    }

    async fn consult(
        &self,
        stage: Stage,
        id: &OracleId,
        pair: &ImagePair,
    ) -> Result<Opinion, OracleError> {
        let Some(oracle) = self.oracles.get(id) else {
            // Already warned about at startup.
            tracing::debug!(oracle = %id, %stage, "oracle not registered");
            return Err(OracleError::NotConfigured(id.to_string()));
        };

        let timeout = self.config.call_timeout;
        let result = match tokio::time::timeout(timeout, oracle.compare(&pair.a, &pair.b)).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(timeout)),
        };

        match &result {
            Ok(opinion) => tracing::debug!(
                oracle = %id,
                %stage,
                outcome = %opinion.outcome,
                provenance = %opinion.provenance,
                "oracle answered"
            ),
            Err(err) => tracing::warn!(
                oracle = %id,
                %stage,
                class = err.class().as_str(),
                error = %err,
                "oracle abstained"
            ),
        }
        result
    }

    fn direct_vote(
        &self,
        stage: Stage,
        id: &OracleId,
        result: &Result<Opinion, OracleError>,
    ) -> Vote {
        match result {
            Ok(opinion) => Vote::cast(
                id.clone(),
                opinion.outcome,
                self.config.weights.base_weight(stage, id),
                stage,
                opinion.provenance.clone(),
            ),
            Err(err) => Vote::abstain(id.clone(), stage, abstain_reason(err)),
        }
    }

    /// Re-emit Original-stage opinions at `stage` weights. No oracle is called.
    fn emit_fallback(
        &self,
        run: &mut ComparisonRun,
        stage: Stage,
        roster: &[OracleId],
        original: &[Consultation],
    ) {
        for id in roster {
            let Some((_, Ok(opinion))) = original.iter().find(|(o, _)| o == id) else {
                continue;
            };
            run.push(
                Vote::cast(
                    id.clone(),
                    opinion.outcome,
                    self.config.weights.base_weight(stage, id),
                    stage,
                    format!("{}_fallback_original", opinion.provenance),
                )
                .into_fallback(),
            );
        }
    }

    fn finish(
        &self,
        run: ComparisonRun,
        mut decision: Decision,
        inputs: &[InputFingerprint],
    ) -> ComparisonRecord {
        decision.stopped_early = run.stopped_early();
        let votes = run.votes();

        let abstentions = votes
            .iter()
            .filter(|v| v.is_abstain())
            .map(|v| Abstention {
                stage: v.stage(),
                oracle: v.source().clone(),
                reason: v.provenance().to_string(),
            })
            .collect();

        tracing::info!(
            outcome = %decision.outcome,
            confidence = decision.confidence_percent,
            votes = decision.vote_count,
            stopped_early = decision.stopped_early,
            oracle_calls = run.oracle_calls(),
            "comparison finished"
        );
        let breakdown = build_breakdown(votes);
        tracing::debug!("\n{}", render_report(&decision, &breakdown));

        let record = ComparisonRecord {
            run_id: run.id(),
            finished_at: Utc::now(),
            breakdown,
            decision,
            processing_ms: u64::try_from(run.elapsed().as_millis()).unwrap_or(u64::MAX),
            crop_success: run.crop_success(),
            align_success: run.align_success(),
            oracle_calls: run.oracle_calls(),
            abstentions,
            inputs: inputs.to_vec(),
        };

        if let Some(sink) = &self.sink {
            if let Err(err) = sink.record(&record) {
                tracing::warn!(error = %err, "failed to persist comparison record");
            }
        }

        record
    }
}

fn abstain_reason(err: &OracleError) -> String {
    format!("{}: {err}", err.class().as_str())
}
