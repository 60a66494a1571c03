use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::allocation::{
    recalibrate, AllocationError, AllocationFeedback, AllocationSuggestion, AllocationWeights,
    Allocator,
};
use super::catalog::{PolicyProgram, RuleCatalog};
use super::diagnosis::{diagnose, Diagnosis};
use super::domain::{
    Assessment, AssessmentId, CaseworkerId, EnterpriseId, EnterpriseSnapshot, FlaggedRule,
    ProgramId, RuleId, RuleOutcome, TouchState,
};
use super::evaluation::{EvaluationEngine, OverrideError};
use super::lifecycle::{self, Actor, TouchAction, TouchStateChange, TransitionError, TransitionOutcome};
use super::repository::{AssessmentFilter, AssessmentRecord, AssessmentRepository, RepositoryError};
use super::stats::{CaseworkerProgress, PolicyStats};
use crate::collaborators::{bounded, CollaboratorError, Collaborators};
use crate::config::EngineConfig;
use crate::workflows::matching::{rank_candidates, MatchResult, SubTask};

const PROFILE_STORE: &str = "enterprise profile store";
const DEMAND_PARSER: &str = "demand parser";
const VISIT_RECORDS: &str = "visit record store";
const ROSTER: &str = "caseworker roster";
const DIRECTORY: &str = "candidate directory";

/// Touch-state change request, optionally pinned to the state the caller last saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub action: TouchAction,
    pub actor: Actor,
    #[serde(default)]
    pub expected_state: Option<TouchState>,
}

/// Human decision on an allocation suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationDecision {
    pub caseworker_id: CaseworkerId,
    pub actor: Actor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationReceipt {
    pub assessment: Assessment,
    pub feedback: AllocationFeedback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOverride {
    pub outcome: RuleOutcome,
    pub admin: String,
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreeningRunSummary {
    pub program_id: ProgramId,
    pub run_at: DateTime<Utc>,
    pub evaluated: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub qualified: usize,
    /// Enterprises scored from stored or empty data because the profile store failed.
    pub degraded: Vec<EnterpriseId>,
    /// Assessments written concurrently by someone else; a rerun picks them up.
    pub conflicts: Vec<AssessmentId>,
    pub flagged_rules: Vec<FlaggedRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillSummary {
    pub assessment: Assessment,
    pub promoted: usize,
    pub resolved: Vec<RuleId>,
    pub degraded: bool,
}

/// Facade composing the catalog, evaluation engine, repository and collaborators.
pub struct OutreachService<R> {
    repository: Arc<R>,
    collaborators: Collaborators,
    catalog: Arc<RuleCatalog>,
    engine: Arc<EvaluationEngine>,
    allocator: RwLock<Allocator>,
    settings: EngineConfig,
    reference_date: Option<NaiveDate>,
}

impl<R> OutreachService<R>
where
    R: AssessmentRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        collaborators: Collaborators,
        catalog: RuleCatalog,
        settings: EngineConfig,
    ) -> Self {
        let allocator = Allocator::new(AllocationWeights::default(), settings.allocation_load_capacity);
        Self {
            repository,
            collaborators,
            catalog: Arc::new(catalog),
            engine: Arc::new(EvaluationEngine::default()),
            allocator: RwLock::new(allocator),
            settings,
            reference_date: None,
        }
    }

    pub fn with_engine(mut self, engine: EvaluationEngine) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    /// Pin "today" for match recency, instead of the wall clock.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Utc::now().date_naive())
    }

    fn program(&self, program_id: &ProgramId) -> Result<&PolicyProgram, OutreachServiceError> {
        self.catalog
            .program(program_id)
            .ok_or_else(|| OutreachServiceError::UnknownProgram(program_id.clone()))
    }

    fn record(&self, id: &AssessmentId) -> Result<AssessmentRecord, OutreachServiceError> {
        self.repository
            .fetch(id)?
            .ok_or_else(|| OutreachServiceError::NotFound(id.clone()))
    }

    fn allocator(&self) -> Allocator {
        *self
            .allocator
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Swap in the new record, translating a lost race into a retryable conflict.
    fn commit(
        &self,
        expected_version: u64,
        record: AssessmentRecord,
    ) -> Result<AssessmentRecord, OutreachServiceError> {
        match self.repository.swap(expected_version, record) {
            Ok(stored) => Ok(stored),
            Err(RepositoryError::VersionConflict { id, expected, actual }) => {
                warn!(assessment_id = %id, expected, actual, "concurrent write rejected");
                Err(OutreachServiceError::ConcurrentTransitionConflict { assessment_id: id })
            }
            Err(RepositoryError::NotFound(id)) => Err(OutreachServiceError::NotFound(id)),
            Err(other) => Err(other.into()),
        }
    }

    fn log_changes(
        &self,
        stored: &AssessmentRecord,
        outcomes: Vec<TransitionOutcome>,
        actor: &Actor,
    ) -> Result<(), OutreachServiceError> {
        let at = Utc::now();
        for outcome in outcomes {
            info!(
                assessment_id = %stored.id(),
                action = outcome.action,
                from = outcome.from.map(TouchState::label).unwrap_or("none"),
                to = outcome.to.label(),
                actor = %actor.name(),
                "touch state changed"
            );
            self.repository
                .append_history(outcome.into_change(stored.id(), actor, at, stored.version()))?;
        }
        Ok(())
    }

    /// Evaluate every enterprise in the profile store against a program.
    ///
    /// Each assessment is written as a whole new version, so an interrupted run
    /// leaves every record either fully old or fully new and can simply be rerun.
    /// Rerunning over unchanged snapshots writes nothing.
    pub async fn trigger_screening_run(
        &self,
        program_id: &ProgramId,
    ) -> Result<ScreeningRunSummary, OutreachServiceError> {
        let program = self.program(program_id)?;
        let budget = self.settings.collaborator_timeout();
        let today = self.today();

        let enterprise_ids = bounded(
            PROFILE_STORE,
            budget,
            self.collaborators.profiles.list_enterprises(),
        )
        .await?;

        let mut degraded = Vec::new();
        let mut inputs = Vec::with_capacity(enterprise_ids.len());
        for enterprise_id in enterprise_ids {
            let existing = self
                .repository
                .fetch(&AssessmentId::for_pair(&enterprise_id, &program.id))?;
            let fetched = bounded(
                PROFILE_STORE,
                budget,
                self.collaborators.profiles.get_snapshot(&enterprise_id),
            )
            .await;

            let snapshot = match fetched {
                Ok(Some(mut snapshot)) => {
                    if let Some(previous) = &existing {
                        snapshot.absorb_verified(&previous.snapshot);
                    }
                    snapshot
                }
                Ok(None) => {
                    debug!(enterprise_id = %enterprise_id, "enterprise has no profile, skipping");
                    continue;
                }
                Err(error) => {
                    warn!(
                        enterprise_id = %enterprise_id,
                        error = %error,
                        "profile unavailable, scoring with stored data"
                    );
                    degraded.push(enterprise_id.clone());
                    existing
                        .as_ref()
                        .map(|previous| previous.snapshot.clone())
                        .unwrap_or_else(|| EnterpriseSnapshot::unavailable(enterprise_id, today))
                }
            };
            inputs.push((snapshot, existing));
        }

        // Scoring is CPU-bound; keep it off the async workers.
        let engine = Arc::clone(&self.engine);
        let scored_program = program.clone();
        let evaluated: Vec<(Assessment, EnterpriseSnapshot, Option<AssessmentRecord>)> =
            tokio::task::spawn_blocking(move || {
                inputs
                    .into_par_iter()
                    .map(|(snapshot, existing)| {
                        let assessment = match &existing {
                            Some(previous) => {
                                engine.reevaluate(&previous.assessment, &snapshot, &scored_program)
                            }
                            None => engine.evaluate(&snapshot, &scored_program),
                        };
                        (assessment, snapshot, existing)
                    })
                    .collect()
            })
            .await?;

        let mut summary = ScreeningRunSummary {
            program_id: program.id.clone(),
            run_at: Utc::now(),
            evaluated: evaluated.len(),
            created: 0,
            updated: 0,
            unchanged: 0,
            qualified: 0,
            degraded,
            conflicts: Vec::new(),
            flagged_rules: program
                .rules
                .iter()
                .filter_map(|rule| {
                    rule.validate().err().map(|error| FlaggedRule {
                        rule_id: rule.id.clone(),
                        reason: error.to_string(),
                    })
                })
                .collect(),
        };

        for (mut assessment, snapshot, existing) in evaluated {
            match existing {
                None => {
                    let opened = assessment.touch_state.map(|to| TransitionOutcome {
                        action: "screen",
                        from: None,
                        to,
                        cause: Some(format!("graded {}", assessment.grade.label())),
                        prior_assignee: None,
                    });
                    match self.repository.insert(AssessmentRecord::new(assessment, snapshot)) {
                        Ok(stored) => {
                            summary.created += 1;
                            summary.qualified += usize::from(stored.assessment.grade.qualifies());
                            self.log_changes(&stored, opened.into_iter().collect(), &Actor::System)?;
                        }
                        Err(RepositoryError::Conflict(id)) => {
                            warn!(assessment_id = %id, "assessment created concurrently");
                            summary.conflicts.push(id);
                        }
                        Err(other) => return Err(other.into()),
                    }
                }
                Some(previous) => {
                    let regraded = lifecycle::reconcile_grade(&mut assessment);
                    summary.qualified += usize::from(assessment.grade.qualifies());
                    if previous.assessment == assessment && previous.snapshot == snapshot {
                        summary.unchanged += 1;
                        continue;
                    }
                    let record = AssessmentRecord {
                        assessment,
                        snapshot,
                        diagnosis: previous.diagnosis.clone(),
                    };
                    match self.commit(previous.version(), record) {
                        Ok(stored) => {
                            summary.updated += 1;
                            self.log_changes(&stored, regraded.into_iter().collect(), &Actor::System)?;
                        }
                        Err(OutreachServiceError::ConcurrentTransitionConflict { assessment_id }) => {
                            summary.conflicts.push(assessment_id);
                        }
                        Err(other) => return Err(other),
                    }
                }
            }
        }

        info!(
            program = %summary.program_id,
            evaluated = summary.evaluated,
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            degraded = summary.degraded.len(),
            conflicts = summary.conflicts.len(),
            "screening run finished"
        );
        Ok(summary)
    }

    /// Apply one workflow action under compare-and-swap.
    pub fn transition(
        &self,
        id: &AssessmentId,
        request: TransitionRequest,
    ) -> Result<Assessment, OutreachServiceError> {
        let record = self.record(id)?;
        if let Some(expected) = request.expected_state {
            if record.assessment.touch_state != Some(expected) {
                warn!(
                    assessment_id = %id,
                    expected = expected.label(),
                    "touch state moved before transition"
                );
                return Err(OutreachServiceError::ConcurrentTransitionConflict {
                    assessment_id: id.clone(),
                });
            }
        }

        let mut next = record.clone();
        let outcome = lifecycle::apply(&mut next.assessment, &request.action, &request.actor)?;
        if matches!(request.action, TouchAction::ResubmitMaterials { .. }) {
            let program = self.program(&next.assessment.program_id)?;
            next.diagnosis = Some(diagnose(&self.engine, &next.assessment, &next.snapshot, program));
        }

        let stored = self.commit(record.version(), next)?;
        self.log_changes(&stored, vec![outcome], &request.actor)?;
        Ok(stored.assessment)
    }

    pub async fn suggest_allocation(
        &self,
        id: &AssessmentId,
    ) -> Result<AllocationSuggestion, OutreachServiceError> {
        let record = self.record(id)?;
        let roster = bounded(
            ROSTER,
            self.settings.collaborator_timeout(),
            self.collaborators.roster.list(),
        )
        .await?;
        Ok(self.allocator().suggest(&record.assessment, &roster)?)
    }

    /// Assign the case to the chosen caseworker and log whether the suggestion
    /// was accepted or overridden. Screened cases are queued first.
    pub async fn accept_allocation(
        &self,
        id: &AssessmentId,
        decision: AllocationDecision,
    ) -> Result<AllocationReceipt, OutreachServiceError> {
        let record = self.record(id)?;
        let roster = bounded(
            ROSTER,
            self.settings.collaborator_timeout(),
            self.collaborators.roster.list(),
        )
        .await?;
        let allocator = self.allocator();
        let suggestion = allocator.suggest(&record.assessment, &roster)?;
        let feedback = allocator.feedback(
            &record.assessment,
            &suggestion,
            &decision.caseworker_id,
            &roster,
            Utc::now(),
        )?;

        let mut next = record.clone();
        let mut outcomes = Vec::with_capacity(2);
        if next.assessment.touch_state == Some(TouchState::Screened) {
            outcomes.push(lifecycle::apply(
                &mut next.assessment,
                &TouchAction::Queue,
                &decision.actor,
            )?);
        }
        outcomes.push(lifecycle::apply(
            &mut next.assessment,
            &TouchAction::Assign {
                caseworker_id: decision.caseworker_id.clone(),
            },
            &decision.actor,
        )?);

        let stored = self.commit(record.version(), next)?;
        self.log_changes(&stored, outcomes, &decision.actor)?;
        self.repository.record_feedback(feedback.clone())?;
        info!(
            assessment_id = %id,
            caseworker_id = %decision.caseworker_id,
            outcome = ?feedback.outcome,
            "allocation recorded"
        );

        Ok(AllocationReceipt {
            assessment: stored.assessment,
            feedback,
        })
    }

    /// Diagnose a willing company and move its case to diagnosed.
    pub fn run_diagnosis(
        &self,
        id: &AssessmentId,
        actor: Actor,
    ) -> Result<Diagnosis, OutreachServiceError> {
        let record = self.record(id)?;
        let program = self.program(&record.assessment.program_id)?;

        let mut next = record.clone();
        let outcome = lifecycle::apply(&mut next.assessment, &TouchAction::CompleteDiagnosis, &actor)?;
        let diagnosis = diagnose(&self.engine, &record.assessment, &record.snapshot, program);
        next.diagnosis = Some(diagnosis.clone());

        let stored = self.commit(record.version(), next)?;
        self.log_changes(&stored, vec![outcome], &actor)?;
        info!(
            assessment_id = %id,
            score = diagnosis.score,
            recommendation = diagnosis.recommendation.label(),
            missing_required = diagnosis.missing_required.len(),
            "diagnosis completed"
        );
        Ok(diagnosis)
    }

    /// Promote confirmed visit findings into the snapshot and re-evaluate.
    /// When the visit store is unavailable the assessment is left as it is.
    pub async fn backfill_from_visits(
        &self,
        id: &AssessmentId,
    ) -> Result<BackfillSummary, OutreachServiceError> {
        let record = self.record(id)?;
        let findings = match bounded(
            VISIT_RECORDS,
            self.settings.collaborator_timeout(),
            self.collaborators
                .visits
                .get_confirmed_findings(&record.assessment.enterprise_id),
        )
        .await
        {
            Ok(findings) => findings,
            Err(error) => {
                warn!(assessment_id = %id, error = %error, "visit findings unavailable");
                return Ok(BackfillSummary {
                    assessment: record.assessment,
                    promoted: 0,
                    resolved: Vec::new(),
                    degraded: true,
                });
            }
        };

        let mut snapshot = record.snapshot.clone();
        let promoted = snapshot.merge_findings(&findings);
        if promoted == 0 {
            return Ok(BackfillSummary {
                assessment: record.assessment,
                promoted,
                resolved: Vec::new(),
                degraded: false,
            });
        }

        let program = self.program(&record.assessment.program_id)?;
        let mut assessment = self.engine.reevaluate(&record.assessment, &snapshot, program);
        let regraded = lifecycle::reconcile_grade(&mut assessment);
        let resolved: Vec<RuleId> = record
            .assessment
            .pending_rules()
            .into_iter()
            .filter(|before| {
                assessment
                    .result_for(&before.rule_id)
                    .map_or(false, |after| after.outcome.is_decided())
            })
            .map(|before| before.rule_id.clone())
            .collect();

        let next = AssessmentRecord {
            assessment,
            snapshot,
            diagnosis: record.diagnosis.clone(),
        };
        let stored = self.commit(record.version(), next)?;
        self.log_changes(&stored, regraded.into_iter().collect(), &Actor::System)?;
        info!(
            assessment_id = %id,
            promoted,
            resolved = resolved.len(),
            grade = stored.assessment.grade.label(),
            "visit findings backfilled"
        );

        Ok(BackfillSummary {
            assessment: stored.assessment,
            promoted,
            resolved,
            degraded: false,
        })
    }

    /// Admin decision on one rule; the grade is recomputed with an override cause.
    pub fn override_rule_result(
        &self,
        id: &AssessmentId,
        rule_id: &RuleId,
        request: RuleOverride,
    ) -> Result<Assessment, OutreachServiceError> {
        let record = self.record(id)?;
        let mut next = record.clone();
        self.engine.override_rule(
            &mut next.assessment,
            rule_id,
            request.outcome,
            &request.admin,
            &request.cause,
        )?;
        let regraded = lifecycle::reconcile_grade(&mut next.assessment);

        let stored = self.commit(record.version(), next)?;
        let actor = Actor::Admin {
            name: request.admin.clone(),
        };
        self.log_changes(&stored, regraded.into_iter().collect(), &actor)?;
        info!(
            assessment_id = %id,
            rule_id = %rule_id,
            outcome = request.outcome.label(),
            admin = %request.admin,
            grade = stored.assessment.grade.label(),
            "rule result overridden"
        );
        Ok(stored.assessment)
    }

    pub async fn submit_match_query(&self, text: &str) -> Result<MatchResult, OutreachServiceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(OutreachServiceError::InvalidRequest(
                "demand text must not be empty".to_string(),
            ));
        }
        let budget = self.settings.collaborator_timeout();

        let (sub_tasks, degraded) =
            match bounded(DEMAND_PARSER, budget, self.collaborators.parser.parse(text)).await {
                Ok(sub_tasks) if !sub_tasks.is_empty() => (sub_tasks, false),
                Ok(_) => {
                    warn!("demand parser returned no sub-tasks, falling back to keywords");
                    (vec![SubTask::from_keywords(text)], true)
                }
                Err(error) => {
                    warn!(error = %error, "demand parser unavailable, falling back to keywords");
                    (vec![SubTask::from_keywords(text)], true)
                }
            };

        let candidates = bounded(DIRECTORY, budget, self.collaborators.directory.candidates()).await?;
        let rankings = rank_candidates(&sub_tasks, &candidates, self.today());
        let result = MatchResult::assemble(text, rankings, &self.settings.match_settings(), degraded);
        info!(
            sub_tasks = result.sub_tasks.len(),
            partners = result.combination.partners.len(),
            degraded,
            "match query answered"
        );
        Ok(result)
    }

    pub fn assessment(&self, id: &AssessmentId) -> Result<AssessmentRecord, OutreachServiceError> {
        self.record(id)
    }

    pub fn history(&self, id: &AssessmentId) -> Result<Vec<TouchStateChange>, OutreachServiceError> {
        self.record(id)?;
        Ok(self.repository.history(id)?)
    }

    pub fn list(&self, filter: &AssessmentFilter) -> Result<Vec<Assessment>, OutreachServiceError> {
        Ok(self
            .repository
            .list(filter)?
            .into_iter()
            .map(|record| record.assessment)
            .collect())
    }

    /// Cases currently assigned to one caseworker.
    pub fn my_tasks(&self, caseworker_id: &CaseworkerId) -> Result<Vec<Assessment>, OutreachServiceError> {
        self.list(&AssessmentFilter::for_caseworker(caseworker_id.clone()))
    }

    pub fn stats(&self, program_id: &ProgramId) -> Result<PolicyStats, OutreachServiceError> {
        self.program(program_id)?;
        let records = self
            .repository
            .list(&AssessmentFilter::for_program(program_id.clone()))?;
        let history = self.histories(&records)?;
        Ok(PolicyStats::compute(program_id, &records, &history))
    }

    pub fn caseworker_progress(&self) -> Result<Vec<CaseworkerProgress>, OutreachServiceError> {
        let records = self.repository.list(&AssessmentFilter::default())?;
        let history = self.histories(&records)?;
        Ok(CaseworkerProgress::compute(&records, &history))
    }

    fn histories(
        &self,
        records: &[AssessmentRecord],
    ) -> Result<Vec<TouchStateChange>, OutreachServiceError> {
        let mut history = Vec::new();
        for record in records {
            history.extend(self.repository.history(record.id())?);
        }
        Ok(history)
    }

    pub fn allocation_weights(&self) -> AllocationWeights {
        self.allocator().weights
    }

    /// Fold the whole feedback log into allocation weights and start using them.
    /// The log is replayed from the default weights, so repeated calls over the
    /// same log land on the same weights.
    pub fn recalibrate_allocation_weights(&self) -> Result<AllocationWeights, OutreachServiceError> {
        let feedback = self.repository.feedback()?;
        let mut allocator = self
            .allocator
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        allocator.weights = recalibrate(AllocationWeights::default(), &feedback);
        info!(
            entries = feedback.len(),
            tag_overlap = allocator.weights.tag_overlap,
            conversion_rate = allocator.weights.conversion_rate,
            open_load = allocator.weights.open_load,
            "allocation weights recalibrated"
        );
        Ok(allocator.weights)
    }
}

/// Error raised by the outreach service.
#[derive(Debug, thiserror::Error)]
pub enum OutreachServiceError {
    #[error("unknown policy program {0}")]
    UnknownProgram(ProgramId),
    #[error("assessment {0} not found")]
    NotFound(AssessmentId),
    #[error("assessment {assessment_id} changed concurrently; reload and retry")]
    ConcurrentTransitionConflict { assessment_id: AssessmentId },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Override(#[from] OverrideError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("screening evaluation aborted: {0}")]
    Evaluation(#[from] tokio::task::JoinError),
}

impl OutreachServiceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            OutreachServiceError::ConcurrentTransitionConflict { .. } => true,
            OutreachServiceError::Collaborator(error) => error.is_timeout(),
            _ => false,
        }
    }
}
