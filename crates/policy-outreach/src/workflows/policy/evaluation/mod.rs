mod config;
mod grading;
pub(crate) mod rules;

pub use config::{ConfidenceFactors, EvaluationConfig, GradeThresholds};
pub use grading::OverrideError;

use std::collections::BTreeSet;

use tracing::warn;

use super::catalog::PolicyProgram;
use super::domain::{
    Assessment, AssessmentId, CaseAssignment, EnterpriseSnapshot, FlaggedRule, Grade, MutationCause,
    RoutingPriority, RuleId, RuleOutcome, RuleResult, TouchState,
};

/// Stateless evaluator applying a program's rules to an enterprise snapshot.
///
/// `evaluate` is a pure function of its inputs: the same snapshot and program always
/// produce the same assessment, which keeps screening runs replayable.
#[derive(Debug, Clone, Default)]
pub struct EvaluationEngine {
    config: EvaluationConfig,
}

impl EvaluationEngine {
    pub fn new(config: EvaluationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    pub fn evaluate(&self, snapshot: &EnterpriseSnapshot, program: &PolicyProgram) -> Assessment {
        let (rule_results, flagged_rules) = self.score_rules(snapshot, program);

        let tags: BTreeSet<String> = snapshot
            .tags
            .iter()
            .chain(program.focus_tags.iter())
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect();

        let mut assessment = Assessment {
            id: AssessmentId::for_pair(&snapshot.enterprise_id, &program.id),
            enterprise_id: snapshot.enterprise_id.clone(),
            enterprise_name: snapshot.name.clone(),
            program_id: program.id.clone(),
            program_version: program.version,
            version: 1,
            evaluated_on: snapshot.captured_on,
            tags,
            rule_results,
            flagged_rules,
            score: 0.0,
            grade: Grade::Unqualified,
            grade_cause: MutationCause::Automatic,
            touch_state: None,
            routing_priority: RoutingPriority::Normal,
            assignment: CaseAssignment::default(),
            resubmitted_documents: Vec::new(),
        };
        grading::regrade(&mut assessment, &self.config, MutationCause::Automatic);
        if assessment.grade.qualifies() {
            assessment.touch_state = Some(TouchState::Screened);
        }
        assessment
    }

    /// Re-evaluate an existing assessment against a newer snapshot. Decided and
    /// overridden results are preserved and the outreach case carries over unchanged.
    pub fn reevaluate(
        &self,
        previous: &Assessment,
        snapshot: &EnterpriseSnapshot,
        program: &PolicyProgram,
    ) -> Assessment {
        let fresh = self.evaluate(snapshot, program);
        let rule_results = grading::enforce_monotonic(&previous.rule_results, fresh.rule_results);

        let mut next = Assessment {
            rule_results,
            version: previous.version,
            touch_state: previous.touch_state,
            routing_priority: previous.routing_priority,
            assignment: previous.assignment.clone(),
            resubmitted_documents: previous.resubmitted_documents.clone(),
            ..fresh
        };
        grading::regrade(&mut next, &self.config, MutationCause::Automatic);
        if next.grade == previous.grade && next.score == previous.score {
            next.grade_cause = previous.grade_cause.clone();
        }
        next
    }

    /// Record an admin decision for one rule and regrade with an override cause.
    pub fn override_rule(
        &self,
        assessment: &mut Assessment,
        rule_id: &RuleId,
        outcome: RuleOutcome,
        by: &str,
        cause: &str,
    ) -> Result<(), OverrideError> {
        grading::apply_override(assessment, rule_id, outcome, by, cause, &self.config)
    }

    /// Credit one rule result earns, as used by diagnosis items.
    pub(crate) fn earned(&self, result: &RuleResult) -> f64 {
        grading::earned(result, &self.config)
    }

    fn score_rules(
        &self,
        snapshot: &EnterpriseSnapshot,
        program: &PolicyProgram,
    ) -> (Vec<RuleResult>, Vec<FlaggedRule>) {
        let mut results = Vec::with_capacity(program.rules.len());
        let mut flagged = Vec::new();

        for rule in &program.rules {
            match rule.validate() {
                Ok(()) => results.push(rules::apply_rule(rule, snapshot)),
                Err(misconfigured) => {
                    warn!(
                        program = %program.id,
                        rule_id = %rule.id,
                        error = %misconfigured,
                        "skipping misconfigured rule"
                    );
                    flagged.push(FlaggedRule {
                        rule_id: rule.id.clone(),
                        reason: misconfigured.to_string(),
                    });
                }
            }
        }

        (results, flagged)
    }
}
