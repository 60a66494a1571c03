use std::collections::HashMap;

use tracing::debug;

use super::super::catalog::RuleKind;
use super::super::domain::{
    Assessment, Confidence, Grade, MutationCause, RuleId, RuleOutcome, RuleResult,
};
use super::config::EvaluationConfig;
use crate::scoring::weighted_percentage;

/// Credit a single rule earns toward the aggregate score.
pub(crate) fn earned(result: &RuleResult, config: &EvaluationConfig) -> f64 {
    match result.outcome {
        RuleOutcome::Pass => result.weight,
        RuleOutcome::Fail => 0.0,
        RuleOutcome::Pending => {
            result.weight * config.confidence_factor(result.confidence.unwrap_or(Confidence::Low))
        }
    }
}

pub(crate) fn score(results: &[RuleResult], config: &EvaluationConfig) -> f64 {
    weighted_percentage(
        results
            .iter()
            .map(|result| (earned(result, config), result.weight)),
    )
}

/// A failed hard rule dominates the score.
pub(crate) fn grade(results: &[RuleResult], score: f64, config: &EvaluationConfig) -> Grade {
    let hard_failure = results
        .iter()
        .any(|result| result.kind == RuleKind::Hard && result.outcome == RuleOutcome::Fail);
    if hard_failure {
        Grade::Unqualified
    } else {
        config.grade_for_score(score)
    }
}

/// Recompute score and grade from the current rule results.
pub(crate) fn regrade(assessment: &mut Assessment, config: &EvaluationConfig, cause: MutationCause) {
    assessment.score = score(&assessment.rule_results, config);
    assessment.grade = grade(&assessment.rule_results, assessment.score, config);
    assessment.grade_cause = cause;
}

/// Keep earlier decisions that a fresh evaluation would weaken. Overrides always
/// survive, and a decided rule never returns to pending.
pub(crate) fn enforce_monotonic(previous: &[RuleResult], fresh: Vec<RuleResult>) -> Vec<RuleResult> {
    let earlier: HashMap<&RuleId, &RuleResult> =
        previous.iter().map(|result| (&result.rule_id, result)).collect();

    fresh
        .into_iter()
        .map(|result| match earlier.get(&result.rule_id) {
            Some(prior) if prior.source.is_override() => (*prior).clone(),
            Some(prior) if prior.outcome.is_decided() && !result.outcome.is_decided() => {
                debug!(rule_id = %prior.rule_id, "keeping decided result over pending re-evaluation");
                (*prior).clone()
            }
            _ => result,
        })
        .collect()
}

/// Admin override rejected before touching the assessment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OverrideError {
    #[error("overrides must decide the rule; pending is not accepted")]
    PendingNotAllowed,
    #[error("rule {0} is not part of this assessment")]
    UnknownRule(RuleId),
    #[error("override cause must not be empty")]
    MissingCause,
}

pub(crate) fn apply_override(
    assessment: &mut Assessment,
    rule_id: &RuleId,
    outcome: RuleOutcome,
    by: &str,
    cause: &str,
    config: &EvaluationConfig,
) -> Result<(), OverrideError> {
    if outcome == RuleOutcome::Pending {
        return Err(OverrideError::PendingNotAllowed);
    }
    if cause.trim().is_empty() {
        return Err(OverrideError::MissingCause);
    }

    let source = MutationCause::AdminOverride {
        by: by.to_string(),
        cause: cause.to_string(),
    };
    let result = assessment
        .rule_results
        .iter_mut()
        .find(|result| &result.rule_id == rule_id)
        .ok_or_else(|| OverrideError::UnknownRule(rule_id.clone()))?;

    result.outcome = outcome;
    result.confidence = None;
    result.reason = Some(cause.to_string());
    result.source = source.clone();

    regrade(assessment, config, source);
    Ok(())
}
