//! Application readiness review for companies willing to apply.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::catalog::{DiagnosisProfile, PolicyProgram};
use super::domain::{
    Assessment, AssessmentId, EnterpriseSnapshot, FieldValue, FlaggedRule, ProgramId, RuleId,
    RuleOutcome, RuleResult,
};
use super::evaluation::{rules::apply_rule, EvaluationEngine};
use crate::scoring::{normalized_set, round_to, weighted_percentage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Core,
    Bonus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pass,
    Warning,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisItem {
    pub rule_id: RuleId,
    pub name: String,
    pub category: ItemCategory,
    pub score: f64,
    pub max_score: f64,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Collected,
    Missing,
    NotRequired,
}

impl DocumentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentStatus::Collected => "collected",
            DocumentStatus::Missing => "missing",
            DocumentStatus::NotRequired => "not_required",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistEntry {
    pub name: String,
    pub required: bool,
    pub status: DocumentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Hold,
    Submit,
    SubmitAfterFixes,
}

impl Recommendation {
    pub const fn label(self) -> &'static str {
        match self {
            Recommendation::Hold => "hold",
            Recommendation::Submit => "submit",
            Recommendation::SubmitAfterFixes => "submit_after_fixes",
        }
    }

    /// `hold` needs both a missing required document and a low score; `submit`
    /// needs a high score and a complete checklist.
    pub fn decide(score: f64, missing_required: bool, profile: &DiagnosisProfile) -> Self {
        if missing_required && score < profile.low_threshold {
            Recommendation::Hold
        } else if score >= profile.high_threshold && !missing_required {
            Recommendation::Submit
        } else {
            Recommendation::SubmitAfterFixes
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub assessment_id: AssessmentId,
    pub program_id: ProgramId,
    pub diagnosed_on: NaiveDate,
    pub score: f64,
    pub items: Vec<DiagnosisItem>,
    pub checklist: Vec<ChecklistEntry>,
    pub missing_required: Vec<String>,
    pub recommendation: Recommendation,
    /// Diagnosis rules skipped as misconfigured, for an admin to fix.
    #[serde(default)]
    pub flagged_rules: Vec<FlaggedRule>,
}

impl Diagnosis {
    pub fn items_in(&self, category: ItemCategory) -> impl Iterator<Item = &DiagnosisItem> {
        self.items
            .iter()
            .filter(move |item| item.category == category)
    }
}

/// Re-score a willing company against the program's core rules and its denser
/// diagnosis rules, then check the document list.
///
/// Core items reuse the assessment's rule results so overrides and confirmed
/// findings carry through.
pub fn diagnose(
    engine: &EvaluationEngine,
    assessment: &Assessment,
    snapshot: &EnterpriseSnapshot,
    program: &PolicyProgram,
) -> Diagnosis {
    let profile = &program.diagnosis;

    let mut flagged_rules = Vec::new();
    let mut bonus_results: Vec<RuleResult> = Vec::with_capacity(profile.rules.len());
    for rule in &profile.rules {
        match rule.validate() {
            Ok(()) => bonus_results.push(apply_rule(rule, snapshot)),
            Err(misconfigured) => {
                warn!(
                    program = %program.id,
                    rule_id = %rule.id,
                    error = %misconfigured,
                    "skipping misconfigured diagnosis rule"
                );
                flagged_rules.push(FlaggedRule {
                    rule_id: rule.id.clone(),
                    reason: misconfigured.to_string(),
                });
            }
        }
    }

    let items: Vec<DiagnosisItem> = assessment
        .rule_results
        .iter()
        .map(|result| item_for(engine, result, ItemCategory::Core))
        .chain(
            bonus_results
                .iter()
                .map(|result| item_for(engine, result, ItemCategory::Bonus)),
        )
        .collect();

    let score = weighted_percentage(items.iter().map(|item| (item.score, item.max_score)));
    let checklist = checklist(profile, snapshot, &assessment.resubmitted_documents);
    let missing_required: Vec<String> = checklist
        .iter()
        .filter(|entry| entry.status == DocumentStatus::Missing)
        .map(|entry| entry.name.clone())
        .collect();
    let recommendation = Recommendation::decide(score, !missing_required.is_empty(), profile);

    Diagnosis {
        assessment_id: assessment.id.clone(),
        program_id: program.id.clone(),
        diagnosed_on: snapshot.captured_on,
        score,
        items,
        checklist,
        missing_required,
        recommendation,
        flagged_rules,
    }
}

fn item_for(engine: &EvaluationEngine, result: &RuleResult, category: ItemCategory) -> DiagnosisItem {
    let (status, suggestion) = match result.outcome {
        RuleOutcome::Pass => (ItemStatus::Pass, None),
        RuleOutcome::Pending => (
            ItemStatus::Warning,
            Some(format!(
                "confirm \"{}\" with supporting evidence",
                result.rule_name
            )),
        ),
        RuleOutcome::Fail => (
            ItemStatus::Fail,
            Some(format!(
                "close the gap on \"{}\" (required {})",
                result.rule_name, result.required
            )),
        ),
    };

    DiagnosisItem {
        rule_id: result.rule_id.clone(),
        name: result.rule_name.clone(),
        category,
        score: round_to(engine.earned(result), 2),
        max_score: result.weight,
        status,
        suggestion,
    }
}

fn checklist(
    profile: &DiagnosisProfile,
    snapshot: &EnterpriseSnapshot,
    resubmitted: &[String],
) -> Vec<ChecklistEntry> {
    let mut supplied = match snapshot.fields.get(&profile.document_field) {
        Some(FieldValue::List(documents)) => documents.clone(),
        _ => Vec::new(),
    };
    supplied.extend(resubmitted.iter().cloned());
    let collected = normalized_set(&supplied);

    profile
        .documents
        .iter()
        .map(|document| {
            let status = if collected.contains(&document.name.trim().to_lowercase()) {
                DocumentStatus::Collected
            } else if document.required {
                DocumentStatus::Missing
            } else {
                DocumentStatus::NotRequired
            };
            ChecklistEntry {
                name: document.name.clone(),
                required: document.required,
                status,
            }
        })
        .collect()
}
