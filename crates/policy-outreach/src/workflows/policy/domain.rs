use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::catalog::RuleKind;

/// Identifier wrapper for a resident company.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnterpriseId(pub String);

/// Identifier wrapper for a policy program (e.g. high-tech recognition).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProgramId(pub String);

/// Assessments are unique per (enterprise, program), so the id is derived from both.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssessmentId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaseworkerId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisitRecordId(pub String);

impl AssessmentId {
    pub fn for_pair(enterprise_id: &EnterpriseId, program_id: &ProgramId) -> Self {
        Self(format!("{}:{}", enterprise_id.0, program_id.0))
    }
}

macro_rules! display_id {
    ($($name:ident),*) => {
        $(impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_id!(EnterpriseId, ProgramId, AssessmentId, RuleId, CaseworkerId, VisitRecordId);

/// Typed value of a single snapshot field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Number(f64),
    Flag(bool),
    Text(String),
    Date(NaiveDate),
    List(Vec<String>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(value) => write!(f, "{value}"),
            FieldValue::Flag(value) => write!(f, "{value}"),
            FieldValue::Text(value) => f.write_str(value),
            FieldValue::Date(value) => write!(f, "{value}"),
            FieldValue::List(values) => f.write_str(&values.join(", ")),
        }
    }
}

/// Unverified value (enrichment, AI-extracted visit notes) awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEstimate {
    pub value: FieldValue,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Point-in-time view of a company's profile as supplied by the profile store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnterpriseSnapshot {
    pub enterprise_id: EnterpriseId,
    pub name: String,
    pub captured_on: NaiveDate,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub estimates: BTreeMap<String, FieldEstimate>,
}

impl EnterpriseSnapshot {
    pub fn new(enterprise_id: EnterpriseId, name: impl Into<String>, captured_on: NaiveDate) -> Self {
        Self {
            enterprise_id,
            name: name.into(),
            captured_on,
            tags: Vec::new(),
            fields: BTreeMap::new(),
            estimates: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: &str, value: FieldValue) -> Self {
        self.fields.insert(field.to_string(), value);
        self
    }

    pub fn with_estimate(mut self, field: &str, value: FieldValue, confidence: Confidence) -> Self {
        self.estimates.insert(
            field.to_string(),
            FieldEstimate {
                value,
                confidence,
                source: None,
            },
        );
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Promote confirmed findings to verified fields. Existing verified values win,
    /// so a snapshot only ever gains information. Returns how many fields were added.
    pub fn merge_findings(&mut self, findings: &[ConfirmedFinding]) -> usize {
        let mut added = 0;
        for finding in findings {
            if self.fields.contains_key(&finding.field) {
                continue;
            }
            self.estimates.remove(&finding.field);
            self.fields.insert(finding.field.clone(), finding.value.clone());
            added += 1;
        }
        added
    }

    /// Carry verified fields from an earlier snapshot that this one lacks.
    pub fn absorb_verified(&mut self, earlier: &EnterpriseSnapshot) {
        for (field, value) in &earlier.fields {
            if !self.fields.contains_key(field) {
                self.estimates.remove(field);
                self.fields.insert(field.clone(), value.clone());
            }
        }
    }

    /// Snapshot with no data at all, used when the profile store cannot answer.
    pub fn unavailable(enterprise_id: EnterpriseId, captured_on: NaiveDate) -> Self {
        let name = enterprise_id.0.clone();
        Self::new(enterprise_id, name, captured_on)
    }
}

/// Finding confirmed by a caseworker after a visit, keyed by snapshot field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedFinding {
    pub field: String,
    pub value: FieldValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_record_id: Option<VisitRecordId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub const fn label(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Pass,
    Fail,
    Pending,
}

impl RuleOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            RuleOutcome::Pass => "pass",
            RuleOutcome::Fail => "fail",
            RuleOutcome::Pending => "pending",
        }
    }

    pub const fn is_decided(self) -> bool {
        !matches!(self, RuleOutcome::Pending)
    }
}

/// Who caused a score, grade or rule result to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationCause {
    Automatic,
    AdminOverride { by: String, cause: String },
}

impl MutationCause {
    pub fn is_override(&self) -> bool {
        matches!(self, MutationCause::AdminOverride { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            MutationCause::Automatic => "automatic",
            MutationCause::AdminOverride { .. } => "admin_override",
        }
    }
}

/// Outcome of one rule within an assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub kind: RuleKind,
    pub weight: f64,
    pub outcome: RuleOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<FieldValue>,
    pub required: String,
    pub source: MutationCause,
}

/// Rule left out of scoring because its definition is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedRule {
    pub rule_id: RuleId,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    #[serde(rename = "unqualified")]
    Unqualified,
}

impl Grade {
    pub const fn label(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::Unqualified => "unqualified",
        }
    }

    /// Grades that open an outreach case.
    pub const fn qualifies(self) -> bool {
        matches!(self, Grade::A | Grade::B)
    }
}

/// Outreach lifecycle of a qualified assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchState {
    Screened,
    Pending,
    Assigned,
    Visited,
    Willing,
    Unwilling,
    Diagnosed,
    ReturnedForMaterials,
    Approved,
    Rejected,
    Demoted,
    Unqualified,
    Excluded,
}

impl TouchState {
    pub const fn label(self) -> &'static str {
        match self {
            TouchState::Screened => "screened",
            TouchState::Pending => "pending",
            TouchState::Assigned => "assigned",
            TouchState::Visited => "visited",
            TouchState::Willing => "willing",
            TouchState::Unwilling => "unwilling",
            TouchState::Diagnosed => "diagnosed",
            TouchState::ReturnedForMaterials => "returned_for_materials",
            TouchState::Approved => "approved",
            TouchState::Rejected => "rejected",
            TouchState::Demoted => "demoted",
            TouchState::Unqualified => "unqualified",
            TouchState::Excluded => "excluded",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            TouchState::Approved
                | TouchState::Rejected
                | TouchState::Unqualified
                | TouchState::Excluded
        )
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let state = match raw.trim().to_ascii_lowercase().as_str() {
            "screened" => TouchState::Screened,
            "pending" => TouchState::Pending,
            "assigned" => TouchState::Assigned,
            "visited" => TouchState::Visited,
            "willing" => TouchState::Willing,
            "unwilling" => TouchState::Unwilling,
            "diagnosed" => TouchState::Diagnosed,
            "returned_for_materials" => TouchState::ReturnedForMaterials,
            "approved" => TouchState::Approved,
            "rejected" => TouchState::Rejected,
            "demoted" => TouchState::Demoted,
            "unqualified" => TouchState::Unqualified,
            "excluded" => TouchState::Excluded,
            _ => return None,
        };
        Some(state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPriority {
    #[default]
    Normal,
    Low,
}

/// Caseworker ownership of an outreach case.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaseAssignment {
    pub assignee: Option<CaseworkerId>,
    pub visit_record_id: Option<VisitRecordId>,
    pub caseworker_note: Option<String>,
}

/// Result of evaluating one enterprise against one program, plus its outreach case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: AssessmentId,
    pub enterprise_id: EnterpriseId,
    pub enterprise_name: String,
    pub program_id: ProgramId,
    pub program_version: u32,
    pub version: u64,
    pub evaluated_on: NaiveDate,
    pub tags: BTreeSet<String>,
    pub rule_results: Vec<RuleResult>,
    pub flagged_rules: Vec<FlaggedRule>,
    pub score: f64,
    pub grade: Grade,
    pub grade_cause: MutationCause,
    pub touch_state: Option<TouchState>,
    pub routing_priority: RoutingPriority,
    pub assignment: CaseAssignment,
    #[serde(default)]
    pub resubmitted_documents: Vec<String>,
}

impl Assessment {
    pub fn result_for(&self, rule_id: &RuleId) -> Option<&RuleResult> {
        self.rule_results
            .iter()
            .find(|result| &result.rule_id == rule_id)
    }

    pub fn count(&self, outcome: RuleOutcome) -> usize {
        self.rule_results
            .iter()
            .filter(|result| result.outcome == outcome)
            .count()
    }

    pub fn pending_rules(&self) -> Vec<&RuleResult> {
        self.rule_results
            .iter()
            .filter(|result| result.outcome == RuleOutcome::Pending)
            .collect()
    }

    pub fn has_hard_failure(&self) -> bool {
        self.rule_results
            .iter()
            .any(|result| result.kind == RuleKind::Hard && result.outcome == RuleOutcome::Fail)
    }
}
