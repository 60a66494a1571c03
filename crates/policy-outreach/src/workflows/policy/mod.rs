//! Policy eligibility grading and the outreach workflow built on it.

pub mod allocation;
pub mod catalog;
pub mod diagnosis;
pub mod domain;
pub(crate) mod evaluation;
pub mod lifecycle;
pub mod repository;
pub mod roster;
pub mod router;
pub mod service;
pub mod stats;

#[cfg(test)]
mod tests;

pub use allocation::{
    AllocationError, AllocationFeedback, AllocationSuggestion, AllocationWeights, Allocator,
    Caseworker, CaseworkerScore, FeedbackOutcome,
};
pub use catalog::{
    Comparator, DateUnit, DiagnosisProfile, DocumentRequirement, PolicyProgram, Rule, RuleCatalog,
    RuleKind, RuleMisconfigured, ThresholdOp,
};
pub use diagnosis::{
    ChecklistEntry, Diagnosis, DiagnosisItem, DocumentStatus, ItemCategory, ItemStatus,
    Recommendation,
};
pub use domain::{
    Assessment, AssessmentId, CaseAssignment, CaseworkerId, Confidence, ConfirmedFinding,
    EnterpriseId, EnterpriseSnapshot, FieldEstimate, FieldValue, FlaggedRule, Grade,
    MutationCause, ProgramId, RoutingPriority, RuleId, RuleOutcome, RuleResult, TouchState,
    VisitRecordId,
};
pub use evaluation::{ConfidenceFactors, EvaluationConfig, EvaluationEngine, GradeThresholds, OverrideError};
pub use lifecycle::{Actor, TouchAction, TouchStateChange, TransitionError};
pub use repository::{
    AssessmentFilter, AssessmentRecord, AssessmentRepository, MemoryAssessmentRepository,
    RepositoryError,
};
pub use roster::{import_roster, RosterImportError};
pub use router::outreach_router;
pub use service::{
    AllocationDecision, AllocationReceipt, BackfillSummary, OutreachService, OutreachServiceError,
    RuleOverride, ScreeningRunSummary, TransitionRequest,
};
pub use stats::{CaseworkerProgress, PolicyStats, TouchFunnel};
