//! Outreach lifecycle for qualified assessments.
//!
//! Forward path: screened, pending, assigned, visited, then willing or unwilling.
//! Willing cases are diagnosed and end approved or rejected, or bounce through
//! returned_for_materials until resubmitted. Administrators may demote an active case
//! (low routing priority, re-queueable) or exclude it outright.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Assessment, AssessmentId, CaseworkerId, Grade, RoutingPriority, TouchState, VisitRecordId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TouchAction {
    Queue,
    Assign {
        caseworker_id: CaseworkerId,
    },
    Reassign {
        caseworker_id: CaseworkerId,
        reason: String,
    },
    RecordVisit {
        visit_record_id: VisitRecordId,
    },
    MarkWilling {
        note: String,
    },
    MarkUnwilling {
        note: String,
    },
    CompleteDiagnosis,
    Approve,
    Reject {
        reason: String,
    },
    ReturnForMaterials {
        missing: Vec<String>,
    },
    ResubmitMaterials {
        documents: Vec<String>,
    },
    Demote {
        cause: String,
    },
    Exclude {
        cause: String,
    },
}

impl TouchAction {
    pub const fn label(&self) -> &'static str {
        match self {
            TouchAction::Queue => "queue",
            TouchAction::Assign { .. } => "assign",
            TouchAction::Reassign { .. } => "reassign",
            TouchAction::RecordVisit { .. } => "record_visit",
            TouchAction::MarkWilling { .. } => "mark_willing",
            TouchAction::MarkUnwilling { .. } => "mark_unwilling",
            TouchAction::CompleteDiagnosis => "complete_diagnosis",
            TouchAction::Approve => "approve",
            TouchAction::Reject { .. } => "reject",
            TouchAction::ReturnForMaterials { .. } => "return_for_materials",
            TouchAction::ResubmitMaterials { .. } => "resubmit_materials",
            TouchAction::Demote { .. } => "demote",
            TouchAction::Exclude { .. } => "exclude",
        }
    }

    pub const fn is_admin_only(&self) -> bool {
        matches!(self, TouchAction::Demote { .. } | TouchAction::Exclude { .. })
    }
}

/// Who is driving a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Actor {
    Caseworker { id: CaseworkerId },
    Admin { name: String },
    System,
}

impl Actor {
    pub const fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin { .. })
    }

    pub fn name(&self) -> String {
        match self {
            Actor::Caseworker { id } => id.0.clone(),
            Actor::Admin { name } => name.clone(),
            Actor::System => "system".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("assessment {assessment_id} has no outreach case (grade {grade})")]
    NotTracked {
        assessment_id: AssessmentId,
        grade: &'static str,
    },
    #[error("{action} is not allowed from {from}")]
    InvalidTransition {
        action: &'static str,
        from: &'static str,
    },
    #[error("{action} requires {requirement}")]
    GuardViolated {
        action: &'static str,
        requirement: &'static str,
    },
    #[error("{action} is restricted to administrators")]
    Forbidden { action: &'static str },
}

/// Append-only audit entry for one touch-state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouchStateChange {
    pub assessment_id: AssessmentId,
    pub at: DateTime<Utc>,
    pub from: Option<TouchState>,
    pub to: TouchState,
    pub action: String,
    pub actor: Actor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_assignee: Option<CaseworkerId>,
    pub assessment_version: u64,
}

/// What a successful transition changed, before it is stamped into history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub action: &'static str,
    pub from: Option<TouchState>,
    pub to: TouchState,
    pub cause: Option<String>,
    pub prior_assignee: Option<CaseworkerId>,
}

impl TransitionOutcome {
    pub fn into_change(
        self,
        assessment_id: &AssessmentId,
        actor: &Actor,
        at: DateTime<Utc>,
        assessment_version: u64,
    ) -> TouchStateChange {
        TouchStateChange {
            assessment_id: assessment_id.clone(),
            at,
            from: self.from,
            to: self.to,
            action: self.action.to_string(),
            actor: actor.clone(),
            cause: self.cause,
            prior_assignee: self.prior_assignee,
            assessment_version,
        }
    }
}

fn require(
    condition: bool,
    action: &'static str,
    requirement: &'static str,
) -> Result<(), TransitionError> {
    if condition {
        Ok(())
    } else {
        Err(TransitionError::GuardViolated {
            action,
            requirement,
        })
    }
}

fn non_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Apply an action to the assessment's outreach case. The assessment is only
/// modified when the transition is allowed and every guard holds.
pub fn apply(
    assessment: &mut Assessment,
    action: &TouchAction,
    actor: &Actor,
) -> Result<TransitionOutcome, TransitionError> {
    use TouchState as S;

    let label = action.label();
    if action.is_admin_only() && !actor.is_admin() {
        return Err(TransitionError::Forbidden { action: label });
    }

    let from = assessment
        .touch_state
        .ok_or_else(|| TransitionError::NotTracked {
            assessment_id: assessment.id.clone(),
            grade: assessment.grade.label(),
        })?;
    let invalid = || TransitionError::InvalidTransition {
        action: label,
        from: from.label(),
    };

    let mut cause = None;
    let mut prior_assignee = None;

    let to = match (action, from) {
        (TouchAction::Queue, S::Screened) => S::Pending,
        (TouchAction::Queue, S::Demoted) => {
            // A re-queued case goes back to allocation without its old caseworker.
            prior_assignee = assessment.assignment.assignee.take();
            assessment.assignment.visit_record_id = None;
            S::Pending
        }
        (TouchAction::Assign { caseworker_id }, S::Pending) => {
            require(non_blank(&caseworker_id.0), label, "a caseworker")?;
            prior_assignee = assessment
                .assignment
                .assignee
                .replace(caseworker_id.clone());
            S::Assigned
        }
        (
            TouchAction::Reassign {
                caseworker_id,
                reason,
            },
            S::Assigned,
        ) => {
            require(non_blank(&caseworker_id.0), label, "a caseworker")?;
            require(non_blank(reason), label, "a reason")?;
            prior_assignee = assessment.assignment.assignee.clone();
            assessment.assignment.assignee = Some(caseworker_id.clone());
            cause = Some(reason.clone());
            S::Assigned
        }
        (TouchAction::RecordVisit { visit_record_id }, S::Assigned) => {
            require(
                assessment.assignment.assignee.is_some(),
                label,
                "an assigned caseworker",
            )?;
            require(non_blank(&visit_record_id.0), label, "a visit record")?;
            assessment.assignment.visit_record_id = Some(visit_record_id.clone());
            S::Visited
        }
        (TouchAction::MarkWilling { note }, S::Visited) => {
            require(non_blank(note), label, "a caseworker note")?;
            assessment.assignment.caseworker_note = Some(note.clone());
            S::Willing
        }
        (TouchAction::MarkUnwilling { note }, S::Visited) => {
            require(non_blank(note), label, "a caseworker note")?;
            assessment.assignment.caseworker_note = Some(note.clone());
            S::Unwilling
        }
        (TouchAction::CompleteDiagnosis, S::Willing) => S::Diagnosed,
        (TouchAction::Approve, S::Diagnosed) => S::Approved,
        (TouchAction::Reject { reason }, S::Diagnosed) => {
            require(non_blank(reason), label, "a reason")?;
            cause = Some(reason.clone());
            S::Rejected
        }
        (TouchAction::ReturnForMaterials { missing }, S::Diagnosed) => {
            require(!missing.is_empty(), label, "the missing materials")?;
            cause = Some(format!("missing: {}", missing.join(", ")));
            S::ReturnedForMaterials
        }
        (TouchAction::ResubmitMaterials { documents }, S::ReturnedForMaterials) => {
            require(!documents.is_empty(), label, "at least one document")?;
            for document in documents {
                if !assessment.resubmitted_documents.contains(document) {
                    assessment.resubmitted_documents.push(document.clone());
                }
            }
            S::Diagnosed
        }
        (TouchAction::Demote { cause: reason }, state)
            if !state.is_terminal() && state != S::Demoted =>
        {
            require(non_blank(reason), label, "a cause")?;
            assessment.routing_priority = RoutingPriority::Low;
            cause = Some(reason.clone());
            S::Demoted
        }
        (TouchAction::Exclude { cause: reason }, state) if !state.is_terminal() => {
            require(non_blank(reason), label, "a cause")?;
            cause = Some(reason.clone());
            S::Excluded
        }
        _ => return Err(invalid()),
    };

    assessment.touch_state = Some(to);
    Ok(TransitionOutcome {
        action: label,
        from: Some(from),
        to,
        cause,
        prior_assignee,
    })
}

/// Adjust the touch state after a regrade. A live case whose grade falls to
/// unqualified is closed, and a newly qualifying grade opens a screened case.
pub fn reconcile_grade(assessment: &mut Assessment) -> Option<TransitionOutcome> {
    match (assessment.grade, assessment.touch_state) {
        (Grade::Unqualified, Some(state)) if !state.is_terminal() => {
            assessment.touch_state = Some(TouchState::Unqualified);
            Some(TransitionOutcome {
                action: "regrade",
                from: Some(state),
                to: TouchState::Unqualified,
                cause: Some(format!("grade dropped to {}", Grade::Unqualified.label())),
                prior_assignee: None,
            })
        }
        (grade, None) if grade.qualifies() => {
            assessment.touch_state = Some(TouchState::Screened);
            Some(TransitionOutcome {
                action: "regrade",
                from: None,
                to: TouchState::Screened,
                cause: Some(format!("grade rose to {}", grade.label())),
                prior_assignee: None,
            })
        }
        _ => None,
    }
}
