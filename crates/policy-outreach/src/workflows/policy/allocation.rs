//! Advisory caseworker suggestions for unassigned cases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Assessment, AssessmentId, CaseworkerId, TouchState};
use crate::scoring::{overlap_ratio, rank_descending, round_to};

/// Roster entry as supplied by the caseworker roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caseworker {
    pub id: CaseworkerId,
    pub name: String,
    pub specialty_tags: Vec<String>,
    pub conversion_rate: f64,
    pub open_load: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocationWeights {
    pub tag_overlap: f64,
    pub conversion_rate: f64,
    pub open_load: f64,
}

impl Default for AllocationWeights {
    fn default() -> Self {
        Self {
            tag_overlap: 0.5,
            conversion_rate: 0.35,
            open_load: 0.15,
        }
    }
}

pub const DEFAULT_LOAD_CAPACITY: u32 = 10;
const LEARNING_RATE: f64 = 0.05;
const WEIGHT_FLOOR: f64 = 0.05;

/// Feature breakdown for one caseworker against one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseworkerScore {
    pub caseworker_id: CaseworkerId,
    pub name: String,
    pub score: f64,
    pub tag_overlap: f64,
    pub conversion_rate: f64,
    pub load_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSuggestion {
    pub assessment_id: AssessmentId,
    pub top: CaseworkerScore,
    pub rationale: String,
    pub alternatives: Vec<CaseworkerScore>,
    pub weights: AllocationWeights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Accepted,
    Overridden,
}

/// Human decision on a suggestion, kept for weight recalibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationFeedback {
    pub assessment_id: AssessmentId,
    pub suggested: CaseworkerScore,
    pub chosen: CaseworkerScore,
    pub outcome: FeedbackOutcome,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    #[error("caseworker roster is empty")]
    EmptyRoster,
    #[error("caseworker {0} is not on the roster")]
    UnknownCaseworker(CaseworkerId),
    #[error("assessment {assessment_id} is already assigned to {assignee}")]
    AlreadyAssigned {
        assessment_id: AssessmentId,
        assignee: CaseworkerId,
    },
    #[error("assessment {assessment_id} is not awaiting assignment")]
    NotAwaitingAssignment { assessment_id: AssessmentId },
}

/// Scores caseworkers for a case. Deterministic for a fixed roster and assessment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allocator {
    pub weights: AllocationWeights,
    pub load_capacity: u32,
}

impl Default for Allocator {
    fn default() -> Self {
        Self {
            weights: AllocationWeights::default(),
            load_capacity: DEFAULT_LOAD_CAPACITY,
        }
    }
}

impl Allocator {
    pub fn new(weights: AllocationWeights, load_capacity: u32) -> Self {
        Self {
            weights,
            load_capacity: load_capacity.max(1),
        }
    }

    pub fn score(&self, assessment: &Assessment, caseworker: &Caseworker) -> CaseworkerScore {
        let case_tags: Vec<String> = assessment.tags.iter().cloned().collect();
        let tag_overlap = overlap_ratio(&case_tags, &caseworker.specialty_tags);
        let conversion_rate = caseworker.conversion_rate.clamp(0.0, 1.0);
        let load_ratio =
            (f64::from(caseworker.open_load) / f64::from(self.load_capacity.max(1))).min(1.0);

        let score = self.weights.tag_overlap * tag_overlap
            + self.weights.conversion_rate * conversion_rate
            - self.weights.open_load * load_ratio;

        CaseworkerScore {
            caseworker_id: caseworker.id.clone(),
            name: caseworker.name.clone(),
            score: round_to(score, 4),
            tag_overlap: round_to(tag_overlap, 4),
            conversion_rate,
            load_ratio: round_to(load_ratio, 4),
        }
    }

    pub fn suggest(
        &self,
        assessment: &Assessment,
        roster: &[Caseworker],
    ) -> Result<AllocationSuggestion, AllocationError> {
        ensure_allocatable(assessment)?;

        let mut ranked: Vec<CaseworkerScore> = roster
            .iter()
            .map(|caseworker| self.score(assessment, caseworker))
            .collect();
        rank_descending(
            &mut ranked,
            |entry| entry.score,
            |entry| entry.caseworker_id.0.as_str(),
        );

        let mut ranked = ranked.into_iter();
        let top = ranked.next().ok_or(AllocationError::EmptyRoster)?;
        let rationale = rationale(assessment, &top);

        Ok(AllocationSuggestion {
            assessment_id: assessment.id.clone(),
            top,
            rationale,
            alternatives: ranked.collect(),
            weights: self.weights,
        })
    }

    /// Pair the suggestion with the human choice for the feedback log.
    pub fn feedback(
        &self,
        assessment: &Assessment,
        suggestion: &AllocationSuggestion,
        chosen: &CaseworkerId,
        roster: &[Caseworker],
        recorded_at: DateTime<Utc>,
    ) -> Result<AllocationFeedback, AllocationError> {
        let caseworker = roster
            .iter()
            .find(|caseworker| &caseworker.id == chosen)
            .ok_or_else(|| AllocationError::UnknownCaseworker(chosen.clone()))?;

        let outcome = if &suggestion.top.caseworker_id == chosen {
            FeedbackOutcome::Accepted
        } else {
            FeedbackOutcome::Overridden
        };

        Ok(AllocationFeedback {
            assessment_id: assessment.id.clone(),
            suggested: suggestion.top.clone(),
            chosen: self.score(assessment, caseworker),
            outcome,
            recorded_at,
        })
    }
}

fn ensure_allocatable(assessment: &Assessment) -> Result<(), AllocationError> {
    if let Some(assignee) = &assessment.assignment.assignee {
        return Err(AllocationError::AlreadyAssigned {
            assessment_id: assessment.id.clone(),
            assignee: assignee.clone(),
        });
    }
    match assessment.touch_state {
        Some(TouchState::Screened | TouchState::Pending) => Ok(()),
        _ => Err(AllocationError::NotAwaitingAssignment {
            assessment_id: assessment.id.clone(),
        }),
    }
}

fn rationale(assessment: &Assessment, top: &CaseworkerScore) -> String {
    let covered = (top.tag_overlap * assessment.tags.len() as f64).round() as usize;
    format!(
        "{} covers {covered}/{} case tags, converts {:.0}% of visits and is at {:.0}% of capacity",
        top.name,
        assessment.tags.len(),
        top.conversion_rate * 100.0,
        top.load_ratio * 100.0,
    )
}

/// Shift weight toward the features on which overriding humans' picks beat the
/// suggestion. Weights keep a floor and are renormalized to sum to one.
pub fn recalibrate(weights: AllocationWeights, feedback: &[AllocationFeedback]) -> AllocationWeights {
    let mut tag_overlap = weights.tag_overlap;
    let mut conversion_rate = weights.conversion_rate;
    let mut open_load = weights.open_load;

    for entry in feedback
        .iter()
        .filter(|entry| entry.outcome == FeedbackOutcome::Overridden)
    {
        tag_overlap += LEARNING_RATE * (entry.chosen.tag_overlap - entry.suggested.tag_overlap);
        conversion_rate +=
            LEARNING_RATE * (entry.chosen.conversion_rate - entry.suggested.conversion_rate);
        open_load += LEARNING_RATE * (entry.suggested.load_ratio - entry.chosen.load_ratio);
    }

    let tag_overlap = tag_overlap.max(WEIGHT_FLOOR);
    let conversion_rate = conversion_rate.max(WEIGHT_FLOOR);
    let open_load = open_load.max(WEIGHT_FLOOR);
    let total = tag_overlap + conversion_rate + open_load;

    AllocationWeights {
        tag_overlap: round_to(tag_overlap / total, 4),
        conversion_rate: round_to(conversion_rate / total, 4),
        open_load: round_to(open_load / total, 4),
    }
}
