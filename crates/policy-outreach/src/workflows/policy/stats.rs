//! Dashboard read models computed from stored assessments and their history.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::domain::{AssessmentId, CaseworkerId, Grade, ProgramId, TouchState};
use super::lifecycle::TouchStateChange;
use super::repository::AssessmentRecord;
use crate::scoring::round_to;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchFunnel {
    pub assigned: usize,
    pub visited: usize,
    pub willing: usize,
    pub approved: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyStats {
    pub program_id: ProgramId,
    pub total_screened: usize,
    pub by_grade: BTreeMap<String, usize>,
    pub funnel: TouchFunnel,
    /// Assessments whose grade was last set by an admin override.
    pub overridden: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseworkerProgress {
    pub caseworker_id: CaseworkerId,
    pub assigned: usize,
    pub visited: usize,
    pub willing: usize,
    pub conversion_rate: f64,
}

/// Set of states each assessment has ever entered, from history plus current state.
struct Reached<'a> {
    states: HashSet<(&'a AssessmentId, TouchState)>,
}

impl<'a> Reached<'a> {
    fn new(records: &'a [AssessmentRecord], history: &'a [TouchStateChange]) -> Self {
        let mut states: HashSet<(&AssessmentId, TouchState)> = history
            .iter()
            .map(|change| (&change.assessment_id, change.to))
            .collect();
        for record in records {
            if let Some(state) = record.assessment.touch_state {
                states.insert((record.id(), state));
            }
        }
        Self { states }
    }

    fn has(&self, id: &'a AssessmentId, state: TouchState) -> bool {
        self.states.contains(&(id, state))
    }
}

impl PolicyStats {
    pub fn compute(
        program_id: &ProgramId,
        records: &[AssessmentRecord],
        history: &[TouchStateChange],
    ) -> Self {
        let records: Vec<AssessmentRecord> = records
            .iter()
            .filter(|record| &record.assessment.program_id == program_id)
            .cloned()
            .collect();
        let reached = Reached::new(&records, history);

        let mut by_grade: BTreeMap<String, usize> = [Grade::A, Grade::B, Grade::C, Grade::Unqualified]
            .iter()
            .map(|grade| (grade.label().to_string(), 0))
            .collect();
        let mut funnel = TouchFunnel::default();
        let mut overridden = 0;

        for record in &records {
            let assessment = &record.assessment;
            *by_grade.entry(assessment.grade.label().to_string()).or_insert(0) += 1;
            if assessment.grade_cause.is_override() {
                overridden += 1;
            }
            let id = record.id();
            funnel.assigned += usize::from(reached.has(id, TouchState::Assigned));
            funnel.visited += usize::from(reached.has(id, TouchState::Visited));
            funnel.willing += usize::from(reached.has(id, TouchState::Willing));
            funnel.approved += usize::from(reached.has(id, TouchState::Approved));
        }

        Self {
            program_id: program_id.clone(),
            total_screened: records.len(),
            by_grade,
            funnel,
            overridden,
        }
    }
}

impl CaseworkerProgress {
    /// Progress per current assignee, ordered by caseworker id.
    pub fn compute(records: &[AssessmentRecord], history: &[TouchStateChange]) -> Vec<Self> {
        let reached = Reached::new(records, history);
        let mut progress: BTreeMap<&CaseworkerId, (usize, usize, usize)> = BTreeMap::new();

        for record in records {
            let Some(assignee) = record.assessment.assignment.assignee.as_ref() else {
                continue;
            };
            let entry = progress.entry(assignee).or_default();
            entry.0 += 1;
            entry.1 += usize::from(reached.has(record.id(), TouchState::Visited));
            entry.2 += usize::from(reached.has(record.id(), TouchState::Willing));
        }

        progress
            .into_iter()
            .map(|(caseworker_id, (assigned, visited, willing))| Self {
                caseworker_id: caseworker_id.clone(),
                assigned,
                visited,
                willing,
                conversion_rate: if visited == 0 {
                    0.0
                } else {
                    round_to(willing as f64 / visited as f64, 4)
                },
            })
            .collect()
    }
}
