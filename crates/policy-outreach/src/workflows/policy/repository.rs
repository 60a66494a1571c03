use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use super::allocation::AllocationFeedback;
use super::diagnosis::Diagnosis;
use super::domain::{
    Assessment, AssessmentId, CaseworkerId, EnterpriseSnapshot, ProgramId, TouchState,
};
use super::lifecycle::TouchStateChange;

/// Stored unit: the current assessment version plus the inputs it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub assessment: Assessment,
    pub snapshot: EnterpriseSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<Diagnosis>,
}

impl AssessmentRecord {
    pub fn new(assessment: Assessment, snapshot: EnterpriseSnapshot) -> Self {
        Self {
            assessment,
            snapshot,
            diagnosis: None,
        }
    }

    pub fn id(&self) -> &AssessmentId {
        &self.assessment.id
    }

    pub fn version(&self) -> u64 {
        self.assessment.version
    }
}

/// Query used by list views; every populated field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssessmentFilter {
    pub caseworker_id: Option<CaseworkerId>,
    pub program_id: Option<ProgramId>,
    pub touch_state: Option<TouchState>,
}

impl AssessmentFilter {
    pub fn for_caseworker(caseworker_id: CaseworkerId) -> Self {
        Self {
            caseworker_id: Some(caseworker_id),
            ..Self::default()
        }
    }

    pub fn for_program(program_id: ProgramId) -> Self {
        Self {
            program_id: Some(program_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, assessment: &Assessment) -> bool {
        let caseworker = self
            .caseworker_id
            .as_ref()
            .map_or(true, |id| assessment.assignment.assignee.as_ref() == Some(id));
        let program = self
            .program_id
            .as_ref()
            .map_or(true, |id| &assessment.program_id == id);
        let state = self
            .touch_state
            .map_or(true, |state| assessment.touch_state == Some(state));
        caseworker && program && state
    }
}

/// Storage abstraction. Writes of existing records are compare-and-swap on version.
pub trait AssessmentRepository: Send + Sync {
    fn fetch(&self, id: &AssessmentId) -> Result<Option<AssessmentRecord>, RepositoryError>;
    fn list(&self, filter: &AssessmentFilter) -> Result<Vec<AssessmentRecord>, RepositoryError>;
    /// Store a record for a new (enterprise, program) pair.
    fn insert(&self, record: AssessmentRecord) -> Result<AssessmentRecord, RepositoryError>;
    /// Replace the record only if the stored version equals `expected_version`.
    /// The stored copy gets `expected_version + 1`.
    fn swap(
        &self,
        expected_version: u64,
        record: AssessmentRecord,
    ) -> Result<AssessmentRecord, RepositoryError>;
    fn append_history(&self, change: TouchStateChange) -> Result<(), RepositoryError>;
    fn history(&self, id: &AssessmentId) -> Result<Vec<TouchStateChange>, RepositoryError>;
    fn record_feedback(&self, feedback: AllocationFeedback) -> Result<(), RepositoryError>;
    fn feedback(&self) -> Result<Vec<AllocationFeedback>, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("assessment {0} already exists")]
    Conflict(AssessmentId),
    #[error("assessment {0} not found")]
    NotFound(AssessmentId),
    #[error("assessment {id} changed concurrently (expected version {expected}, found {actual})")]
    VersionConflict {
        id: AssessmentId,
        expected: u64,
        actual: u64,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Unavailable("lock poisoned".to_string())
}

/// In-process store. Records are immutable once published; a swap replaces the
/// whole `Arc`, so readers never observe a partially written assessment.
#[derive(Debug, Default, Clone)]
pub struct MemoryAssessmentRepository {
    records: Arc<RwLock<HashMap<AssessmentId, Arc<AssessmentRecord>>>>,
    history: Arc<Mutex<Vec<TouchStateChange>>>,
    feedback: Arc<Mutex<Vec<AllocationFeedback>>>,
}

impl AssessmentRepository for MemoryAssessmentRepository {
    fn fetch(&self, id: &AssessmentId) -> Result<Option<AssessmentRecord>, RepositoryError> {
        let guard = self.records.read().map_err(poisoned)?;
        Ok(guard.get(id).map(|record| record.as_ref().clone()))
    }

    fn list(&self, filter: &AssessmentFilter) -> Result<Vec<AssessmentRecord>, RepositoryError> {
        let guard = self.records.read().map_err(poisoned)?;
        let mut records: Vec<AssessmentRecord> = guard
            .values()
            .filter(|record| filter.matches(&record.assessment))
            .map(|record| record.as_ref().clone())
            .collect();
        records.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(records)
    }

    fn insert(&self, record: AssessmentRecord) -> Result<AssessmentRecord, RepositoryError> {
        let mut guard = self.records.write().map_err(poisoned)?;
        if guard.contains_key(record.id()) {
            return Err(RepositoryError::Conflict(record.id().clone()));
        }
        guard.insert(record.id().clone(), Arc::new(record.clone()));
        Ok(record)
    }

    fn swap(
        &self,
        expected_version: u64,
        mut record: AssessmentRecord,
    ) -> Result<AssessmentRecord, RepositoryError> {
        let mut guard = self.records.write().map_err(poisoned)?;
        let current = guard
            .get(record.id())
            .ok_or_else(|| RepositoryError::NotFound(record.id().clone()))?;
        if current.version() != expected_version {
            return Err(RepositoryError::VersionConflict {
                id: record.id().clone(),
                expected: expected_version,
                actual: current.version(),
            });
        }
        record.assessment.version = expected_version + 1;
        guard.insert(record.id().clone(), Arc::new(record.clone()));
        Ok(record)
    }

    fn append_history(&self, change: TouchStateChange) -> Result<(), RepositoryError> {
        self.history.lock().map_err(poisoned)?.push(change);
        Ok(())
    }

    fn history(&self, id: &AssessmentId) -> Result<Vec<TouchStateChange>, RepositoryError> {
        let guard = self.history.lock().map_err(poisoned)?;
        Ok(guard
            .iter()
            .filter(|change| &change.assessment_id == id)
            .cloned()
            .collect())
    }

    fn record_feedback(&self, feedback: AllocationFeedback) -> Result<(), RepositoryError> {
        self.feedback.lock().map_err(poisoned)?.push(feedback);
        Ok(())
    }

    fn feedback(&self) -> Result<Vec<AllocationFeedback>, RepositoryError> {
        Ok(self.feedback.lock().map_err(poisoned)?.clone())
    }
}
