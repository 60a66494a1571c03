//! Contracts for the external systems the engine depends on.
//!
//! Every call goes through [`bounded`], so a slow collaborator surfaces as a
//! `Timeout` the caller can degrade on instead of stalling a run.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::workflows::matching::{Candidate, SubTask};
use crate::workflows::policy::allocation::Caseworker;
use crate::workflows::policy::domain::{ConfirmedFinding, EnterpriseId, EnterpriseSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{collaborator} did not answer within {budget_ms}ms")]
    Timeout {
        collaborator: &'static str,
        budget_ms: u64,
    },
    #[error("{collaborator} failed: {message}")]
    Failed {
        collaborator: &'static str,
        message: String,
    },
}

impl CollaboratorError {
    pub fn failed(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Failed {
            collaborator,
            message: message.into(),
        }
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, CollaboratorError::Timeout { .. })
    }
}

#[async_trait]
pub trait EnterpriseProfileStore: Send + Sync {
    async fn list_enterprises(&self) -> Result<Vec<EnterpriseId>, CollaboratorError>;
    async fn get_snapshot(
        &self,
        enterprise_id: &EnterpriseId,
    ) -> Result<Option<EnterpriseSnapshot>, CollaboratorError>;
}

/// Splits free-text demand into ordered sub-tasks.
#[async_trait]
pub trait DemandParser: Send + Sync {
    async fn parse(&self, text: &str) -> Result<Vec<SubTask>, CollaboratorError>;
}

#[async_trait]
pub trait VisitRecordStore: Send + Sync {
    async fn get_confirmed_findings(
        &self,
        enterprise_id: &EnterpriseId,
    ) -> Result<Vec<ConfirmedFinding>, CollaboratorError>;
}

#[async_trait]
pub trait CaseworkerRoster: Send + Sync {
    async fn list(&self) -> Result<Vec<Caseworker>, CollaboratorError>;
}

#[async_trait]
pub trait CandidateDirectory: Send + Sync {
    async fn candidates(&self) -> Result<Vec<Candidate>, CollaboratorError>;
}

/// The full set of collaborators handed to the service.
#[derive(Clone)]
pub struct Collaborators {
    pub profiles: Arc<dyn EnterpriseProfileStore>,
    pub parser: Arc<dyn DemandParser>,
    pub visits: Arc<dyn VisitRecordStore>,
    pub roster: Arc<dyn CaseworkerRoster>,
    pub directory: Arc<dyn CandidateDirectory>,
}

/// Run a collaborator call under a time budget.
pub async fn bounded<T, F>(
    collaborator: &'static str,
    budget: Duration,
    call: F,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout {
            collaborator,
            budget_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
