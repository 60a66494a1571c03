//! Demand matching: rank incubator companies per sub-task and suggest a partner
//! combination covering the whole demand.

mod combination;
mod ranking;

pub use combination::{suggest_combination, CombinationSuggestion, Coverage, PartnerPick};
pub use ranking::{match_score, rank_candidates};

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::workflows::policy::domain::{Confidence, EnterpriseId};

/// One unit of work extracted from a demand, in the parser's order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub title: String,
    pub capabilities: Vec<String>,
}

const STOPWORDS: &[&str] = &[
    "and", "the", "for", "with", "our", "need", "needs", "looking", "that", "from", "into", "who",
    "can", "are", "will", "want", "have", "some", "help",
];

impl SubTask {
    pub fn new(id: &str, title: &str, capabilities: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            capabilities: capabilities.iter().map(|cap| (*cap).to_string()).collect(),
        }
    }

    /// Fallback decomposition: the whole demand as one sub-task whose capabilities
    /// are its distinct keywords.
    pub fn from_keywords(text: &str) -> Self {
        let mut seen = BTreeSet::new();
        let capabilities = text
            .split(|c: char| !c.is_alphanumeric() && c != '-')
            .map(|word| word.trim_matches('-').to_lowercase())
            .filter(|word| word.chars().count() >= 3 && !STOPWORDS.contains(&word.as_str()))
            .filter(|word| seen.insert(word.clone()))
            .collect();
        Self {
            id: "demand".to_string(),
            title: text.trim().to_string(),
            capabilities,
        }
    }
}

/// Incubator company offered by the candidate directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub enterprise_id: EnterpriseId,
    pub name: String,
    pub capabilities: Vec<String>,
    /// Platform activity on a 0-100 scale.
    pub activity_score: f64,
    #[serde(default)]
    pub last_engaged_on: Option<NaiveDate>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchSettings {
    pub top_k: usize,
    pub min_score: f64,
    pub combination_threshold: f64,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_score: 50.0,
            combination_threshold: 70.0,
        }
    }
}

/// Candidate scored against one sub-task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub enterprise_id: EnterpriseId,
    pub name: String,
    pub score: f64,
    pub capability_overlap: f64,
    pub activity: f64,
    pub recency: f64,
    pub matched_capabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTaskRanking {
    pub sub_task: SubTask,
    /// Every candidate with some overlap, best first.
    pub candidates: Vec<CandidateMatch>,
}

impl SubTaskRanking {
    pub fn top(&self, k: usize) -> &[CandidateMatch] {
        &self.candidates[..self.candidates.len().min(k)]
    }
}

/// Ranked view of one sub-task as returned to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTaskMatches {
    pub sub_task: SubTask,
    pub candidates: Vec<CandidateMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub query: String,
    pub sub_tasks: Vec<SubTaskMatches>,
    pub combination: CombinationSuggestion,
    /// Set when the demand parser was unavailable and keywords were used instead.
    pub degraded: bool,
    pub confidence: Confidence,
}

impl MatchResult {
    pub fn assemble(
        query: &str,
        rankings: Vec<SubTaskRanking>,
        settings: &MatchSettings,
        degraded: bool,
    ) -> Self {
        let combination = suggest_combination(&rankings, settings);
        let sub_tasks = rankings
            .into_iter()
            .map(|ranking| SubTaskMatches {
                candidates: ranking.top(settings.top_k).to_vec(),
                sub_task: ranking.sub_task,
            })
            .collect();
        Self {
            query: query.to_string(),
            sub_tasks,
            combination,
            degraded,
            confidence: if degraded {
                Confidence::Low
            } else {
                Confidence::High
            },
        }
    }
}
