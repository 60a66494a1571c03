use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{MatchSettings, SubTaskRanking};
use crate::scoring::round_to;
use crate::workflows::policy::domain::EnterpriseId;

/// One sub-task assigned to one partner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub sub_task_id: String,
    pub enterprise_id: EnterpriseId,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerPick {
    pub enterprise_id: EnterpriseId,
    pub name: String,
    pub sub_task_ids: Vec<String>,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationSuggestion {
    pub partners: Vec<PartnerPick>,
    pub coverage: Vec<Coverage>,
    /// Coverage removed to lift the combined average to the threshold.
    pub dropped: Vec<Coverage>,
    /// Sub-tasks no candidate reached the minimum score for.
    pub uncovered: Vec<String>,
    pub average_score: f64,
    pub meets_threshold: bool,
}

struct Eligible<'a> {
    name: &'a str,
    /// (sub-task position, score) pairs at or above the minimum score.
    pairs: Vec<(usize, f64)>,
}

fn average(scores: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = scores.fold((0.0, 0usize), |(sum, count), score| (sum + score, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Greedy set cover over eligible candidate/sub-task pairs, then prune the weakest
/// coverage while the combined average stays below the threshold.
pub fn suggest_combination(
    rankings: &[SubTaskRanking],
    settings: &MatchSettings,
) -> CombinationSuggestion {
    let mut eligible: BTreeMap<&EnterpriseId, Eligible<'_>> = BTreeMap::new();
    for (position, ranking) in rankings.iter().enumerate() {
        for candidate in ranking
            .candidates
            .iter()
            .filter(|candidate| candidate.score >= settings.min_score)
        {
            eligible
                .entry(&candidate.enterprise_id)
                .or_insert_with(|| Eligible {
                    name: &candidate.name,
                    pairs: Vec::new(),
                })
                .pairs
                .push((position, candidate.score));
        }
    }

    let mut uncovered: BTreeSet<usize> = (0..rankings.len()).collect();
    let mut chosen: Vec<(&EnterpriseId, Vec<(usize, f64)>)> = Vec::new();

    while !uncovered.is_empty() {
        let mut best: Option<(&EnterpriseId, Vec<(usize, f64)>, f64)> = None;
        for (enterprise_id, entry) in &eligible {
            let fresh: Vec<(usize, f64)> = entry
                .pairs
                .iter()
                .copied()
                .filter(|(position, _)| uncovered.contains(position))
                .collect();
            if fresh.is_empty() {
                continue;
            }
            let fresh_average = average(fresh.iter().map(|(_, score)| *score));
            let better = match &best {
                None => true,
                Some((_, current, current_average)) => {
                    fresh.len() > current.len()
                        || (fresh.len() == current.len() && fresh_average > *current_average)
                }
            };
            if better {
                best = Some((*enterprise_id, fresh, fresh_average));
            }
        }

        let Some((enterprise_id, pairs, _)) = best else {
            break;
        };
        for (position, _) in &pairs {
            uncovered.remove(position);
        }
        chosen.push((enterprise_id, pairs));
    }

    let mut coverage: Vec<(usize, Coverage)> = chosen
        .iter()
        .flat_map(|(enterprise_id, pairs)| {
            pairs.iter().map(move |(position, score)| {
                (
                    *position,
                    Coverage {
                        sub_task_id: rankings[*position].sub_task.id.clone(),
                        enterprise_id: (*enterprise_id).clone(),
                        score: *score,
                    },
                )
            })
        })
        .collect();
    coverage.sort_by_key(|(position, _)| *position);

    let mut dropped = Vec::new();
    while coverage.len() > 1
        && average(coverage.iter().map(|(_, entry)| entry.score)) < settings.combination_threshold
    {
        let weakest = coverage
            .iter()
            .enumerate()
            .min_by(|(_, (pa, a)), (_, (pb, b))| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| pb.cmp(pa))
            })
            .map(|(index, _)| index);
        match weakest {
            Some(index) => dropped.push(coverage.remove(index).1),
            None => break,
        }
    }

    let coverage: Vec<Coverage> = coverage.into_iter().map(|(_, entry)| entry).collect();
    let average_score = round_to(average(coverage.iter().map(|entry| entry.score)), 2);

    let partners = chosen
        .iter()
        .filter_map(|(enterprise_id, _)| {
            let kept: Vec<&Coverage> = coverage
                .iter()
                .filter(|entry| &entry.enterprise_id == *enterprise_id)
                .collect();
            if kept.is_empty() {
                return None;
            }
            Some(PartnerPick {
                enterprise_id: (*enterprise_id).clone(),
                name: eligible
                    .get(enterprise_id)
                    .map(|entry| entry.name.to_string())
                    .unwrap_or_default(),
                sub_task_ids: kept.iter().map(|entry| entry.sub_task_id.clone()).collect(),
                average_score: round_to(average(kept.iter().map(|entry| entry.score)), 2),
            })
        })
        .collect();

    CombinationSuggestion {
        partners,
        meets_threshold: !coverage.is_empty() && average_score >= settings.combination_threshold,
        coverage,
        dropped,
        uncovered: uncovered
            .into_iter()
            .map(|position| rankings[position].sub_task.id.clone())
            .collect(),
        average_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::matching::{CandidateMatch, SubTask};

    fn scored(id: &str, score: f64) -> CandidateMatch {
        CandidateMatch {
            enterprise_id: EnterpriseId(id.to_string()),
            name: id.to_uppercase(),
            score,
            capability_overlap: 1.0,
            activity: 0.5,
            recency: 0.5,
            matched_capabilities: Vec::new(),
        }
    }

    fn ranking(task: &str, candidates: Vec<CandidateMatch>) -> SubTaskRanking {
        SubTaskRanking {
            sub_task: SubTask::new(task, task, &[task]),
            candidates,
        }
    }

    fn four_task_demand() -> Vec<SubTaskRanking> {
        vec![
            ranking("perception", vec![scored("acme", 92.0)]),
            ranking("planning", vec![scored("borealis", 78.0)]),
            ranking("simulation", vec![scored("cobalt", 68.0)]),
            ranking("mapping", vec![scored("dynamo", 55.0)]),
        ]
    }

    #[test]
    fn keeps_all_sub_tasks_when_average_clears_threshold() {
        let settings = MatchSettings {
            top_k: 3,
            min_score: 50.0,
            combination_threshold: 70.0,
        };
        let suggestion = suggest_combination(&four_task_demand(), &settings);
        assert_eq!(suggestion.coverage.len(), 4);
        assert!(suggestion.dropped.is_empty());
        assert_eq!(suggestion.average_score, 73.25);
        assert!(suggestion.meets_threshold);
    }

    #[test]
    fn drops_lowest_coverage_when_average_falls_short() {
        let settings = MatchSettings {
            top_k: 3,
            min_score: 50.0,
            combination_threshold: 75.0,
        };
        let suggestion = suggest_combination(&four_task_demand(), &settings);
        assert_eq!(suggestion.coverage.len(), 3);
        assert_eq!(suggestion.dropped.len(), 1);
        assert_eq!(suggestion.dropped[0].sub_task_id, "mapping");
        assert_eq!(suggestion.average_score, 79.33);
        assert!(suggestion
            .partners
            .iter()
            .all(|partner| partner.enterprise_id.0 != "dynamo"));
    }

    #[test]
    fn prefers_candidates_covering_more_sub_tasks() {
        let rankings = vec![
            ranking("a", vec![scored("solo", 95.0), scored("wide", 70.0)]),
            ranking("b", vec![scored("wide", 72.0)]),
        ];
        let suggestion = suggest_combination(&rankings, &MatchSettings::default());
        assert_eq!(suggestion.partners.len(), 1);
        assert_eq!(suggestion.partners[0].enterprise_id.0, "wide");
        assert_eq!(suggestion.partners[0].sub_task_ids, vec!["a", "b"]);
    }

    #[test]
    fn reports_sub_tasks_below_minimum_score_as_uncovered() {
        let rankings = vec![
            ranking("a", vec![scored("x", 80.0)]),
            ranking("b", vec![scored("y", 30.0)]),
        ];
        let suggestion = suggest_combination(&rankings, &MatchSettings::default());
        assert_eq!(suggestion.uncovered, vec!["b"]);
    }
}
