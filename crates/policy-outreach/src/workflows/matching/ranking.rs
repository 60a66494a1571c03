use chrono::NaiveDate;
use rayon::prelude::*;

use super::{Candidate, CandidateMatch, SubTask, SubTaskRanking};
use crate::scoring::{normalized_set, overlap_ratio, rank_descending, round_to, unit_clamp};

const OVERLAP_WEIGHT: f64 = 0.6;
const ACTIVITY_WEIGHT: f64 = 0.25;
const RECENCY_WEIGHT: f64 = 0.15;
const RECENCY_HORIZON_DAYS: f64 = 365.0;

fn recency(last_engaged_on: Option<NaiveDate>, today: NaiveDate) -> f64 {
    match last_engaged_on {
        Some(date) => {
            let days = (today - date).num_days().max(0) as f64;
            (1.0 - days / RECENCY_HORIZON_DAYS).max(0.0)
        }
        None => 0.0,
    }
}

/// 0-100 match score, or `None` when the candidate covers none of the sub-task.
pub fn match_score(sub_task: &SubTask, candidate: &Candidate, today: NaiveDate) -> Option<CandidateMatch> {
    let capability_overlap = overlap_ratio(&sub_task.capabilities, &candidate.capabilities);
    if capability_overlap <= 0.0 {
        return None;
    }

    let activity = unit_clamp(candidate.activity_score / 100.0);
    let recency = recency(candidate.last_engaged_on, today);
    let score = (OVERLAP_WEIGHT * capability_overlap
        + ACTIVITY_WEIGHT * activity
        + RECENCY_WEIGHT * recency)
        * 100.0;

    let offered = normalized_set(&candidate.capabilities);
    let matched_capabilities = normalized_set(&sub_task.capabilities)
        .into_iter()
        .filter(|capability| offered.contains(capability))
        .collect();

    Some(CandidateMatch {
        enterprise_id: candidate.enterprise_id.clone(),
        name: candidate.name.clone(),
        score: round_to(score, 2),
        capability_overlap: round_to(capability_overlap, 4),
        activity: round_to(activity, 4),
        recency: round_to(recency, 4),
        matched_capabilities,
    })
}

/// Rank every candidate for every sub-task, fanning sub-tasks out across the
/// rayon pool. Output keeps the sub-task order.
pub fn rank_candidates(
    sub_tasks: &[SubTask],
    candidates: &[Candidate],
    today: NaiveDate,
) -> Vec<SubTaskRanking> {
    sub_tasks
        .par_iter()
        .map(|sub_task| {
            let mut matches: Vec<CandidateMatch> = candidates
                .iter()
                .filter_map(|candidate| match_score(sub_task, candidate, today))
                .collect();
            rank_descending(
                &mut matches,
                |entry| entry.score,
                |entry| entry.enterprise_id.0.as_str(),
            );
            SubTaskRanking {
                sub_task: sub_task.clone(),
                candidates: matches,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::policy::domain::EnterpriseId;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).expect("valid date")
    }

    fn candidate(id: &str, capabilities: &[&str], activity: f64, days_ago: Option<i64>) -> Candidate {
        Candidate {
            enterprise_id: EnterpriseId(id.to_string()),
            name: id.to_uppercase(),
            capabilities: capabilities.iter().map(|c| (*c).to_string()).collect(),
            activity_score: activity,
            last_engaged_on: days_ago.map(|days| today() - chrono::Duration::days(days)),
            location: None,
        }
    }

    #[test]
    fn full_overlap_with_max_activity_and_fresh_engagement_scores_hundred() {
        let task = SubTask::new("t1", "perception", &["lidar", "fusion"]);
        let scored = match_score(&task, &candidate("a", &["Lidar", "Fusion"], 100.0, Some(0)), today())
            .expect("overlapping candidate is scored");
        assert_eq!(scored.score, 100.0);
    }

    #[test]
    fn never_engaged_candidates_get_no_recency_credit() {
        let task = SubTask::new("t1", "perception", &["lidar", "fusion"]);
        let scored = match_score(&task, &candidate("a", &["lidar"], 40.0, None), today())
            .expect("scored");
        assert_eq!(scored.recency, 0.0);
        assert_eq!(scored.score, 40.0);
    }

    #[test]
    fn candidates_without_overlap_are_not_ranked() {
        let tasks = vec![SubTask::new("t1", "maps", &["hd maps"])];
        let pool = vec![
            candidate("a", &["lidar"], 90.0, Some(10)),
            candidate("b", &["hd maps"], 20.0, None),
        ];
        let rankings = rank_candidates(&tasks, &pool, today());
        assert_eq!(rankings[0].candidates.len(), 1);
        assert_eq!(rankings[0].candidates[0].enterprise_id.0, "b");
    }
}
