//! Scoring primitives shared by eligibility grading and demand matching.

use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Normalized 0-100 weighted sum over `(earned, weight)` pairs.
///
/// Returns 0 when the total weight is zero so an empty rule set never grades.
pub fn weighted_percentage<I>(parts: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (earned, total) = parts
        .into_iter()
        .fold((0.0, 0.0), |(earned, total), (part, weight)| {
            (earned + part, total + weight)
        });

    if total <= 0.0 {
        return 0.0;
    }

    round_to(unit_clamp(earned / total) * 100.0, 2)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn unit_clamp(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Case-insensitive share of `required` covered by `offered`.
pub fn overlap_ratio(required: &[String], offered: &[String]) -> f64 {
    let required = normalized_set(required);
    if required.is_empty() {
        return 0.0;
    }
    let offered = normalized_set(offered);
    let covered = required.intersection(&offered).count();
    covered as f64 / required.len() as f64
}

pub fn normalized_set(values: &[String]) -> BTreeSet<String> {
    values
        .iter()
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .collect()
}

/// Sort by score descending with a stable lexical tie-break, so rankings are
/// reproducible for a fixed input.
pub fn rank_descending<T, S, K>(items: &mut [T], score: S, key: K)
where
    S: Fn(&T) -> f64,
    K: Fn(&T) -> &str,
{
    items.sort_by(|a, b| {
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(Ordering::Equal)
            .then_with(|| key(a).cmp(key(b)))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_percentage_normalizes_to_hundred() {
        let score = weighted_percentage([(10.0, 10.0), (5.0, 10.0), (0.0, 20.0)]);
        assert_eq!(score, 37.5);
    }

    #[test]
    fn weighted_percentage_is_zero_without_weight() {
        assert_eq!(weighted_percentage(Vec::<(f64, f64)>::new()), 0.0);
    }

    #[test]
    fn overlap_ignores_case_and_whitespace() {
        let required = vec!["Lidar".to_string(), "HD maps".to_string()];
        let offered = vec![" lidar ".to_string(), "sensor fusion".to_string()];
        assert_eq!(overlap_ratio(&required, &offered), 0.5);
    }

    #[test]
    fn rank_descending_breaks_ties_by_key() {
        let mut items = vec![("b", 1.0), ("a", 1.0), ("c", 2.0)];
        rank_descending(&mut items, |item| item.1, |item| item.0);
        assert_eq!(items, vec![("c", 2.0), ("a", 1.0), ("b", 1.0)]);
    }
}
