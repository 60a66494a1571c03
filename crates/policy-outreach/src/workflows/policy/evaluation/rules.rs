use chrono::{Datelike, NaiveDate};

use super::super::catalog::{Comparator, DateUnit, Rule};
use super::super::domain::{
    Confidence, EnterpriseSnapshot, FieldValue, MutationCause, RuleOutcome, RuleResult,
};
use crate::scoring::normalized_set;

/// The field value has the wrong shape for the rule's comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TypeMismatch {
    pub expected: &'static str,
}

/// Apply a validated rule to a snapshot. Verified fields decide the rule, estimates
/// and missing data leave it pending.
pub(crate) fn apply_rule(rule: &Rule, snapshot: &EnterpriseSnapshot) -> RuleResult {
    let required = rule.comparator.to_string();
    let mut result = RuleResult {
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        kind: rule.kind,
        weight: rule.weight,
        outcome: RuleOutcome::Pending,
        confidence: Some(Confidence::Low),
        reason: None,
        observed: None,
        required,
        source: MutationCause::Automatic,
    };

    if let Some(value) = snapshot.fields.get(&rule.field) {
        result.observed = Some(value.clone());
        match compare(&rule.comparator, value, snapshot.captured_on) {
            Ok(true) => {
                result.outcome = RuleOutcome::Pass;
                result.confidence = None;
            }
            Ok(false) => {
                result.outcome = RuleOutcome::Fail;
                result.confidence = None;
                result.reason = Some(format!(
                    "{} is {value}, required {}",
                    rule.field, result.required
                ));
            }
            Err(mismatch) => {
                result.reason = Some(format!(
                    "{} holds a value that is not a {}",
                    rule.field, mismatch.expected
                ));
            }
        }
        return result;
    }

    if let Some(estimate) = snapshot.estimates.get(&rule.field) {
        result.observed = Some(estimate.value.clone());
        let source = estimate
            .source
            .as_deref()
            .map(|source| format!(" from {source}"))
            .unwrap_or_default();
        match compare(&rule.comparator, &estimate.value, snapshot.captured_on) {
            Ok(indicative) => {
                result.confidence = Some(estimate.confidence);
                let indicative = if indicative { "pass" } else { "fail" };
                result.reason = Some(format!(
                    "unverified estimate{source} indicates {indicative}"
                ));
            }
            Err(mismatch) => {
                result.reason = Some(format!(
                    "estimate{source} for {} is not a {}",
                    rule.field, mismatch.expected
                ));
            }
        }
        return result;
    }

    result.reason = Some(format!("{} missing from snapshot", rule.field));
    result
}

pub(crate) fn compare(
    comparator: &Comparator,
    value: &FieldValue,
    captured_on: NaiveDate,
) -> Result<bool, TypeMismatch> {
    match (comparator, value) {
        (Comparator::Threshold { op, value: threshold }, FieldValue::Number(observed)) => {
            Ok(op.holds(*observed, *threshold))
        }
        (Comparator::Threshold { .. }, _) => Err(TypeMismatch { expected: "number" }),
        (Comparator::Boolean { expected }, FieldValue::Flag(observed)) => Ok(observed == expected),
        (Comparator::Boolean { .. }, _) => Err(TypeMismatch { expected: "flag" }),
        (Comparator::Equals { .. }, FieldValue::List(_)) => {
            Err(TypeMismatch { expected: "scalar" })
        }
        (Comparator::Equals { expected }, observed) => Ok(observed
            .to_string()
            .trim()
            .eq_ignore_ascii_case(expected.trim())),
        (
            Comparator::DateDiff {
                unit,
                at_least,
                at_most,
            },
            FieldValue::Date(since),
        ) => {
            let elapsed = elapsed(*unit, *since, captured_on);
            let above = at_least.map_or(true, |min| elapsed >= min);
            let below = at_most.map_or(true, |max| elapsed <= max);
            Ok(above && below)
        }
        (Comparator::DateDiff { .. }, _) => Err(TypeMismatch { expected: "date" }),
        (Comparator::ContainsCount { any_of, at_least }, FieldValue::List(items)) => {
            let items = normalized_set(items);
            let count = if any_of.is_empty() {
                items.len()
            } else {
                let wanted = normalized_set(any_of);
                items.intersection(&wanted).count()
            };
            Ok(count >= *at_least)
        }
        (Comparator::ContainsCount { .. }, _) => Err(TypeMismatch { expected: "list" }),
    }
}

fn elapsed(unit: DateUnit, since: NaiveDate, until: NaiveDate) -> i64 {
    match unit {
        DateUnit::Days => (until - since).num_days(),
        DateUnit::Months => whole_months(since, until),
        DateUnit::Years => whole_months(since, until) / 12,
    }
}

fn whole_months(since: NaiveDate, until: NaiveDate) -> i64 {
    let mut months = i64::from(until.year() - since.year()) * 12 + i64::from(until.month())
        - i64::from(since.month());
    if months > 0 && until.day() < since.day() {
        months -= 1;
    } else if months < 0 && until.day() > since.day() {
        months += 1;
    }
    months
}
