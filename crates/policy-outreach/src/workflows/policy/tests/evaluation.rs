use super::common::*;
use crate::workflows::policy::catalog::{PolicyProgram, Rule, RuleKind};
use crate::workflows::policy::domain::{
    Confidence, FieldValue, Grade, MutationCause, RuleId, RuleOutcome, TouchState,
};
use crate::workflows::policy::evaluation::{EvaluationEngine, OverrideError};

fn engine() -> EvaluationEngine {
    EvaluationEngine::default()
}

#[test]
fn all_hard_rules_passing_grades_on_weighted_score() {
    let assessment = engine().evaluate(&qualifying_snapshot("ent-1"), &pilot_program());

    assert_eq!(assessment.score, 85.0);
    assert_eq!(assessment.grade, Grade::A);
    assert_eq!(assessment.touch_state, Some(TouchState::Screened));
    assert_eq!(assessment.count(RuleOutcome::Pass), 7);
    assert_eq!(assessment.count(RuleOutcome::Fail), 1);
    assert_eq!(assessment.grade_cause, MutationCause::Automatic);
    assert!(assessment.tags.contains("software"));
    assert!(assessment.tags.contains("ai"));
}

#[test]
fn failed_hard_rule_disqualifies_despite_high_score() {
    let mut rules = vec![Rule::hard("gate", "Gate", "gate_1", at_least(5.0), 10.0)];
    for index in 1..=5 {
        rules.push(Rule::soft(
            &format!("bonus-{index}"),
            &format!("Bonus {index}"),
            "revenue_growth",
            at_least(0.10),
            18.0,
        ));
    }
    let program = PolicyProgram {
        rules,
        ..pilot_program()
    };

    let assessment = engine().evaluate(&qualifying_snapshot("ent-1"), &program);

    assert_eq!(assessment.score, 90.0);
    assert_eq!(assessment.grade, Grade::Unqualified);
    assert!(assessment.has_hard_failure());
    assert_eq!(assessment.touch_state, None);
}

#[test]
fn evaluation_is_deterministic() {
    let snapshot = qualifying_snapshot("ent-1");
    let program = pilot_program();

    let first = engine().evaluate(&snapshot, &program);
    let second = engine().evaluate(&snapshot, &program);

    assert_eq!(first, second);
}

#[test]
fn estimates_stay_pending_and_earn_partial_credit() {
    let mut snapshot = qualifying_snapshot("ent-1");
    snapshot.fields.remove("patent_count");
    let snapshot = snapshot.with_estimate("patent_count", FieldValue::Number(6.0), Confidence::High);

    let assessment = engine().evaluate(&snapshot, &pilot_program());
    let patents = assessment
        .result_for(&RuleId("patents".to_string()))
        .expect("patent rule evaluated");

    assert_eq!(patents.outcome, RuleOutcome::Pending);
    assert_eq!(patents.confidence, Some(Confidence::High));
    assert!(patents
        .reason
        .as_deref()
        .is_some_and(|reason| reason.contains("indicates pass")));
    assert_eq!(assessment.score, 97.0);
    assert_eq!(assessment.grade, Grade::A);
}

#[test]
fn missing_fields_are_pending_with_low_confidence() {
    let mut snapshot = qualifying_snapshot("ent-1");
    snapshot.fields.remove("revenue_growth");

    let assessment = engine().evaluate(&snapshot, &pilot_program());
    let growth = assessment
        .result_for(&RuleId("growth".to_string()))
        .expect("growth rule evaluated");

    assert_eq!(growth.outcome, RuleOutcome::Pending);
    assert_eq!(growth.confidence, Some(Confidence::Low));
    assert_eq!(assessment.score, 65.0);
    assert_eq!(assessment.grade, Grade::B);
}

#[test]
fn misconfigured_rules_are_flagged_not_scored() {
    let mut program = pilot_program();
    program.rules.push(Rule::soft(
        "broken",
        "Broken weight",
        "revenue_growth",
        at_least(0.1),
        -5.0,
    ));

    let assessment = engine().evaluate(&qualifying_snapshot("ent-1"), &program);

    assert_eq!(assessment.flagged_rules.len(), 1);
    assert_eq!(assessment.flagged_rules[0].rule_id, RuleId("broken".to_string()));
    assert!(assessment
        .result_for(&RuleId("broken".to_string()))
        .is_none());
    assert_eq!(assessment.score, 85.0);
}

#[test]
fn decided_results_never_regress_to_pending() {
    let program = pilot_program();
    let previous = engine().evaluate(&qualifying_snapshot("ent-1"), &program);

    let mut thinner = qualifying_snapshot("ent-1");
    thinner.fields.remove("revenue_growth");
    let next = engine().reevaluate(&previous, &thinner, &program);

    let growth = next
        .result_for(&RuleId("growth".to_string()))
        .expect("growth rule evaluated");
    assert_eq!(growth.outcome, RuleOutcome::Pass);
    assert_eq!(next.score, previous.score);
    assert_eq!(next.version, previous.version);
}

#[test]
fn reevaluation_resolves_pending_rules() {
    let program = pilot_program();
    let mut sparse = qualifying_snapshot("ent-1");
    sparse.fields.remove("revenue_growth");
    let previous = engine().evaluate(&sparse, &program);

    let next = engine().reevaluate(&previous, &qualifying_snapshot("ent-1"), &program);

    assert_eq!(previous.pending_rules().len(), 1);
    assert!(next.pending_rules().is_empty());
    assert_eq!(next.grade, Grade::A);
}

#[test]
fn overrides_regrade_and_survive_reevaluation() {
    let program = pilot_program();
    let engine = engine();
    let mut assessment = engine.evaluate(&qualifying_snapshot("ent-1"), &program);

    engine
        .override_rule(
            &mut assessment,
            &RuleId("patents".to_string()),
            RuleOutcome::Pass,
            "admin-chen",
            "patents filed under parent company",
        )
        .expect("override accepted");

    assert_eq!(assessment.score, 100.0);
    assert!(assessment.grade_cause.is_override());

    let next = engine.reevaluate(&assessment, &qualifying_snapshot("ent-1"), &program);
    let patents = next
        .result_for(&RuleId("patents".to_string()))
        .expect("patent rule evaluated");
    assert_eq!(patents.outcome, RuleOutcome::Pass);
    assert!(patents.source.is_override());
    assert!(next.grade_cause.is_override());
}

#[test]
fn overrides_must_decide_and_explain() {
    let engine = engine();
    let mut assessment = engine.evaluate(&qualifying_snapshot("ent-1"), &pilot_program());
    let before = assessment.clone();
    let patents = RuleId("patents".to_string());

    assert_eq!(
        engine.override_rule(&mut assessment, &patents, RuleOutcome::Pending, "admin", "why"),
        Err(OverrideError::PendingNotAllowed)
    );
    assert_eq!(
        engine.override_rule(&mut assessment, &patents, RuleOutcome::Pass, "admin", "  "),
        Err(OverrideError::MissingCause)
    );
    assert_eq!(
        engine.override_rule(
            &mut assessment,
            &RuleId("nope".to_string()),
            RuleOutcome::Pass,
            "admin",
            "typo"
        ),
        Err(OverrideError::UnknownRule(RuleId("nope".to_string())))
    );
    assert_eq!(assessment, before);
}

#[test]
fn hard_rule_override_to_fail_disqualifies() {
    let engine = engine();
    let mut assessment = engine.evaluate(&qualifying_snapshot("ent-1"), &pilot_program());

    engine
        .override_rule(
            &mut assessment,
            &RuleId("gate-1".to_string()),
            RuleOutcome::Fail,
            "admin-chen",
            "licence revoked",
        )
        .expect("override accepted");

    assert_eq!(assessment.grade, Grade::Unqualified);
    assert_eq!(
        assessment
            .result_for(&RuleId("gate-1".to_string()))
            .map(|result| result.kind),
        Some(RuleKind::Hard)
    );
}
