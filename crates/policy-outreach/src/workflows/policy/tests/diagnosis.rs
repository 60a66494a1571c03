use super::common::*;
use crate::workflows::policy::diagnosis::{
    diagnose, DocumentStatus, ItemCategory, ItemStatus, Recommendation,
};
use crate::workflows::policy::catalog::Rule;
use crate::workflows::policy::domain::RuleId;
use crate::workflows::policy::evaluation::EvaluationEngine;

#[test]
fn diagnosis_combines_core_and_bonus_items() {
    let engine = EvaluationEngine::default();
    let snapshot = qualifying_snapshot("ent-1");
    let program = pilot_program();
    let assessment = engine.evaluate(&snapshot, &program);

    let diagnosis = diagnose(&engine, &assessment, &snapshot, &program);

    assert_eq!(diagnosis.items_in(ItemCategory::Core).count(), 8);
    assert_eq!(diagnosis.items_in(ItemCategory::Bonus).count(), 1);
    assert_eq!(diagnosis.score, 86.36);

    let patents = diagnosis
        .items
        .iter()
        .find(|item| item.rule_id.0 == "patents")
        .expect("patent item present");
    assert_eq!(patents.status, ItemStatus::Fail);
    assert!(patents.suggestion.is_some());
}

#[test]
fn missing_required_documents_block_submission() {
    let engine = EvaluationEngine::default();
    let snapshot = qualifying_snapshot("ent-1");
    let program = pilot_program();
    let assessment = engine.evaluate(&snapshot, &program);

    let diagnosis = diagnose(&engine, &assessment, &snapshot, &program);

    let statuses: Vec<(&str, DocumentStatus)> = diagnosis
        .checklist
        .iter()
        .map(|entry| (entry.name.as_str(), entry.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("business license", DocumentStatus::Collected),
            ("audit report", DocumentStatus::Missing),
            ("patent certificates", DocumentStatus::NotRequired),
        ]
    );
    assert_eq!(diagnosis.missing_required, vec!["audit report".to_string()]);
    assert_eq!(diagnosis.recommendation, Recommendation::SubmitAfterFixes);
}

#[test]
fn resubmitted_documents_complete_the_checklist() {
    let engine = EvaluationEngine::default();
    let snapshot = qualifying_snapshot("ent-1");
    let program = pilot_program();
    let mut assessment = engine.evaluate(&snapshot, &program);
    assessment.resubmitted_documents.push("Audit Report".to_string());

    let diagnosis = diagnose(&engine, &assessment, &snapshot, &program);

    assert!(diagnosis.missing_required.is_empty());
    assert_eq!(diagnosis.recommendation, Recommendation::Submit);
}

#[test]
fn recommendation_thresholds() {
    let profile = pilot_program().diagnosis;

    assert_eq!(Recommendation::decide(40.0, true, &profile), Recommendation::Hold);
    assert_eq!(
        Recommendation::decide(40.0, false, &profile),
        Recommendation::SubmitAfterFixes
    );
    assert_eq!(
        Recommendation::decide(85.0, true, &profile),
        Recommendation::SubmitAfterFixes
    );
    assert_eq!(Recommendation::decide(80.0, false, &profile), Recommendation::Submit);
}

#[test]
fn misconfigured_diagnosis_rules_are_reported_in_the_result() {
    let engine = EvaluationEngine::default();
    let snapshot = qualifying_snapshot("ent-1");
    let mut program = pilot_program();
    program.diagnosis.rules.push(Rule::soft(
        "dx-broken",
        "Unweighted bonus",
        "revenue_growth",
        at_least(0.1),
        f64::NAN,
    ));
    let assessment = engine.evaluate(&snapshot, &program);

    let diagnosis = diagnose(&engine, &assessment, &snapshot, &program);

    assert_eq!(diagnosis.flagged_rules.len(), 1);
    assert_eq!(diagnosis.flagged_rules[0].rule_id, RuleId("dx-broken".to_string()));
    assert_eq!(diagnosis.items_in(ItemCategory::Bonus).count(), 1);
    assert_eq!(diagnosis.score, 86.36);
}
