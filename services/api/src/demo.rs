use crate::cli::{DemoArgs, MatchArgs, ScreenArgs};
use crate::infra::{load_roster, outreach_service};
use chrono::{Local, NaiveDate};
use policy_outreach::config::EngineConfig;
use policy_outreach::error::AppError;
use policy_outreach::workflows::matching::MatchResult;
use policy_outreach::workflows::policy::{
    Actor, AllocationDecision, AssessmentFilter, AssessmentId, MemoryAssessmentRepository,
    OutreachService, ProgramId, RuleKind, RuleOutcome, ScreeningRunSummary, TouchAction,
    TouchState, TransitionRequest, VisitRecordId,
};

const DEMO_PROGRAM: &str = "high_tech_enterprise";

fn engine_settings() -> Result<EngineConfig, AppError> {
    Ok(EngineConfig::from_env()?)
}

fn today_or_now(today: Option<NaiveDate>) -> NaiveDate {
    today.unwrap_or_else(|| Local::now().date_naive())
}

pub(crate) async fn run_screening(args: ScreenArgs) -> Result<(), AppError> {
    let today = today_or_now(args.today);
    let service = outreach_service(load_roster(None)?, today, engine_settings()?);
    let program_id = ProgramId(args.program);

    let summary = service.trigger_screening_run(&program_id).await?;
    render_screening(&summary);

    let filter = AssessmentFilter {
        program_id: Some(program_id),
        ..AssessmentFilter::default()
    };
    println!("\nAssessments");
    for assessment in service.list(&filter)? {
        println!(
            "- {} ({}): {:.1} points, grade {}",
            assessment.enterprise_name,
            assessment.enterprise_id,
            assessment.score,
            assessment.grade.label()
        );
        let failed_gates = assessment
            .rule_results
            .iter()
            .filter(|result| result.kind == RuleKind::Hard && result.outcome == RuleOutcome::Fail);
        for failed in failed_gates {
            println!("    hard gate failed: {}", failed.rule_name);
        }
    }
    Ok(())
}

pub(crate) async fn run_match(args: MatchArgs) -> Result<(), AppError> {
    let today = today_or_now(args.today);
    let service = outreach_service(load_roster(None)?, today, engine_settings()?);
    let result = service.submit_match_query(&args.text).await?;
    render_match(&result);
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = today_or_now(args.today);
    let roster = load_roster(args.roster.as_deref())?;
    let service = outreach_service(roster, today, engine_settings()?);
    let program_id = ProgramId(DEMO_PROGRAM.to_string());

    println!("Policy outreach demo ({today})");
    let summary = service.trigger_screening_run(&program_id).await?;
    render_screening(&summary);

    let mut screened = service.list(&AssessmentFilter {
        program_id: Some(program_id.clone()),
        touch_state: Some(TouchState::Screened),
        ..AssessmentFilter::default()
    })?;
    screened.sort_by(|a, b| b.score.total_cmp(&a.score));
    let Some(lead) = screened.into_iter().next() else {
        println!("\nNo qualified companies to follow up.");
        return Ok(());
    };

    println!("\nFollowing up {} ({})", lead.enterprise_name, lead.id);
    walk_case(&service, &lead.id).await?;

    let stats = service.stats(&program_id)?;
    println!(
        "\nFunnel: {} assigned, {} visited, {} willing, {} approved",
        stats.funnel.assigned, stats.funnel.visited, stats.funnel.willing, stats.funnel.approved
    );

    println!("\nDemand matching");
    let result = service
        .submit_match_query("defect inspection with machine vision; edge hardware deployment")
        .await?;
    render_match(&result);
    Ok(())
}

async fn walk_case(
    service: &OutreachService<MemoryAssessmentRepository>,
    id: &AssessmentId,
) -> Result<(), AppError> {
    let suggestion = service.suggest_allocation(id).await?;
    println!(
        "  Suggested caseworker: {} ({:.2}) {}",
        suggestion.top.name, suggestion.top.score, suggestion.rationale
    );

    let receipt = service
        .accept_allocation(
            id,
            AllocationDecision {
                caseworker_id: suggestion.top.caseworker_id.clone(),
                actor: Actor::Admin {
                    name: "dispatch-desk".to_string(),
                },
            },
        )
        .await?;
    println!("  Allocation feedback: {:?}", receipt.feedback.outcome);

    let caseworker = Actor::Caseworker {
        id: suggestion.top.caseworker_id.clone(),
    };
    let steps = [
        (
            TouchAction::RecordVisit {
                visit_record_id: VisitRecordId(format!("visit-{}", id)),
            },
            TouchState::Assigned,
        ),
        (
            TouchAction::MarkWilling {
                note: "management wants the filing checklist".to_string(),
            },
            TouchState::Visited,
        ),
    ];
    for (action, expected_state) in steps {
        let assessment = service.transition(
            id,
            TransitionRequest {
                action,
                actor: caseworker.clone(),
                expected_state: Some(expected_state),
            },
        )?;
        if let Some(state) = assessment.touch_state {
            println!("  Case moved to {}", state.label());
        }
    }

    let backfill = service.backfill_from_visits(id).await?;
    if backfill.promoted > 0 {
        println!(
            "  Visit findings promoted: {} (grade now {})",
            backfill.promoted,
            backfill.assessment.grade.label()
        );
    }

    let diagnosis = service.run_diagnosis(id, caseworker)?;
    println!(
        "  Diagnosis score {:.1}, recommendation: {}",
        diagnosis.score,
        diagnosis.recommendation.label()
    );
    for document in &diagnosis.missing_required {
        println!("    missing: {document}");
    }
    Ok(())
}

fn render_screening(summary: &ScreeningRunSummary) {
    println!(
        "Screening {}: {} evaluated, {} created, {} updated, {} unchanged, {} qualified",
        summary.program_id,
        summary.evaluated,
        summary.created,
        summary.updated,
        summary.unchanged,
        summary.qualified
    );
    if !summary.degraded.is_empty() {
        println!("  Degraded profiles: {}", summary.degraded.len());
    }
    for flagged in &summary.flagged_rules {
        println!("  Skipped rule {}: {}", flagged.rule_id, flagged.reason);
    }
}

fn render_match(result: &MatchResult) {
    if result.degraded {
        println!("(demand parser unavailable, matched on keywords)");
    }
    for entry in &result.sub_tasks {
        println!("Sub-task {}: {}", entry.sub_task.id, entry.sub_task.title);
        if entry.candidates.is_empty() {
            println!("  no candidates");
        }
        for candidate in &entry.candidates {
            println!(
                "  {:>5.1}  {} [{}]",
                candidate.score,
                candidate.name,
                candidate.matched_capabilities.join(", ")
            );
        }
    }

    let combination = &result.combination;
    println!(
        "Combination average {:.1} ({})",
        combination.average_score,
        if combination.meets_threshold {
            "meets threshold"
        } else {
            "below threshold"
        }
    );
    for partner in &combination.partners {
        println!(
            "  {} covers {}",
            partner.name,
            partner.sub_task_ids.join(", ")
        );
    }
    for uncovered in &combination.uncovered {
        println!("  uncovered: {uncovered}");
    }
}
