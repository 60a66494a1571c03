//! End-to-end outreach scenarios driven through the public service facade with the
//! standard program catalog.

mod common {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use policy_outreach::collaborators::{
        CandidateDirectory, CaseworkerRoster, CollaboratorError, Collaborators, DemandParser,
        EnterpriseProfileStore, VisitRecordStore,
    };
    use policy_outreach::config::EngineConfig;
    use policy_outreach::workflows::matching::{Candidate, SubTask};
    use policy_outreach::workflows::policy::{
        Caseworker, CaseworkerId, ConfirmedFinding, EnterpriseId, EnterpriseSnapshot, FieldValue,
        MemoryAssessmentRepository, OutreachService, RuleCatalog,
    };

    pub(super) fn captured_on() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).expect("valid date")
    }

    pub(super) fn high_tech_snapshot(id: &str, established: NaiveDate) -> EnterpriseSnapshot {
        EnterpriseSnapshot::new(EnterpriseId(id.to_string()), format!("{id} Biotech"), captured_on())
            .with_tags(["biomedicine"])
            .with_field("established_date", FieldValue::Date(established))
            .with_field("core_ip_count", FieldValue::Number(4.0))
            .with_field("rd_staff_ratio", FieldValue::Number(0.22))
            .with_field("rd_expense_ratio", FieldValue::Number(0.08))
            .with_field("high_tech_revenue_ratio", FieldValue::Number(0.72))
            .with_field("major_violation_last_year", FieldValue::Flag(false))
            .with_field(
                "industry_tags",
                FieldValue::List(vec!["Biomedicine".to_string()]),
            )
            .with_field("revenue_growth", FieldValue::Number(0.18))
    }

    struct Profiles(Vec<EnterpriseSnapshot>);

    #[async_trait]
    impl EnterpriseProfileStore for Profiles {
        async fn list_enterprises(&self) -> Result<Vec<EnterpriseId>, CollaboratorError> {
            Ok(self.0.iter().map(|s| s.enterprise_id.clone()).collect())
        }

        async fn get_snapshot(
            &self,
            enterprise_id: &EnterpriseId,
        ) -> Result<Option<EnterpriseSnapshot>, CollaboratorError> {
            Ok(self
                .0
                .iter()
                .find(|snapshot| &snapshot.enterprise_id == enterprise_id)
                .cloned())
        }
    }

    struct NoParser;

    #[async_trait]
    impl DemandParser for NoParser {
        async fn parse(&self, _text: &str) -> Result<Vec<SubTask>, CollaboratorError> {
            Err(CollaboratorError::failed("demand parser", "not deployed"))
        }
    }

    struct NoVisits;

    #[async_trait]
    impl VisitRecordStore for NoVisits {
        async fn get_confirmed_findings(
            &self,
            _enterprise_id: &EnterpriseId,
        ) -> Result<Vec<ConfirmedFinding>, CollaboratorError> {
            Ok(Vec::new())
        }
    }

    struct Roster;

    #[async_trait]
    impl CaseworkerRoster for Roster {
        async fn list(&self) -> Result<Vec<Caseworker>, CollaboratorError> {
            Ok(vec![Caseworker {
                id: CaseworkerId("cw-sun".to_string()),
                name: "Sun Mei".to_string(),
                specialty_tags: vec!["biomedicine".to_string(), "high_tech".to_string()],
                conversion_rate: 0.5,
                open_load: 3,
            }])
        }
    }

    struct Directory;

    #[async_trait]
    impl CandidateDirectory for Directory {
        async fn candidates(&self) -> Result<Vec<Candidate>, CollaboratorError> {
            Ok(vec![Candidate {
                enterprise_id: EnterpriseId("ent-lab".to_string()),
                name: "Lab Partner".to_string(),
                capabilities: vec!["assay".to_string(), "sequencing".to_string()],
                activity_score: 70.0,
                last_engaged_on: Some(captured_on()),
                location: Some("Building 3".to_string()),
            }])
        }
    }

    pub(super) fn service(
        snapshots: Vec<EnterpriseSnapshot>,
    ) -> OutreachService<MemoryAssessmentRepository> {
        let collaborators = Collaborators {
            profiles: Arc::new(Profiles(snapshots)),
            parser: Arc::new(NoParser),
            visits: Arc::new(NoVisits),
            roster: Arc::new(Roster),
            directory: Arc::new(Directory),
        };
        OutreachService::new(
            Arc::new(MemoryAssessmentRepository::default()),
            collaborators,
            RuleCatalog::standard(),
            EngineConfig::default(),
        )
        .with_reference_date(captured_on())
    }
}

use chrono::NaiveDate;
use policy_outreach::workflows::policy::{
    Actor, AllocationDecision, AssessmentId, CaseworkerId, EnterpriseId, Grade, ProgramId,
    TouchAction, TouchState, TransitionRequest, VisitRecordId,
};

fn high_tech() -> ProgramId {
    ProgramId("high_tech_enterprise".to_string())
}

fn id(enterprise: &str) -> AssessmentId {
    AssessmentId::for_pair(&EnterpriseId(enterprise.to_string()), &high_tech())
}

fn caseworker() -> Actor {
    Actor::Caseworker {
        id: CaseworkerId("cw-sun".to_string()),
    }
}

fn step(action: TouchAction, expected_state: TouchState) -> TransitionRequest {
    TransitionRequest {
        action,
        actor: caseworker(),
        expected_state: Some(expected_state),
    }
}

#[tokio::test]
async fn qualified_enterprise_moves_from_screening_to_approval() {
    let established = NaiveDate::from_ymd_opt(2019, 3, 1).expect("valid");
    let service = common::service(vec![common::high_tech_snapshot("ent-bio", established)]);

    let summary = service
        .trigger_screening_run(&high_tech())
        .await
        .expect("screening run");
    assert_eq!(summary.qualified, 1);

    let record = service.assessment(&id("ent-bio")).expect("stored");
    assert_eq!(record.assessment.score, 100.0);
    assert_eq!(record.assessment.grade, Grade::A);

    service
        .accept_allocation(
            &id("ent-bio"),
            AllocationDecision {
                caseworker_id: CaseworkerId("cw-sun".to_string()),
                actor: Actor::Admin {
                    name: "dispatcher".to_string(),
                },
            },
        )
        .await
        .expect("allocated");
    service
        .transition(
            &id("ent-bio"),
            step(
                TouchAction::RecordVisit {
                    visit_record_id: VisitRecordId("visit-9".to_string()),
                },
                TouchState::Assigned,
            ),
        )
        .expect("visited");
    service
        .transition(
            &id("ent-bio"),
            step(
                TouchAction::MarkWilling {
                    note: "GM asked for the checklist".to_string(),
                },
                TouchState::Visited,
            ),
        )
        .expect("willing");

    let diagnosis = service
        .run_diagnosis(&id("ent-bio"), caseworker())
        .expect("diagnosis");
    assert!(!diagnosis.missing_required.is_empty());

    let approved = service
        .transition(
            &id("ent-bio"),
            TransitionRequest {
                action: TouchAction::Approve,
                actor: Actor::Admin {
                    name: "review-board".to_string(),
                },
                expected_state: Some(TouchState::Diagnosed),
            },
        )
        .expect("approved");
    assert_eq!(approved.touch_state, Some(TouchState::Approved));

    let stats = service.stats(&high_tech()).expect("stats");
    assert_eq!(stats.funnel.approved, 1);
    assert_eq!(stats.funnel.willing, 1);
}

#[tokio::test]
async fn young_company_fails_the_registration_gate() {
    let established = NaiveDate::from_ymd_opt(2024, 9, 1).expect("valid");
    let service = common::service(vec![common::high_tech_snapshot("ent-young", established)]);

    service
        .trigger_screening_run(&high_tech())
        .await
        .expect("screening run");

    let record = service.assessment(&id("ent-young")).expect("stored");
    assert_eq!(record.assessment.grade, Grade::Unqualified);
    assert!(record.assessment.has_hard_failure());
    assert_eq!(record.assessment.touch_state, None);
}

#[tokio::test]
async fn failed_parser_still_answers_match_queries() {
    let service = common::service(Vec::new());

    let result = service
        .submit_match_query("sequencing partner for assay validation")
        .await
        .expect("degraded answer");

    assert!(result.degraded);
    assert_eq!(result.sub_tasks.len(), 1);
    assert_eq!(
        result.sub_tasks[0].candidates[0].enterprise_id,
        EnterpriseId("ent-lab".to_string())
    );
}
