use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::collaborators::{
    CandidateDirectory, CaseworkerRoster, CollaboratorError, Collaborators, DemandParser,
    EnterpriseProfileStore, VisitRecordStore,
};
use crate::config::EngineConfig;
use crate::workflows::matching::{Candidate, SubTask};
use crate::workflows::policy::allocation::Caseworker;
use crate::workflows::policy::catalog::{
    Comparator, DiagnosisProfile, DocumentRequirement, PolicyProgram, Rule, RuleCatalog,
    ThresholdOp,
};
use crate::workflows::policy::domain::{
    AssessmentId, CaseworkerId, ConfirmedFinding, EnterpriseId, EnterpriseSnapshot, FieldValue,
    ProgramId,
};
use crate::workflows::policy::repository::MemoryAssessmentRepository;
use crate::workflows::policy::service::OutreachService;

pub(super) const PROGRAM: &str = "pilot_program";

pub(super) fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 30).expect("valid date")
}

pub(super) fn program_id() -> ProgramId {
    ProgramId(PROGRAM.to_string())
}

pub(super) fn assessment_id(enterprise: &str) -> AssessmentId {
    AssessmentId::for_pair(&EnterpriseId(enterprise.to_string()), &program_id())
}

pub(super) fn at_least(value: f64) -> Comparator {
    Comparator::Threshold {
        op: ThresholdOp::AtLeast,
        value,
    }
}

/// Six hard gates worth 10 each, a 25-point growth rule and a 15-point patent rule.
pub(super) fn pilot_program() -> PolicyProgram {
    let mut rules: Vec<Rule> = (1..=6)
        .map(|index| {
            Rule::hard(
                &format!("gate-{index}"),
                &format!("Gate {index}"),
                &format!("gate_{index}"),
                at_least(1.0),
                10.0,
            )
        })
        .collect();
    rules.push(Rule::soft(
        "growth",
        "Revenue growth at least 10%",
        "revenue_growth",
        at_least(0.10),
        25.0,
    ));
    rules.push(Rule::soft(
        "patents",
        "At least five patents",
        "patent_count",
        at_least(5.0),
        15.0,
    ));

    PolicyProgram {
        id: program_id(),
        name: "Pilot Program".to_string(),
        version: 1,
        focus_tags: vec!["software".to_string()],
        rules,
        diagnosis: DiagnosisProfile {
            rules: vec![Rule::soft(
                "dx-university",
                "University partnership",
                "university_partner",
                Comparator::Boolean { expected: true },
                10.0,
            )],
            documents: vec![
                DocumentRequirement {
                    name: "business license".to_string(),
                    required: true,
                },
                DocumentRequirement {
                    name: "audit report".to_string(),
                    required: true,
                },
                DocumentRequirement {
                    name: "patent certificates".to_string(),
                    required: false,
                },
            ],
            document_field: "documents".to_string(),
            low_threshold: 50.0,
            high_threshold: 80.0,
        },
    }
}

pub(super) fn catalog() -> RuleCatalog {
    RuleCatalog::new(vec![pilot_program()])
}

/// Passes every gate and the growth rule but misses the patent rule: 85 points, grade A.
pub(super) fn qualifying_snapshot(enterprise: &str) -> EnterpriseSnapshot {
    let mut snapshot = EnterpriseSnapshot::new(
        EnterpriseId(enterprise.to_string()),
        format!("{enterprise} Ltd"),
        reference_date(),
    )
    .with_tags(["software", "ai"])
    .with_field("revenue_growth", FieldValue::Number(0.22))
    .with_field("patent_count", FieldValue::Number(2.0))
    .with_field("university_partner", FieldValue::Flag(true))
    .with_field(
        "documents",
        FieldValue::List(vec!["Business License".to_string()]),
    );
    for index in 1..=6 {
        snapshot = snapshot.with_field(&format!("gate_{index}"), FieldValue::Number(1.0));
    }
    snapshot
}

pub(super) fn caseworker(id: &str, tags: &[&str], conversion_rate: f64, open_load: u32) -> Caseworker {
    Caseworker {
        id: CaseworkerId(id.to_string()),
        name: format!("Caseworker {id}"),
        specialty_tags: tags.iter().map(|tag| (*tag).to_string()).collect(),
        conversion_rate,
        open_load,
    }
}

pub(super) fn roster() -> Vec<Caseworker> {
    vec![
        caseworker("cw-li", &["software", "ai"], 0.4, 2),
        caseworker("cw-wang", &["manufacturing"], 0.6, 1),
        caseworker("cw-zhao", &["software"], 0.3, 9),
    ]
}

pub(super) fn candidate(id: &str, capabilities: &[&str], activity: f64) -> Candidate {
    Candidate {
        enterprise_id: EnterpriseId(id.to_string()),
        name: format!("{id} Studio"),
        capabilities: capabilities.iter().map(|cap| (*cap).to_string()).collect(),
        activity_score: activity,
        last_engaged_on: Some(reference_date()),
        location: None,
    }
}

#[derive(Default)]
pub(super) struct StaticProfiles {
    snapshots: Mutex<BTreeMap<EnterpriseId, EnterpriseSnapshot>>,
    failing: Mutex<BTreeSet<EnterpriseId>>,
}

impl StaticProfiles {
    pub(super) fn put(&self, snapshot: EnterpriseSnapshot) {
        self.snapshots
            .lock()
            .expect("profile mutex poisoned")
            .insert(snapshot.enterprise_id.clone(), snapshot);
    }

    pub(super) fn fail_for(&self, enterprise: &str) {
        self.failing
            .lock()
            .expect("profile mutex poisoned")
            .insert(EnterpriseId(enterprise.to_string()));
    }
}

#[async_trait]
impl EnterpriseProfileStore for StaticProfiles {
    async fn list_enterprises(&self) -> Result<Vec<EnterpriseId>, CollaboratorError> {
        let mut ids: BTreeSet<EnterpriseId> = self
            .snapshots
            .lock()
            .expect("profile mutex poisoned")
            .keys()
            .cloned()
            .collect();
        ids.extend(
            self.failing
                .lock()
                .expect("profile mutex poisoned")
                .iter()
                .cloned(),
        );
        Ok(ids.into_iter().collect())
    }

    async fn get_snapshot(
        &self,
        enterprise_id: &EnterpriseId,
    ) -> Result<Option<EnterpriseSnapshot>, CollaboratorError> {
        if self
            .failing
            .lock()
            .expect("profile mutex poisoned")
            .contains(enterprise_id)
        {
            return Err(CollaboratorError::failed("profiles", "upstream 503"));
        }
        Ok(self
            .snapshots
            .lock()
            .expect("profile mutex poisoned")
            .get(enterprise_id)
            .cloned())
    }
}

pub(super) struct FixedParser(pub(super) Vec<SubTask>);

#[async_trait]
impl DemandParser for FixedParser {
    async fn parse(&self, _text: &str) -> Result<Vec<SubTask>, CollaboratorError> {
        Ok(self.0.clone())
    }
}

pub(super) struct SlowParser;

#[async_trait]
impl DemandParser for SlowParser {
    async fn parse(&self, _text: &str) -> Result<Vec<SubTask>, CollaboratorError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(vec![SubTask::new("late", "Late answer", &["never"])])
    }
}

#[derive(Default)]
pub(super) struct StaticVisits {
    findings: Mutex<Vec<ConfirmedFinding>>,
    offline: Mutex<bool>,
}

impl StaticVisits {
    pub(super) fn confirm(&self, field: &str, value: FieldValue) {
        self.findings
            .lock()
            .expect("visit mutex poisoned")
            .push(ConfirmedFinding {
                field: field.to_string(),
                value,
                visit_record_id: None,
            });
    }

    pub(super) fn go_offline(&self) {
        *self.offline.lock().expect("visit mutex poisoned") = true;
    }
}

#[async_trait]
impl VisitRecordStore for StaticVisits {
    async fn get_confirmed_findings(
        &self,
        _enterprise_id: &EnterpriseId,
    ) -> Result<Vec<ConfirmedFinding>, CollaboratorError> {
        if *self.offline.lock().expect("visit mutex poisoned") {
            return Err(CollaboratorError::failed("visits", "connection refused"));
        }
        Ok(self.findings.lock().expect("visit mutex poisoned").clone())
    }
}

pub(super) struct StaticRoster(pub(super) Vec<Caseworker>);

#[async_trait]
impl CaseworkerRoster for StaticRoster {
    async fn list(&self) -> Result<Vec<Caseworker>, CollaboratorError> {
        Ok(self.0.clone())
    }
}

pub(super) struct StaticDirectory(pub(super) Vec<Candidate>);

#[async_trait]
impl CandidateDirectory for StaticDirectory {
    async fn candidates(&self) -> Result<Vec<Candidate>, CollaboratorError> {
        Ok(self.0.clone())
    }
}

pub(super) fn engine_config() -> EngineConfig {
    EngineConfig {
        collaborator_timeout_ms: 50,
        ..EngineConfig::default()
    }
}

pub(super) struct Harness {
    pub(super) service: OutreachService<MemoryAssessmentRepository>,
    pub(super) repository: Arc<MemoryAssessmentRepository>,
    pub(super) profiles: Arc<StaticProfiles>,
    pub(super) visits: Arc<StaticVisits>,
}

pub(super) fn harness_with_parser(parser: Arc<dyn DemandParser>) -> Harness {
    let repository = Arc::new(MemoryAssessmentRepository::default());
    let profiles = Arc::new(StaticProfiles::default());
    let visits = Arc::new(StaticVisits::default());
    let collaborators = Collaborators {
        profiles: profiles.clone(),
        parser,
        visits: visits.clone(),
        roster: Arc::new(StaticRoster(roster())),
        directory: Arc::new(StaticDirectory(vec![
            candidate("ent-vision", &["computer vision", "edge devices"], 80.0),
            candidate("ent-cloud", &["cloud hosting", "edge devices"], 60.0),
            candidate("ent-idle", &["catering"], 90.0),
        ])),
    };
    let service = OutreachService::new(repository.clone(), collaborators, catalog(), engine_config())
        .with_reference_date(reference_date());
    Harness {
        service,
        repository,
        profiles,
        visits,
    }
}

pub(super) fn harness() -> Harness {
    harness_with_parser(Arc::new(FixedParser(vec![
        SubTask::new("vision", "Defect detection", &["computer vision"]),
        SubTask::new("hosting", "Edge hosting", &["edge devices", "cloud hosting"]),
    ])))
}

/// Harness with `ent-1` screened into a live case.
pub(super) async fn screened_harness() -> Harness {
    let harness = harness();
    harness.profiles.put(qualifying_snapshot("ent-1"));
    harness
        .service
        .trigger_screening_run(&program_id())
        .await
        .expect("screening run succeeds");
    harness
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
