use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use metrics_exporter_prometheus::PrometheusHandle;
use policy_outreach::collaborators::{
    CandidateDirectory, CaseworkerRoster, CollaboratorError, Collaborators, DemandParser,
    EnterpriseProfileStore, VisitRecordStore,
};
use policy_outreach::config::EngineConfig;
use policy_outreach::error::AppError;
use policy_outreach::workflows::matching::{Candidate, SubTask};
use policy_outreach::workflows::policy::{
    import_roster, Caseworker, Confidence, ConfirmedFinding, EnterpriseId, EnterpriseSnapshot,
    FieldValue, MemoryAssessmentRepository, OutreachService, RuleCatalog, VisitRecordId,
};

const DEFAULT_ROSTER: &str = include_str!("../data/roster.csv");

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Profile store seeded with a handful of district companies.
pub(crate) struct SeededProfiles {
    snapshots: BTreeMap<EnterpriseId, EnterpriseSnapshot>,
}

impl SeededProfiles {
    pub(crate) fn new(captured_on: NaiveDate) -> Self {
        Self {
            snapshots: district_snapshots(captured_on)
                .into_iter()
                .map(|snapshot| (snapshot.enterprise_id.clone(), snapshot))
                .collect(),
        }
    }
}

#[async_trait]
impl EnterpriseProfileStore for SeededProfiles {
    async fn list_enterprises(&self) -> Result<Vec<EnterpriseId>, CollaboratorError> {
        Ok(self.snapshots.keys().cloned().collect())
    }

    async fn get_snapshot(
        &self,
        enterprise_id: &EnterpriseId,
    ) -> Result<Option<EnterpriseSnapshot>, CollaboratorError> {
        Ok(self.snapshots.get(enterprise_id).cloned())
    }
}

fn years_before(date: NaiveDate, years: i64) -> NaiveDate {
    date - Duration::days(years * 365)
}

fn list(values: &[&str]) -> FieldValue {
    FieldValue::List(values.iter().map(|value| (*value).to_string()).collect())
}

fn district_snapshots(captured_on: NaiveDate) -> Vec<EnterpriseSnapshot> {
    vec![
        EnterpriseSnapshot::new(EnterpriseId("ent-001".to_string()), "Helix Biotech", captured_on)
            .with_tags(["biomedicine", "r&d"])
            .with_field("established_date", FieldValue::Date(years_before(captured_on, 6)))
            .with_field("core_ip_count", FieldValue::Number(7.0))
            .with_field("rd_staff_ratio", FieldValue::Number(0.24))
            .with_field("rd_expense_ratio", FieldValue::Number(0.09))
            .with_field("high_tech_revenue_ratio", FieldValue::Number(0.81))
            .with_field("major_violation_last_year", FieldValue::Flag(false))
            .with_field("industry_tags", list(&["biomedicine"]))
            .with_field("revenue_growth", FieldValue::Number(0.21))
            .with_field("university_cooperation", FieldValue::Flag(true))
            .with_field(
                "documents",
                list(&["business license copy", "IP certificates", "R&D staff roster"]),
            ),
        EnterpriseSnapshot::new(EnterpriseId("ent-002".to_string()), "Lumen Devices", captured_on)
            .with_tags(["electronic information", "software"])
            .with_field("established_date", FieldValue::Date(years_before(captured_on, 3)))
            .with_field("core_ip_count", FieldValue::Number(2.0))
            .with_field("rd_staff_ratio", FieldValue::Number(0.15))
            .with_estimate("rd_expense_ratio", FieldValue::Number(0.06), Confidence::Medium)
            .with_field("high_tech_revenue_ratio", FieldValue::Number(0.64))
            .with_field("major_violation_last_year", FieldValue::Flag(false))
            .with_field("industry_tags", list(&["electronic information"]))
            .with_estimate("revenue_growth", FieldValue::Number(0.12), Confidence::Low),
        EnterpriseSnapshot::new(EnterpriseId("ent-003".to_string()), "Sprout Robotics", captured_on)
            .with_tags(["advanced manufacturing"])
            .with_field(
                "established_date",
                FieldValue::Date(captured_on - Duration::days(200)),
            )
            .with_field("core_ip_count", FieldValue::Number(1.0))
            .with_field("rd_staff_ratio", FieldValue::Number(0.4))
            .with_field("rd_expense_ratio", FieldValue::Number(0.2))
            .with_field("high_tech_revenue_ratio", FieldValue::Number(0.9))
            .with_field("major_violation_last_year", FieldValue::Flag(false)),
        EnterpriseSnapshot::new(EnterpriseId("ent-004".to_string()), "Keystone Tooling", captured_on)
            .with_tags(["manufacturing", "new materials"])
            .with_field("established_date", FieldValue::Date(years_before(captured_on, 9)))
            .with_field("main_business_ratio", FieldValue::Number(0.83))
            .with_field("rd_expense_ratio", FieldValue::Number(0.041))
            .with_field("revenue_million", FieldValue::Number(36.0))
            .with_field("core_ip_count", FieldValue::Number(1.0))
            .with_field("revenue_growth", FieldValue::Number(0.07))
            .with_field("niche_market_rank", FieldValue::Number(2.0)),
    ]
}

/// Offline demand parser: each clause separated by `;` or a newline becomes one
/// keyword sub-task.
pub(crate) struct ClauseDemandParser;

#[async_trait]
impl DemandParser for ClauseDemandParser {
    async fn parse(&self, text: &str) -> Result<Vec<SubTask>, CollaboratorError> {
        Ok(text
            .split(|c: char| c == ';' || c == '\n')
            .map(str::trim)
            .filter(|clause| !clause.is_empty())
            .enumerate()
            .map(|(index, clause)| SubTask {
                id: format!("task-{}", index + 1),
                ..SubTask::from_keywords(clause)
            })
            .filter(|sub_task| !sub_task.capabilities.is_empty())
            .collect())
    }
}

/// Visit findings confirmed by caseworkers, keyed by enterprise.
#[derive(Default)]
pub(crate) struct SeededVisitRecords {
    findings: BTreeMap<EnterpriseId, Vec<ConfirmedFinding>>,
}

impl SeededVisitRecords {
    pub(crate) fn district() -> Self {
        let mut findings = BTreeMap::new();
        findings.insert(
            EnterpriseId("ent-002".to_string()),
            vec![ConfirmedFinding {
                field: "rd_expense_ratio".to_string(),
                value: FieldValue::Number(0.058),
                visit_record_id: Some(VisitRecordId("visit-2025-031".to_string())),
            }],
        );
        Self { findings }
    }
}

#[async_trait]
impl VisitRecordStore for SeededVisitRecords {
    async fn get_confirmed_findings(
        &self,
        enterprise_id: &EnterpriseId,
    ) -> Result<Vec<ConfirmedFinding>, CollaboratorError> {
        Ok(self.findings.get(enterprise_id).cloned().unwrap_or_default())
    }
}

pub(crate) struct StaticRoster(pub(crate) Vec<Caseworker>);

#[async_trait]
impl CaseworkerRoster for StaticRoster {
    async fn list(&self) -> Result<Vec<Caseworker>, CollaboratorError> {
        Ok(self.0.clone())
    }
}

pub(crate) struct SeededDirectory {
    candidates: Vec<Candidate>,
}

impl SeededDirectory {
    pub(crate) fn new(today: NaiveDate) -> Self {
        let candidate = |id: &str, name: &str, capabilities: &[&str], activity: f64, days: i64| Candidate {
            enterprise_id: EnterpriseId(id.to_string()),
            name: name.to_string(),
            capabilities: capabilities.iter().map(|cap| (*cap).to_string()).collect(),
            activity_score: activity,
            last_engaged_on: Some(today - Duration::days(days)),
            location: Some("Innovation Park".to_string()),
        };
        Self {
            candidates: vec![
                candidate("inc-101", "Pixelwise Vision", &["vision", "inspection", "defect"], 88.0, 12),
                candidate("inc-102", "Edgeworks", &["edge", "hardware", "deployment"], 74.0, 40),
                candidate("inc-103", "Tabula Data", &["dashboard", "analytics", "reporting"], 65.0, 5),
                candidate("inc-104", "Mapline", &["mapping", "gis", "routing"], 52.0, 210),
            ],
        }
    }
}

#[async_trait]
impl CandidateDirectory for SeededDirectory {
    async fn candidates(&self) -> Result<Vec<Candidate>, CollaboratorError> {
        Ok(self.candidates.clone())
    }
}

/// Roster from the given CSV, or the bundled roster when no path is set.
pub(crate) fn load_roster(path: Option<&Path>) -> Result<Vec<Caseworker>, AppError> {
    let roster = match path {
        Some(path) => import_roster(File::open(path)?)?,
        None => import_roster(DEFAULT_ROSTER.as_bytes())?,
    };
    Ok(roster)
}

pub(crate) fn outreach_service(
    roster: Vec<Caseworker>,
    today: NaiveDate,
    settings: EngineConfig,
) -> OutreachService<MemoryAssessmentRepository> {
    let collaborators = Collaborators {
        profiles: Arc::new(SeededProfiles::new(today)),
        parser: Arc::new(ClauseDemandParser),
        visits: Arc::new(SeededVisitRecords::district()),
        roster: Arc::new(StaticRoster(roster)),
        directory: Arc::new(SeededDirectory::new(today)),
    };
    OutreachService::new(
        Arc::new(MemoryAssessmentRepository::default()),
        collaborators,
        RuleCatalog::standard(),
        settings,
    )
    .with_reference_date(today)
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
