//! Declarative rule definitions for policy programs.
//!
//! Programs are plain data: the standard catalog below mirrors the programs the
//! district currently screens for, and alternative catalogs can be loaded from JSON
//! without touching the evaluation code.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::{ProgramId, RuleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Hard,
    Soft,
}

impl RuleKind {
    pub const fn label(self) -> &'static str {
        match self {
            RuleKind::Hard => "hard",
            RuleKind::Soft => "soft",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOp {
    AtLeast,
    AtMost,
    GreaterThan,
    LessThan,
}

impl ThresholdOp {
    pub fn holds(self, observed: f64, threshold: f64) -> bool {
        match self {
            ThresholdOp::AtLeast => observed >= threshold,
            ThresholdOp::AtMost => observed <= threshold,
            ThresholdOp::GreaterThan => observed > threshold,
            ThresholdOp::LessThan => observed < threshold,
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            ThresholdOp::AtLeast => ">=",
            ThresholdOp::AtMost => "<=",
            ThresholdOp::GreaterThan => ">",
            ThresholdOp::LessThan => "<",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateUnit {
    Days,
    Months,
    Years,
}

impl DateUnit {
    const fn label(self) -> &'static str {
        match self {
            DateUnit::Days => "days",
            DateUnit::Months => "months",
            DateUnit::Years => "years",
        }
    }
}

/// How a rule compares the snapshot field against its requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Comparator {
    Threshold {
        op: ThresholdOp,
        value: f64,
    },
    Boolean {
        expected: bool,
    },
    Equals {
        expected: String,
    },
    /// Elapsed time from the field's date to the snapshot capture date.
    DateDiff {
        unit: DateUnit,
        #[serde(default)]
        at_least: Option<i64>,
        #[serde(default)]
        at_most: Option<i64>,
    },
    /// Number of list entries found in `any_of` (every entry when `any_of` is empty).
    ContainsCount {
        #[serde(default)]
        any_of: Vec<String>,
        at_least: usize,
    },
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Threshold { op, value } => write!(f, "{} {value}", op.symbol()),
            Comparator::Boolean { expected } => write!(f, "== {expected}"),
            Comparator::Equals { expected } => write!(f, "== {expected}"),
            Comparator::DateDiff {
                unit,
                at_least,
                at_most,
            } => match (at_least, at_most) {
                (Some(min), Some(max)) => write!(f, "{min}..={max} {}", unit.label()),
                (Some(min), None) => write!(f, ">= {min} {}", unit.label()),
                (None, Some(max)) => write!(f, "<= {max} {}", unit.label()),
                (None, None) => write!(f, "unbounded {}", unit.label()),
            },
            Comparator::ContainsCount { any_of, at_least } => {
                if any_of.is_empty() {
                    write!(f, ">= {at_least} entries")
                } else {
                    write!(f, ">= {at_least} of [{}]", any_of.join(", "))
                }
            }
        }
    }
}

/// Single qualification check within a program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub field: String,
    pub kind: RuleKind,
    pub comparator: Comparator,
    pub weight: f64,
    #[serde(default)]
    pub description: String,
}

/// Malformed rule definition. Such rules are skipped and flagged, never passed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleMisconfigured {
    #[error("rule {rule_id} has an invalid weight {weight}")]
    InvalidWeight { rule_id: RuleId, weight: f64 },
    #[error("rule {rule_id} has a non-finite threshold")]
    NonFiniteThreshold { rule_id: RuleId },
    #[error("rule {rule_id} date window has no bound")]
    UnboundedDateWindow { rule_id: RuleId },
    #[error("rule {rule_id} date window is inverted ({at_least} > {at_most})")]
    InvertedDateWindow {
        rule_id: RuleId,
        at_least: i64,
        at_most: i64,
    },
    #[error("rule {rule_id} requires zero matches and would always pass")]
    EmptyCountRequirement { rule_id: RuleId },
    #[error("rule {rule_id} does not name a snapshot field")]
    MissingField { rule_id: RuleId },
}

impl Rule {
    pub fn hard(id: &str, name: &str, field: &str, comparator: Comparator, weight: f64) -> Self {
        Self::build(id, name, field, RuleKind::Hard, comparator, weight)
    }

    pub fn soft(id: &str, name: &str, field: &str, comparator: Comparator, weight: f64) -> Self {
        Self::build(id, name, field, RuleKind::Soft, comparator, weight)
    }

    fn build(
        id: &str,
        name: &str,
        field: &str,
        kind: RuleKind,
        comparator: Comparator,
        weight: f64,
    ) -> Self {
        Self {
            id: RuleId(id.to_string()),
            name: name.to_string(),
            field: field.to_string(),
            kind,
            comparator,
            weight,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn validate(&self) -> Result<(), RuleMisconfigured> {
        if self.field.trim().is_empty() {
            return Err(RuleMisconfigured::MissingField {
                rule_id: self.id.clone(),
            });
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(RuleMisconfigured::InvalidWeight {
                rule_id: self.id.clone(),
                weight: self.weight,
            });
        }

        match &self.comparator {
            Comparator::Threshold { value, .. } if !value.is_finite() => {
                Err(RuleMisconfigured::NonFiniteThreshold {
                    rule_id: self.id.clone(),
                })
            }
            Comparator::DateDiff {
                at_least: None,
                at_most: None,
                ..
            } => Err(RuleMisconfigured::UnboundedDateWindow {
                rule_id: self.id.clone(),
            }),
            Comparator::DateDiff {
                at_least: Some(min),
                at_most: Some(max),
                ..
            } if min > max => Err(RuleMisconfigured::InvertedDateWindow {
                rule_id: self.id.clone(),
                at_least: *min,
                at_most: *max,
            }),
            Comparator::ContainsCount { at_least: 0, .. } => {
                Err(RuleMisconfigured::EmptyCountRequirement {
                    rule_id: self.id.clone(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Supporting document expected for a program application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRequirement {
    pub name: String,
    pub required: bool,
}

/// Denser rule set and material checklist used once a company is willing to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisProfile {
    pub rules: Vec<Rule>,
    pub documents: Vec<DocumentRequirement>,
    /// Snapshot list field holding the names of documents already collected.
    #[serde(default = "default_document_field")]
    pub document_field: String,
    pub low_threshold: f64,
    pub high_threshold: f64,
}

fn default_document_field() -> String {
    "documents".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyProgram {
    pub id: ProgramId,
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub focus_tags: Vec<String>,
    pub rules: Vec<Rule>,
    pub diagnosis: DiagnosisProfile,
}

/// Programs keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleCatalog {
    programs: BTreeMap<ProgramId, PolicyProgram>,
}

impl RuleCatalog {
    pub fn new(programs: Vec<PolicyProgram>) -> Self {
        Self {
            programs: programs
                .into_iter()
                .map(|program| (program.id.clone(), program))
                .collect(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let programs: Vec<PolicyProgram> = serde_json::from_str(raw)?;
        Ok(Self::new(programs))
    }

    pub fn program(&self, id: &ProgramId) -> Option<&PolicyProgram> {
        self.programs.get(id)
    }

    pub fn programs(&self) -> impl Iterator<Item = &PolicyProgram> {
        self.programs.values()
    }

    /// Every misconfigured rule across all programs, for admin review.
    pub fn misconfigurations(&self) -> Vec<RuleMisconfigured> {
        self.programs
            .values()
            .flat_map(|program| program.rules.iter().chain(program.diagnosis.rules.iter()))
            .filter_map(|rule| rule.validate().err())
            .collect()
    }

    pub fn standard() -> Self {
        Self::new(vec![high_tech_enterprise(), specialized_sme()])
    }
}

fn at_least(value: f64) -> Comparator {
    Comparator::Threshold {
        op: ThresholdOp::AtLeast,
        value,
    }
}

fn documents(entries: &[(&str, bool)]) -> Vec<DocumentRequirement> {
    entries
        .iter()
        .map(|(name, required)| DocumentRequirement {
            name: (*name).to_string(),
            required: *required,
        })
        .collect()
}

fn high_tech_enterprise() -> PolicyProgram {
    PolicyProgram {
        id: ProgramId("high_tech_enterprise".to_string()),
        name: "High-Tech Enterprise Recognition".to_string(),
        version: 1,
        focus_tags: vec!["high_tech".to_string(), "r&d".to_string()],
        rules: vec![
            Rule::hard(
                "ht-registered-one-year",
                "Registered for at least one year",
                "established_date",
                Comparator::DateDiff {
                    unit: DateUnit::Years,
                    at_least: Some(1),
                    at_most: None,
                },
                15.0,
            ),
            Rule::hard(
                "ht-core-ip",
                "Owns core intellectual property",
                "core_ip_count",
                at_least(1.0),
                15.0,
            ),
            Rule::hard(
                "ht-rd-staff-ratio",
                "R&D staff at least 10% of headcount",
                "rd_staff_ratio",
                at_least(0.10),
                15.0,
            ),
            Rule::hard(
                "ht-rd-expense-ratio",
                "R&D expense ratio at least 5%",
                "rd_expense_ratio",
                at_least(0.05),
                15.0,
            ),
            Rule::hard(
                "ht-revenue-share",
                "High-tech products at least 60% of revenue",
                "high_tech_revenue_ratio",
                at_least(0.60),
                15.0,
            ),
            Rule::hard(
                "ht-compliance",
                "No major safety or quality violation in the past year",
                "major_violation_last_year",
                Comparator::Boolean { expected: false },
                15.0,
            ),
            Rule::soft(
                "ht-supported-field",
                "Operates in a state-supported technology field",
                "industry_tags",
                Comparator::ContainsCount {
                    any_of: vec![
                        "electronic information".to_string(),
                        "biomedicine".to_string(),
                        "new materials".to_string(),
                        "advanced manufacturing".to_string(),
                        "new energy".to_string(),
                    ],
                    at_least: 1,
                },
                5.0,
            ),
            Rule::soft(
                "ht-growth",
                "Revenue growth at least 10%",
                "revenue_growth",
                at_least(0.10),
                5.0,
            ),
        ],
        diagnosis: DiagnosisProfile {
            rules: vec![
                Rule::soft(
                    "ht-dx-university",
                    "Industry-university research cooperation",
                    "university_cooperation",
                    Comparator::Boolean { expected: true },
                    5.0,
                ),
                Rule::soft(
                    "ht-dx-transfer",
                    "At least three technology transfers in three years",
                    "tech_transfer_count",
                    at_least(3.0),
                    5.0,
                ),
                Rule::soft(
                    "ht-dx-growth",
                    "Steady three-year growth",
                    "three_year_growth",
                    at_least(0.0),
                    5.0,
                ),
            ],
            documents: documents(&[
                ("business license copy", true),
                ("audit reports for the last three years", true),
                ("R&D expense ledger", true),
                ("IP certificates", true),
                ("R&D staff roster", true),
                ("technology transfer evidence", false),
                ("university cooperation agreement", false),
                ("high-tech revenue evidence", true),
            ]),
            document_field: default_document_field(),
            low_threshold: 50.0,
            high_threshold: 80.0,
        },
    }
}

fn specialized_sme() -> PolicyProgram {
    PolicyProgram {
        id: ProgramId("specialized_sme".to_string()),
        name: "Specialized and Sophisticated SME".to_string(),
        version: 1,
        focus_tags: vec!["manufacturing".to_string(), "sme".to_string()],
        rules: vec![
            Rule::hard(
                "sme-operating-two-years",
                "Operating for at least two years",
                "established_date",
                Comparator::DateDiff {
                    unit: DateUnit::Years,
                    at_least: Some(2),
                    at_most: None,
                },
                20.0,
            ),
            Rule::hard(
                "sme-main-business",
                "Main business at least 70% of revenue",
                "main_business_ratio",
                at_least(0.70),
                20.0,
            ),
            Rule::hard(
                "sme-rd-expense",
                "R&D expense ratio at least 3%",
                "rd_expense_ratio",
                at_least(0.03),
                20.0,
            ),
            Rule::soft(
                "sme-revenue",
                "Annual revenue at least 10 million",
                "revenue_million",
                at_least(10.0),
                15.0,
            ),
            Rule::soft(
                "sme-ip",
                "At least two invention patents",
                "core_ip_count",
                at_least(2.0),
                15.0,
            ),
            Rule::soft(
                "sme-growth",
                "Revenue growth at least 5%",
                "revenue_growth",
                at_least(0.05),
                10.0,
            ),
        ],
        diagnosis: DiagnosisProfile {
            rules: vec![Rule::soft(
                "sme-dx-niche",
                "Niche market share leader",
                "niche_market_rank",
                Comparator::Threshold {
                    op: ThresholdOp::AtMost,
                    value: 3.0,
                },
                10.0,
            )],
            documents: documents(&[
                ("business license copy", true),
                ("financial statements", true),
                ("patent certificates", true),
                ("market share evidence", false),
            ]),
            document_field: default_document_field(),
            low_threshold: 50.0,
            high_threshold: 75.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_is_well_formed() {
        let catalog = RuleCatalog::standard();
        assert!(catalog.misconfigurations().is_empty());
        let high_tech = catalog
            .program(&ProgramId("high_tech_enterprise".to_string()))
            .expect("program present");
        let hard = high_tech
            .rules
            .iter()
            .filter(|rule| rule.kind == RuleKind::Hard)
            .count();
        assert_eq!(hard, 6);
    }

    #[test]
    fn validate_flags_malformed_thresholds() {
        let rule = Rule::hard("r", "nan", "field", at_least(f64::NAN), 10.0);
        assert!(matches!(
            rule.validate(),
            Err(RuleMisconfigured::NonFiniteThreshold { .. })
        ));

        let inverted = Rule::soft(
            "d",
            "window",
            "established_date",
            Comparator::DateDiff {
                unit: DateUnit::Days,
                at_least: Some(30),
                at_most: Some(10),
            },
            1.0,
        );
        assert!(matches!(
            inverted.validate(),
            Err(RuleMisconfigured::InvertedDateWindow { .. })
        ));
    }

    #[test]
    fn catalog_round_trips_through_json() {
        let catalog = RuleCatalog::standard();
        let programs: Vec<&PolicyProgram> = catalog.programs().collect();
        let raw = serde_json::to_string(&programs).expect("serialize");
        let loaded = RuleCatalog::from_json(&raw).expect("deserialize");
        assert_eq!(loaded, catalog);
    }
}
