use serde::{Deserialize, Serialize};

use super::super::domain::{Confidence, Grade};

/// Share of a pending rule's weight credited for each confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

/// Minimum score for each letter grade, applied only without a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradeThresholds {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

/// Scoring configuration shared by screening and diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub confidence_factors: ConfidenceFactors,
    pub grade_thresholds: GradeThresholds,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            confidence_factors: ConfidenceFactors {
                high: 0.8,
                medium: 0.5,
                low: 0.2,
            },
            grade_thresholds: GradeThresholds {
                a: 80.0,
                b: 60.0,
                c: 40.0,
            },
        }
    }
}

impl EvaluationConfig {
    pub fn confidence_factor(&self, confidence: Confidence) -> f64 {
        match confidence {
            Confidence::High => self.confidence_factors.high,
            Confidence::Medium => self.confidence_factors.medium,
            Confidence::Low => self.confidence_factors.low,
        }
    }

    pub fn grade_for_score(&self, score: f64) -> Grade {
        let thresholds = &self.grade_thresholds;
        if score >= thresholds.a {
            Grade::A
        } else if score >= thresholds.b {
            Grade::B
        } else if score >= thresholds.c {
            Grade::C
        } else {
            Grade::Unqualified
        }
    }
}
