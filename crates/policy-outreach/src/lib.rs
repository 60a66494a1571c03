//! Eligibility grading, outreach workflow and demand matching for business-district
//! policy programs.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod scoring;
pub mod telemetry;
pub mod workflows;
