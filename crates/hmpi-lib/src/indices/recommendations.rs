//! Treatment recommendations derived from an index report

use super::engine::IndexReport;
use super::severity::Band;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplianceStatus {
    Compliant,
    #[serde(rename = "Non-Compliant")]
    NonCompliant,
}

impl ComplianceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "Compliant",
            ComplianceStatus::NonCompliant => "Non-Compliant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub overall: String,
    pub compliance_status: ComplianceStatus,
    pub actions: Vec<String>,
}

const SAFE_ACTIONS: &[&str] = &[
    "Water is safe for drinking",
    "Regular monitoring recommended",
    "Maintain current water treatment processes",
];

const MODERATE_ACTIONS: &[&str] = &[
    "Water requires treatment before consumption",
    "Consider filtration systems",
    "Increase monitoring frequency",
    "Test for specific metal contaminants",
];

const CRITICAL_ACTIONS: &[&str] = &[
    "Water is not safe for drinking",
    "Immediate treatment required",
    "Consider alternative water sources",
    "Consult with water quality experts",
    "Implement emergency treatment measures",
];

const NO_DATA_ACTIONS: &[&str] = &[
    "No usable measurements in this sample",
    "Collect and analyse a new sample before drawing conclusions",
];

/// Build the action list for a report
///
/// Only a Safe HMPI band is compliant; "No data" is not.
pub fn recommend_actions(report: &IndexReport) -> Recommendations {
    let base = match report.hmpi.band {
        Band::Safe => SAFE_ACTIONS,
        Band::Moderate => MODERATE_ACTIONS,
        Band::NoData => NO_DATA_ACTIONS,
        _ => CRITICAL_ACTIONS,
    };

    let mut actions: Vec<String> = base.iter().map(|s| s.to_string()).collect();
    actions.extend(
        report
            .per_metal_cf
            .iter()
            .filter(|(_, f)| matches!(f.band, Band::Considerable | Band::VeryHigh))
            .map(|(metal, _)| format!("High {} levels detected - specific treatment needed", metal)),
    );

    let compliance_status = if report.hmpi.band == Band::Safe {
        ComplianceStatus::Compliant
    } else {
        ComplianceStatus::NonCompliant
    };

    Recommendations {
        overall: report.hmpi.advisory.clone(),
        compliance_status,
        actions,
    }
}
