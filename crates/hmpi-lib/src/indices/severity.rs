//! Severity bands for pollution scores
//!
//! Every metric uses the same structure: ordered, non-overlapping bands
//! keyed by an exclusive upper bound, and a top band for everything above.
//! A score computed from no measurements is reported as `NoData`, never as
//! the lowest band.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity band label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "No data")]
    NoData,
    Safe,
    Low,
    Moderate,
    High,
    Considerable,
    Critical,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl Band {
    pub fn label(&self) -> &'static str {
        match self {
            Band::NoData => "No data",
            Band::Safe => "Safe",
            Band::Low => "Low",
            Band::Moderate => "Moderate",
            Band::High => "High",
            Band::Considerable => "Considerable",
            Band::Critical => "Critical",
            Band::VeryHigh => "Very High",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Threshold table for one metric
#[derive(Debug)]
pub struct SeverityScale {
    /// (exclusive upper bound, band, advisory), ascending
    steps: &'static [(f64, Band, &'static str)],
    top: (Band, &'static str),
    no_data: &'static str,
}

pub const HMPI_SCALE: SeverityScale = SeverityScale {
    steps: &[
        (100.0, Band::Safe, "Suitable for drinking purposes"),
        (200.0, Band::Moderate, "Requires treatment before consumption"),
    ],
    top: (Band::Critical, "Not suitable for drinking"),
    no_data: "Insufficient data for assessment",
};

pub const PLI_SCALE: SeverityScale = SeverityScale {
    steps: &[
        (1.0, Band::Low, "Baseline level - suitable for drinking"),
        (2.0, Band::Moderate, "Moderate level of contamination"),
        (5.0, Band::High, "Significant contamination"),
    ],
    top: (Band::VeryHigh, "High level of contamination"),
    no_data: "Insufficient data for calculation",
};

pub const CF_SCALE: SeverityScale = SeverityScale {
    steps: &[
        (1.0, Band::Low, "Within acceptable limits"),
        (3.0, Band::Moderate, "Moderate contamination"),
        (6.0, Band::Considerable, "Considerable contamination"),
    ],
    top: (Band::VeryHigh, "Very high contamination"),
    no_data: "No concentration data",
};

impl SeverityScale {
    /// Band for a score backed by at least one measurement
    pub fn band(&self, score: f64) -> Band {
        self.lookup(score).0
    }

    fn lookup(&self, score: f64) -> (Band, &'static str) {
        self.steps
            .iter()
            .find(|(upper, _, _)| score < *upper)
            .map(|(_, band, advisory)| (*band, *advisory))
            .unwrap_or(self.top)
    }

    /// Classify a score; `has_data` false forces the no-data band
    pub fn assess(&self, score: f64, has_data: bool) -> Assessment {
        if !has_data || !score.is_finite() {
            return Assessment {
                score: 0.0,
                band: Band::NoData,
                advisory: self.no_data.to_string(),
            };
        }
        let (band, advisory) = self.lookup(score);
        Assessment {
            score,
            band,
            advisory: advisory.to_string(),
        }
    }
}

/// A scored metric with its band and advisory text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub score: f64,
    pub band: Band,
    pub advisory: String,
}

impl Assessment {
    pub fn no_data(advisory: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            band: Band::NoData,
            advisory: advisory.into(),
        }
    }
}

/// Contamination factor of a single metal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetalFactor {
    pub value: f64,
    pub band: Band,
    pub advisory: String,
}

impl From<Assessment> for MetalFactor {
    fn from(a: Assessment) -> Self {
        Self {
            value: a.score,
            band: a.band,
            advisory: a.advisory,
        }
    }
}
