//! Contamination factor, PLI and HMPI computation
//!
//! All functions except `comprehensive_indices*` expect a sample already in
//! µg/L. A concentration is usable when it is finite and non-negative;
//! anything else counts as absent for that metal only.

use super::normalizer::{convert_to_canonical, detect_unit};
use super::severity::{Assessment, MetalFactor, CF_SCALE, HMPI_SCALE, PLI_SCALE};
use crate::models::{Metal, Sample, Unit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// Floor applied to each positive CF before the PLI product
pub const PLI_CF_FLOOR: f64 = 0.001;

/// Advisory attached to every metric when computation fails
const CALCULATION_FAILED: &str = "Error in calculation";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("{metric} evaluated to a non-finite value")]
    NonFinite { metric: &'static str },
}

fn usable(value: f64) -> Option<f64> {
    (value.is_finite() && value >= 0.0).then_some(value)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Contamination factor for all ten metals; absent or unusable metals get 0.0
pub fn contamination_factor(sample: &Sample) -> BTreeMap<Metal, f64> {
    Metal::ALL
        .iter()
        .map(|metal| {
            let cf = sample
                .get(*metal)
                .and_then(usable)
                .map(|c| c / metal.standard_limit())
                .unwrap_or(0.0);
            (*metal, cf)
        })
        .collect()
}

/// Geometric mean of the positive contamination factors; 0.0 if there are none
pub fn pollution_load_index(cf_map: &BTreeMap<Metal, f64>) -> f64 {
    let positive: Vec<f64> = cf_map
        .values()
        .copied()
        .filter(|cf| cf.is_finite() && *cf > 0.0)
        .collect();

    if positive.is_empty() {
        return 0.0;
    }

    let product: f64 = positive.iter().map(|cf| cf.max(PLI_CF_FLOOR)).product();
    product.powf(1.0 / positive.len() as f64)
}

/// One metal's share of the HMPI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub concentration: f64,
    pub standard_limit: f64,
    pub qi: f64,
    pub weight: f64,
    pub weighted_qi: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HmpiResult {
    pub score: f64,
    pub contributions: BTreeMap<Metal, Contribution>,
}

impl HmpiResult {
    /// False when no metal had usable data, in which case the score is 0.0
    pub fn has_data(&self) -> bool {
        !self.contributions.is_empty()
    }
}

/// HMPI = Σ(Wi × Qi) / ΣWi with Wi = 1/Si and Qi = 100 × Ci/Si
pub fn heavy_metal_pollution_index(sample: &Sample) -> HmpiResult {
    let mut contributions = BTreeMap::new();
    let mut total_weighted_qi = 0.0;
    let mut total_weight = 0.0;

    for (metal, value) in sample.iter() {
        let Some(concentration) = usable(value) else {
            continue;
        };
        let limit = metal.standard_limit();
        let weight = 1.0 / limit;
        let qi = concentration / limit * 100.0;
        let weighted_qi = weight * qi;

        total_weighted_qi += weighted_qi;
        total_weight += weight;
        contributions.insert(
            metal,
            Contribution {
                concentration,
                standard_limit: limit,
                qi,
                weight,
                weighted_qi,
            },
        );
    }

    let score = if total_weight > 0.0 {
        total_weighted_qi / total_weight
    } else {
        0.0
    };

    HmpiResult {
        score,
        contributions,
    }
}

/// Full index report for one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexReport {
    pub hmpi: Assessment,
    pub pli: Assessment,
    pub total_cf: Assessment,
    pub per_metal_cf: BTreeMap<Metal, MetalFactor>,
    pub contributions: BTreeMap<Metal, Contribution>,
    pub unit_detected: Unit,
}

impl IndexReport {
    /// All-zero report used when computation cannot complete
    pub fn unavailable(unit: Unit) -> Self {
        Self {
            hmpi: Assessment::no_data(CALCULATION_FAILED),
            pli: Assessment::no_data(CALCULATION_FAILED),
            total_cf: Assessment::no_data(CALCULATION_FAILED),
            per_metal_cf: BTreeMap::new(),
            contributions: BTreeMap::new(),
            unit_detected: unit,
        }
    }
}

/// Detect the unit, normalize and compute every index
pub fn comprehensive_indices(sample: &Sample) -> IndexReport {
    comprehensive_indices_with_unit(sample, None)
}

/// Like `comprehensive_indices`, but an explicit unit skips detection
///
/// Never fails: an internal error yields `IndexReport::unavailable`.
pub fn comprehensive_indices_with_unit(sample: &Sample, unit: Option<Unit>) -> IndexReport {
    let unit = unit.unwrap_or_else(|| detect_unit(sample));
    match compute_report(sample, unit) {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, unit = %unit, "Index computation failed, reporting no data");
            IndexReport::unavailable(unit)
        }
    }
}

fn compute_report(sample: &Sample, unit: Unit) -> Result<IndexReport, IndexError> {
    let canonical = convert_to_canonical(sample, unit);

    let hmpi = heavy_metal_pollution_index(&canonical);
    let cf_map = contamination_factor(&canonical);
    let pli = pollution_load_index(&cf_map);
    let total_cf: f64 = cf_map.values().sum();

    for (metric, value) in [("hmpi", hmpi.score), ("pli", pli), ("total_cf", total_cf)] {
        if !value.is_finite() {
            return Err(IndexError::NonFinite { metric });
        }
    }

    let has_data = hmpi.has_data();

    let per_metal_cf = cf_map
        .iter()
        .map(|(metal, cf)| {
            let measured = hmpi.contributions.contains_key(metal);
            let factor = MetalFactor::from(CF_SCALE.assess(round_to(*cf, 3), measured));
            (*metal, factor)
        })
        .collect();

    let contributions = hmpi
        .contributions
        .iter()
        .map(|(metal, c)| {
            let rounded = Contribution {
                concentration: c.concentration,
                standard_limit: c.standard_limit,
                qi: round_to(c.qi, 2),
                weight: round_to(c.weight, 6),
                weighted_qi: round_to(c.weighted_qi, 2),
            };
            (*metal, rounded)
        })
        .collect();

    Ok(IndexReport {
        hmpi: HMPI_SCALE.assess(round_to(hmpi.score, 2), has_data),
        pli: PLI_SCALE.assess(round_to(pli, 2), has_data),
        total_cf: CF_SCALE.assess(round_to(total_cf, 2), has_data),
        per_metal_cf,
        contributions,
        unit_detected: unit,
    })
}
