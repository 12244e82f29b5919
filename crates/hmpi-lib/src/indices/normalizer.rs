//! Concentration unit detection and conversion
//!
//! Regulatory limits sit between 1 and 5000 µg/L, so samples reported in
//! mg/L cluster at or below 1. Detection looks at the median of the
//! measured values and, in the ambiguous band, at how many values are tiny.

use crate::models::{Sample, Unit};

/// Median below this is always mg/L
const MG_MEDIAN_CEILING: f64 = 0.01;

/// Median at or above this is always µg/L
const UG_MEDIAN_FLOOR: f64 = 1.0;

/// Values below this count as "low" in the ambiguous band
const LOW_VALUE: f64 = 0.1;

/// Share of low values needed to call an ambiguous sample mg/L
const LOW_VALUE_FRACTION: f64 = 0.6;

/// Infer the unit a sample's concentrations are expressed in
///
/// Only positive finite values are considered; zeros read the same in any
/// unit. A sample without such values defaults to µg/L.
pub fn detect_unit(sample: &Sample) -> Unit {
    let mut values: Vec<f64> = sample
        .iter()
        .map(|(_, v)| v)
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();

    if values.is_empty() {
        return Unit::MicrogramsPerLiter;
    }

    let median = median(&mut values);

    if median < MG_MEDIAN_CEILING {
        Unit::MilligramsPerLiter
    } else if median < UG_MEDIAN_FLOOR {
        let low_count = values.iter().filter(|v| **v < LOW_VALUE).count();
        if low_count as f64 >= values.len() as f64 * LOW_VALUE_FRACTION {
            Unit::MilligramsPerLiter
        } else {
            Unit::MicrogramsPerLiter
        }
    } else {
        Unit::MicrogramsPerLiter
    }
}

/// Convert every concentration to µg/L
///
/// Non-finite values become 0.0. Location data passes through untouched.
pub fn convert_to_canonical(sample: &Sample, unit: Unit) -> Sample {
    let factor = unit.to_canonical_factor();
    let concentrations = sample
        .iter()
        .map(|(metal, v)| {
            let converted = if v.is_finite() { v * factor } else { 0.0 };
            (metal, converted)
        })
        .collect();

    Sample {
        concentrations,
        location: sample.location.clone(),
    }
}

/// Median of a non-empty slice; the two middle values are averaged for even lengths
pub fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
