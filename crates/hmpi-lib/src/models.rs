//! Core data models for water sample analysis

use crate::error::{HmpiError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Number of metals tracked by the index engine and the classifier
pub const METAL_COUNT: usize = 10;

/// Heavy metals covered by the regulatory limit table, in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metal {
    Arsenic,
    Lead,
    Cadmium,
    Chromium,
    Mercury,
    Nickel,
    Copper,
    Zinc,
    Iron,
    Manganese,
}

impl Metal {
    /// All metals in the order the classifier features are laid out
    pub const ALL: [Metal; METAL_COUNT] = [
        Metal::Arsenic,
        Metal::Lead,
        Metal::Cadmium,
        Metal::Chromium,
        Metal::Mercury,
        Metal::Nickel,
        Metal::Copper,
        Metal::Zinc,
        Metal::Iron,
        Metal::Manganese,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metal::Arsenic => "arsenic",
            Metal::Lead => "lead",
            Metal::Cadmium => "cadmium",
            Metal::Chromium => "chromium",
            Metal::Mercury => "mercury",
            Metal::Nickel => "nickel",
            Metal::Copper => "copper",
            Metal::Zinc => "zinc",
            Metal::Iron => "iron",
            Metal::Manganese => "manganese",
        }
    }

    /// Drinking water limit in µg/L
    pub fn standard_limit(&self) -> f64 {
        match self {
            Metal::Arsenic => 10.0,
            Metal::Lead => 10.0,
            Metal::Cadmium => 3.0,
            Metal::Chromium => 50.0,
            Metal::Mercury => 1.0,
            Metal::Nickel => 20.0,
            Metal::Copper => 2000.0,
            Metal::Zinc => 5000.0,
            Metal::Iron => 300.0,
            Metal::Manganese => 100.0,
        }
    }

    /// Position in the canonical feature order
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Metal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metal {
    type Err = HmpiError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        Metal::ALL
            .iter()
            .copied()
            .find(|m| m.name() == lowered)
            .ok_or_else(|| HmpiError::UnknownMetal(s.to_string()))
    }
}

/// Concentration unit of a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "mg/L")]
    MilligramsPerLiter,
    #[serde(rename = "µg/L", alias = "ug/L")]
    MicrogramsPerLiter,
}

impl Unit {
    /// Unit all index computation assumes
    pub const CANONICAL: Unit = Unit::MicrogramsPerLiter;

    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::MilligramsPerLiter => "mg/L",
            Unit::MicrogramsPerLiter => "µg/L",
        }
    }

    /// Multiplier that converts a value in this unit to µg/L
    pub fn to_canonical_factor(&self) -> f64 {
        match self {
            Unit::MilligramsPerLiter => 1000.0,
            Unit::MicrogramsPerLiter => 1.0,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = HmpiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mg/l" => Ok(Unit::MilligramsPerLiter),
            "µg/l" | "ug/l" | "μg/l" => Ok(Unit::MicrogramsPerLiter),
            _ => Err(HmpiError::UnknownUnit(s.to_string())),
        }
    }
}

/// Where a sample was taken
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// A water sample: metal concentrations plus optional location
///
/// Only metals that were measured are present. Absent metals read as 0.0
/// and contribute nothing to the indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub concentrations: BTreeMap<Metal, f64>,
    #[serde(default)]
    pub location: Location,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for a concentration
    pub fn with(mut self, metal: Metal, value: f64) -> Self {
        self.concentrations.insert(metal, value);
        self
    }

    pub fn set(&mut self, metal: Metal, value: f64) {
        self.concentrations.insert(metal, value);
    }

    /// Measured value, if the metal is present
    pub fn get(&self, metal: Metal) -> Option<f64> {
        self.concentrations.get(&metal).copied()
    }

    /// Measured value, defaulting to 0.0 when absent
    pub fn concentration(&self, metal: Metal) -> f64 {
        self.get(metal).unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metal, f64)> + '_ {
        self.concentrations.iter().map(|(m, v)| (*m, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.concentrations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.concentrations.len()
    }
}

/// Fixed-length classifier input in canonical metal order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; METAL_COUNT]);

impl FeatureVector {
    /// Zero-filled for metals absent from the sample
    pub fn from_sample(sample: &Sample) -> Self {
        let mut values = [0.0; METAL_COUNT];
        for metal in Metal::ALL {
            let v = sample.concentration(metal);
            values[metal.index()] = if v.is_finite() { v } else { 0.0 };
        }
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// A single scalar cell from an ingested table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Null,
}

impl CellValue {
    /// Numeric interpretation; text is parsed, anything else yields None
    pub fn as_f64(&self) -> Option<f64> {
        let v = match self {
            CellValue::Number(n) => *n,
            CellValue::Text(s) => s.trim().parse::<f64>().ok()?,
            CellValue::Bool(_) | CellValue::Null => return None,
        };
        v.is_finite().then_some(v)
    }

    /// True for null, blank text and NaN
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Number(n) => n.is_nan(),
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Bool(_) => false,
        }
    }

    /// Text rendering used for location names
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Text(s) if !s.trim().is_empty() => Some(s.clone()),
            CellValue::Number(n) if n.is_finite() => Some(n.to_string()),
            CellValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Number(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

/// One ingested row: column name to scalar value
pub type Row = BTreeMap<String, CellValue>;

/// Tabular input for batch processing
#[derive(Debug, Clone, Default)]
pub struct RowSource {
    rows: Vec<Row>,
    available_metals: Vec<Metal>,
}

impl RowSource {
    /// Build a row source with an explicit set of metal columns
    pub fn new<S: AsRef<str>>(rows: Vec<Row>, metal_names: &[S]) -> Result<Self> {
        let mut available_metals = Vec::with_capacity(metal_names.len());
        for name in metal_names {
            let metal: Metal = name.as_ref().parse()?;
            if !available_metals.contains(&metal) {
                available_metals.push(metal);
            }
        }
        Ok(Self {
            rows,
            available_metals,
        })
    }

    /// Build a row source, inferring the metal columns from the row keys
    ///
    /// Columns named exactly after a metal (ignoring case) win. When none
    /// match, a column containing a metal name is mapped to that metal and
    /// renamed in every row.
    pub fn from_rows(mut rows: Vec<Row>) -> Self {
        let columns: BTreeSet<String> = rows.iter().flat_map(|r| r.keys().cloned()).collect();

        let mut mapping: Vec<(Metal, String)> = Metal::ALL
            .iter()
            .filter_map(|m| {
                columns
                    .iter()
                    .find(|c| c.to_lowercase() == m.name())
                    .map(|c| (*m, c.clone()))
            })
            .collect();

        if mapping.is_empty() {
            mapping = Metal::ALL
                .iter()
                .filter_map(|m| {
                    columns
                        .iter()
                        .find(|c| c.to_lowercase().contains(m.name()))
                        .map(|c| (*m, c.clone()))
                })
                .collect();
        }

        for (metal, column) in &mapping {
            if column != metal.name() {
                for row in rows.iter_mut() {
                    if let Some(value) = row.remove(column) {
                        row.insert(metal.name().to_string(), value);
                    }
                }
            }
        }

        Self {
            rows,
            available_metals: mapping.into_iter().map(|(m, _)| m).collect(),
        }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn available_metals(&self) -> &[Metal] {
        &self.available_metals
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Row>, Vec<Metal>) {
        (self.rows, self.available_metals)
    }
}
