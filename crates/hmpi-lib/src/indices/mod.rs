//! Pollution index engine
//!
//! Pure computations over a sample: unit normalization, contamination
//! factors, pollution load index, heavy metal pollution index and the
//! severity bands used to report them.

mod engine;
mod normalizer;
mod recommendations;
mod severity;

pub use engine::{
    comprehensive_indices, comprehensive_indices_with_unit, contamination_factor,
    heavy_metal_pollution_index, pollution_load_index, Contribution, HmpiResult, IndexError,
    IndexReport, PLI_CF_FLOOR,
};
pub use normalizer::{convert_to_canonical, detect_unit, median};
pub use recommendations::{recommend_actions, ComplianceStatus, Recommendations};
pub use severity::{Assessment, Band, MetalFactor, SeverityScale, CF_SCALE, HMPI_SCALE, PLI_SCALE};
