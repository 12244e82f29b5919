//! Offline index computation

use anyhow::Result;
use colored::Colorize;
use hmpi_lib::indices::{comprehensive_indices_with_unit, recommend_actions, IndexReport, Recommendations};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use super::{parse_sample, parse_unit};
use crate::output::{color_band, color_status, format_score, print_json, OutputFormat};

/// Row for the summary table
#[derive(Tabled)]
struct IndexRow {
    #[tabled(rename = "Index")]
    index: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Band")]
    band: String,
    #[tabled(rename = "Advisory")]
    advisory: String,
}

/// Row for per-metal contamination factors
#[derive(Tabled)]
struct MetalRow {
    #[tabled(rename = "Metal")]
    metal: String,
    #[tabled(rename = "Conc (µg/L)")]
    concentration: String,
    #[tabled(rename = "Limit (µg/L)")]
    limit: String,
    #[tabled(rename = "CF")]
    cf: String,
    #[tabled(rename = "Band")]
    band: String,
}

#[derive(Serialize)]
struct IndicesOutput<'a> {
    indices: &'a IndexReport,
    recommendations: &'a Recommendations,
}

/// Compute and print indices for the given measurements
pub fn compute(measurements: &[String], unit: Option<&str>, format: OutputFormat) -> Result<()> {
    let sample = parse_sample(measurements)?;
    let unit = parse_unit(unit)?;

    let report = comprehensive_indices_with_unit(&sample, unit);
    let recommendations = recommend_actions(&report);

    match format {
        OutputFormat::Json => print_json(&IndicesOutput {
            indices: &report,
            recommendations: &recommendations,
        })?,
        OutputFormat::Table => print_report(&report, &recommendations),
    }

    Ok(())
}

/// Render an index report and its recommendations as tables
pub fn print_report(report: &IndexReport, recommendations: &Recommendations) {
    let summary = [
        ("HMPI", &report.hmpi),
        ("PLI", &report.pli),
        ("Total CF", &report.total_cf),
    ]
    .into_iter()
    .map(|(name, a)| IndexRow {
        index: name.to_string(),
        score: format_score(a.score),
        band: color_band(a.band.label()),
        advisory: a.advisory.clone(),
    })
    .collect::<Vec<_>>();

    println!("Unit: {}", report.unit_detected);
    println!("{}", Table::new(summary).with(Style::rounded()));

    // Only metals that were measured
    let metals: Vec<MetalRow> = report
        .contributions
        .iter()
        .map(|(metal, c)| {
            let (cf, band) = report
                .per_metal_cf
                .get(metal)
                .map(|f| (format!("{:.3}", f.value), color_band(f.band.label())))
                .unwrap_or_else(|| ("-".to_string(), "-".to_string()));
            MetalRow {
                metal: metal.to_string(),
                concentration: format!("{:.3}", c.concentration),
                limit: format!("{}", c.standard_limit),
                cf,
                band,
            }
        })
        .collect();

    if !metals.is_empty() {
        println!("{}", Table::new(metals).with(Style::rounded()));
    }

    println!(
        "\n{} {} ({})",
        "Overall:".bold(),
        recommendations.overall,
        color_status(recommendations.compliance_status.label())
    );
    for action in &recommendations.actions {
        println!("  • {}", action);
    }
}
