//! Batch submission and job tracking

use anyhow::{Context, Result};
use hmpi_lib::batch::{JobStatus, JobStatusView};
use hmpi_lib::models::Row;
use hmpi_lib::processor::ProcessedRow;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::client::{ApiClient, BatchResponse};
use crate::output::{
    color_band, color_status, format_score, print_info, print_json, print_success, print_warning,
    truncate_id, OutputFormat,
};

/// Row for batch result tables
#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Row")]
    row: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "HMPI")]
    hmpi: String,
    #[tabled(rename = "Band")]
    band: String,
    #[tabled(rename = "Prediction")]
    prediction: String,
}

#[derive(Serialize)]
struct BatchRequest {
    samples: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metals: Option<Vec<String>>,
}

/// Read a JSON array of rows from disk
fn read_rows(path: &str) -> Result<Vec<Row>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} must contain a JSON array of objects", path))
}

/// Submit a batch file
pub async fn submit(
    client: &ApiClient,
    path: &str,
    metals: Option<Vec<String>>,
    format: OutputFormat,
) -> Result<()> {
    let samples = read_rows(path)?;
    let request = BatchRequest { samples, metals };

    let response: BatchResponse = client.post("batch-analyze", &request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => match &response.job_id {
            Some(job_id) => {
                print_info(&format!(
                    "{} samples queued as job {}",
                    response.total_samples, job_id
                ));
                println!("Track it with: hmpi batch status {}", job_id);
            }
            None => {
                let results = response.results.as_deref().unwrap_or_default();
                print_success(&format!(
                    "Processed {} of {} samples",
                    response.processed_samples.unwrap_or(results.len()),
                    response.total_samples
                ));
                print_results(results);
            }
        },
    }

    Ok(())
}

/// Show job progress, and results once completed
pub async fn status(client: &ApiClient, job_id: &str, format: OutputFormat) -> Result<()> {
    let view: JobStatusView = client.get(&format!("batch-status/{}", job_id)).await?;

    match format {
        OutputFormat::Json => print_json(&view)?,
        OutputFormat::Table => {
            println!("Job:      {}", view.job_id);
            println!("Status:   {}", color_status(view.status.as_str()));
            println!(
                "Progress: {:.2}% ({}/{})",
                view.progress, view.processed, view.total
            );
            for (reason, count) in &view.skipped {
                println!("Skipped:  {} ({})", count, reason);
            }

            match view.status {
                JobStatus::Completed => {
                    print_results(view.results.as_deref().unwrap_or_default());
                }
                JobStatus::Failed => {
                    print_warning(view.error.as_deref().unwrap_or("Job failed"));
                }
                JobStatus::Processing => {}
            }
        }
    }

    Ok(())
}

fn print_results(results: &[ProcessedRow]) {
    if results.is_empty() {
        print_warning("No samples produced results");
        return;
    }

    let rows: Vec<ResultRow> = results
        .iter()
        .map(|r| ResultRow {
            row: r.row_id().to_string(),
            id: truncate_id(&r.id),
            location: r.record.location.name.clone().unwrap_or_default(),
            hmpi: format_score(r.record.indices.hmpi.score),
            band: color_band(r.record.indices.hmpi.band.label()),
            prediction: r.record.prediction.label.clone(),
        })
        .collect();

    println!("{}", Table::new(rows).with(Style::rounded()));
    println!("\nTotal: {} samples", results.len());
}
