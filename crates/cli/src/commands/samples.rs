//! Sample history commands

use anyhow::Result;
use chrono::{DateTime, NaiveDate};
use hmpi_lib::store::StoredSample;
use tabled::{settings::Style, Table, Tabled};

use super::indices::print_report;
use crate::client::{ApiClient, DeleteRequest, DeleteResponse, SampleList, SamplesQuery};
use crate::output::{
    color_band, format_score, print_json, print_success, print_warning, truncate_id, OutputFormat,
};

/// Row for the samples table
#[derive(Tabled)]
struct SampleRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Created")]
    created_at: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "HMPI")]
    hmpi: String,
    #[tabled(rename = "Band")]
    band: String,
    #[tabled(rename = "PLI")]
    pli: String,
    #[tabled(rename = "Prediction")]
    prediction: String,
}

impl From<&StoredSample> for SampleRow {
    fn from(s: &StoredSample) -> Self {
        Self {
            id: truncate_id(&s.id),
            created_at: s.created_at.format("%Y-%m-%d %H:%M").to_string(),
            location: s.record.location.name.clone().unwrap_or_default(),
            hmpi: format_score(s.record.indices.hmpi.score),
            band: color_band(s.record.indices.hmpi.band.label()),
            pli: format_score(s.record.indices.pli.score),
            prediction: s.record.prediction.label.clone(),
        }
    }
}

/// Which samples `samples delete` removes
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteSelection {
    All,
    Ids(Vec<String>),
    Range { from: String, to: String },
}

impl DeleteSelection {
    /// Exactly one of the delete flags must be given
    pub fn from_flags(
        all: bool,
        ids: Option<Vec<String>>,
        from: Option<String>,
        to: Option<String>,
    ) -> Result<Self> {
        match (all, ids, from, to) {
            (true, None, None, None) => Ok(Self::All),
            (false, Some(ids), None, None) if !ids.is_empty() => Ok(Self::Ids(ids)),
            (false, None, Some(from), Some(to)) => {
                check_date(&from)?;
                check_date(&to)?;
                Ok(Self::Range { from, to })
            }
            _ => anyhow::bail!("Specify exactly one of --all, --ids, or --from with --to"),
        }
    }

    fn into_request(self) -> DeleteRequest {
        match self {
            Self::All => DeleteRequest {
                delete_option: "all".into(),
                start_date: None,
                end_date: None,
                sample_ids: None,
            },
            Self::Ids(ids) => DeleteRequest {
                delete_option: "selected".into(),
                start_date: None,
                end_date: None,
                sample_ids: Some(ids),
            },
            Self::Range { from, to } => DeleteRequest {
                delete_option: "date_range".into(),
                start_date: Some(from),
                end_date: Some(to),
                sample_ids: None,
            },
        }
    }
}

fn check_date(value: &str) -> Result<()> {
    let value = value.trim();
    if DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
    {
        Ok(())
    } else {
        anyhow::bail!("Invalid date '{}': expected YYYY-MM-DD or RFC 3339", value)
    }
}

/// List stored samples
pub async fn list(
    client: &ApiClient,
    days: u32,
    location: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let query = SamplesQuery {
        days: Some(days),
        location,
    };
    let result: SampleList = client.get_with_query("samples", &query).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            if result.samples.is_empty() {
                print_warning("No samples found");
                return Ok(());
            }

            let rows: Vec<SampleRow> = result.samples.iter().map(SampleRow::from).collect();
            println!("{}", Table::new(rows).with(Style::rounded()));
            println!("\nTotal: {} samples", result.count);
        }
    }

    Ok(())
}

/// Show one stored sample in full
pub async fn get(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let sample: StoredSample = client.get(&format!("samples/{}", id)).await?;

    match format {
        OutputFormat::Json => print_json(&sample)?,
        OutputFormat::Table => {
            println!("Sample:   {}", sample.id);
            println!("Created:  {}", sample.created_at.to_rfc3339());
            if let Some(name) = &sample.record.location.name {
                println!("Location: {}", name);
            }
            let recommendations = hmpi_lib::indices::recommend_actions(&sample.record.indices);
            print_report(&sample.record.indices, &recommendations);
            println!("\nPredicted class: {}", sample.record.prediction.label);
        }
    }

    Ok(())
}

/// Delete samples by selection
pub async fn delete(client: &ApiClient, selection: DeleteSelection, format: OutputFormat) -> Result<()> {
    let response: DeleteResponse = client.delete("samples", &selection.into_request()).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_success(&format!("Deleted {} samples", response.deleted_count)),
    }

    Ok(())
}
