//! Single-sample analysis against the service

use anyhow::Result;
use hmpi_lib::processor::SampleAnalysis;
use serde_json::{Map, Value};

use super::{indices::print_report, parse_sample, parse_unit};
use crate::client::ApiClient;
use crate::output::{format_probability, print_json, print_success, OutputFormat};

/// Arguments of `hmpi analyze`
pub struct AnalyzeArgs {
    pub measurements: Vec<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub unit: Option<String>,
}

impl AnalyzeArgs {
    /// Request body for `POST /analyze-sample`
    fn to_body(&self) -> Result<Value> {
        let sample = parse_sample(&self.measurements)?;
        let unit = parse_unit(self.unit.as_deref())?;

        let mut body = Map::new();
        for (metal, value) in sample.iter() {
            body.insert(metal.name().to_string(), Value::from(value));
        }
        if let Some(location) = &self.location {
            body.insert("location_name".into(), Value::from(location.clone()));
        }
        if let Some(lat) = self.latitude {
            body.insert("latitude".into(), Value::from(lat));
        }
        if let Some(lon) = self.longitude {
            body.insert("longitude".into(), Value::from(lon));
        }
        if let Some(unit) = unit {
            body.insert("unit".into(), Value::from(unit.as_str()));
        }

        Ok(Value::Object(body))
    }
}

/// Analyze one sample and print the stored result
pub async fn analyze_sample(client: &ApiClient, args: AnalyzeArgs, format: OutputFormat) -> Result<()> {
    let body = args.to_body()?;
    let analysis: SampleAnalysis = client.post("analyze-sample", &body).await?;

    match format {
        OutputFormat::Json => print_json(&analysis)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Sample {} stored ({})",
                analysis.id,
                analysis
                    .record
                    .location
                    .name
                    .as_deref()
                    .unwrap_or("Unknown")
            ));
            print_report(&analysis.record.indices, &analysis.recommendations);

            let prediction = &analysis.record.prediction;
            let confidence = prediction
                .probabilities
                .get(&prediction.label)
                .copied()
                .unwrap_or(0.0);
            println!(
                "\nPredicted class: {} ({})",
                prediction.label,
                format_probability(confidence)
            );
        }
    }

    Ok(())
}
