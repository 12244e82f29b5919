//! CLI subcommands

pub mod analyze;
pub mod batch;
pub mod indices;
pub mod samples;

use anyhow::{anyhow, Context, Result};
use hmpi_lib::models::{Metal, Sample, Unit};

/// Parse a `METAL=VALUE` argument
pub fn parse_measurement(arg: &str) -> Result<(Metal, f64)> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected METAL=VALUE, got '{}'", arg))?;

    let metal: Metal = name.parse()?;
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("Invalid concentration for {}: '{}'", metal, value))?;

    if !value.is_finite() || value < 0.0 {
        anyhow::bail!("Concentration for {} must be a non-negative number", metal);
    }

    Ok((metal, value))
}

/// Build a sample from `METAL=VALUE` arguments; later values win
pub fn parse_sample(args: &[String]) -> Result<Sample> {
    let mut sample = Sample::new();
    for arg in args {
        let (metal, value) = parse_measurement(arg)?;
        sample.set(metal, value);
    }
    Ok(sample)
}

/// `None` means auto-detect
pub fn parse_unit(unit: Option<&str>) -> Result<Option<Unit>> {
    match unit.map(str::trim) {
        None | Some("") => Ok(None),
        Some(u) if u.eq_ignore_ascii_case("auto") || u.eq_ignore_ascii_case("auto-detect") => {
            Ok(None)
        }
        Some(u) => Ok(Some(u.parse()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_measurement() {
        assert_eq!(parse_measurement("lead=5").unwrap(), (Metal::Lead, 5.0));
        assert_eq!(
            parse_measurement("Arsenic= 0.02").unwrap(),
            (Metal::Arsenic, 0.02)
        );
    }

    #[test]
    fn test_parse_measurement_errors() {
        assert!(parse_measurement("lead").is_err());
        assert!(parse_measurement("unobtanium=1").is_err());
        assert!(parse_measurement("lead=abc").is_err());
        assert!(parse_measurement("lead=-1").is_err());
        assert!(parse_measurement("lead=NaN").is_err());
    }

    #[test]
    fn test_parse_sample_keeps_last_value() {
        let sample = parse_sample(&["lead=1".into(), "zinc=2".into(), "lead=3".into()]).unwrap();
        assert_eq!(sample.len(), 2);
        assert_eq!(sample.get(Metal::Lead), Some(3.0));
    }

    #[test]
    fn test_parse_unit() {
        assert_eq!(parse_unit(None).unwrap(), None);
        assert_eq!(parse_unit(Some("Auto-detect")).unwrap(), None);
        assert_eq!(
            parse_unit(Some("mg/L")).unwrap(),
            Some(Unit::MilligramsPerLiter)
        );
        assert_eq!(
            parse_unit(Some("ug/l")).unwrap(),
            Some(Unit::MicrogramsPerLiter)
        );
        assert!(parse_unit(Some("ppm")).is_err());
    }
}
