use serde::Serialize;
use std::fmt;

/// Common base temperature for temperate crops (°C).
pub const DEFAULT_BASE_TEMP_C: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GddError {
    #[error("{field} temperature is not a valid number: {input:?}")]
    InvalidInput { field: &'static str, input: String },
}

/// Growing Degree Days for one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Gdd {
    pub average_c: f64,
    pub value: f64,
}

impl Gdd {
    pub fn from_temps(max_c: f64, min_c: f64, base_c: f64) -> Self {
        let average_c = (max_c + min_c) / 2.0;
        let value = if average_c > base_c { average_c - base_c } else { 0.0 };
        Self { average_c, value }
    }
}

impl fmt::Display for Gdd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.value)
    }
}

/// Parses the three inputs and computes GDD. Nothing is computed unless all
/// three parse.
pub fn calculate(max: &str, min: &str, base: &str) -> Result<Gdd, GddError> {
    let max = parse_temp("max", max)?;
    let min = parse_temp("min", min)?;
    let base = parse_temp("base", base)?;
    Ok(Gdd::from_temps(max, min, base))
}

fn parse_temp(field: &'static str, input: &str) -> Result<f64, GddError> {
    match input.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(GddError::InvalidInput { field, input: input.to_string() }),
    }
}
