use crate::errors::ValidationError;
use crate::float_types::Real;
use serde::{Deserialize, Serialize};

/// Accepted range of [`Config::resolution_cap`].
pub const RESOLUTION_RANGE: std::ops::RangeInclusive<u32> = 4..=4096;

/// Settings of one pipeline run. Validated once when a run is requested, then read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Global seed in `(0, 1]`
    pub seed: Real,
    /// Number of displacement iterations
    pub iterations: u32,
    /// Build the cube signal from noise instead of using an imported one
    pub use_generated_signal: bool,
    /// Edge length of generated signals, and the most an imported signal is sampled at
    pub resolution_cap: u32,
    /// Each cube face is split into `face_cells × face_cells` defect buckets
    pub face_cells: u32,
    /// Most records a face bucket keeps for geometry synthesis
    pub max_segs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            seed: 0.5,
            iterations: 1,
            use_generated_signal: true,
            resolution_cap: 64,
            face_cells: 2,
            max_segs: 6,
        }
    }
}

impl Config {
    /// Parse a JSON object; missing fields take their default value. The result is validated.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let config: Config =
            serde_json::from_str(json).map_err(|e| ValidationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ValidationError> {
        serde_json::to_string(self).map_err(|e| ValidationError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.seed.is_finite() || self.seed <= 0.0 || self.seed > 1.0 {
            return Err(ValidationError::InvalidSeed(self.seed));
        }
        if self.iterations < 1 {
            return Err(ValidationError::InvalidIterations(self.iterations));
        }
        if !RESOLUTION_RANGE.contains(&self.resolution_cap) {
            return Err(ValidationError::InvalidResolution(self.resolution_cap));
        }
        if self.face_cells < 1 || self.face_cells > 255 {
            return Err(ValidationError::Config(format!(
                "face_cells must be in 1..=255, got {}",
                self.face_cells
            )));
        }
        if self.max_segs < 2 {
            return Err(ValidationError::Config(format!(
                "max_segs must be at least 2, got {}",
                self.max_segs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn json_fills_missing_fields() {
        let config = Config::from_json(r#"{ "seed": 0.25, "iterations": 4 }"#).unwrap();
        assert_eq!(config.seed, 0.25);
        assert_eq!(config.iterations, 4);
        assert!(config.use_generated_signal);
        assert_eq!(config.resolution_cap, 64);

        let back = Config::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let with = |f: fn(&mut Config)| {
            let mut c = Config::default();
            f(&mut c);
            c.validate()
        };
        assert_eq!(with(|c| c.seed = 0.0), Err(ValidationError::InvalidSeed(0.0)));
        assert_eq!(with(|c| c.seed = 1.5), Err(ValidationError::InvalidSeed(1.5)));
        assert_eq!(with(|c| c.iterations = 0), Err(ValidationError::InvalidIterations(0)));
        assert_eq!(with(|c| c.resolution_cap = 2), Err(ValidationError::InvalidResolution(2)));
        assert_eq!(
            with(|c| c.resolution_cap = 4097),
            Err(ValidationError::InvalidResolution(4097))
        );
        assert_eq!(
            with(|c| c.resolution_cap = u32::MAX),
            Err(ValidationError::InvalidResolution(u32::MAX))
        );
        assert_eq!(with(|c| c.resolution_cap = 4096), Ok(()));
        assert!(matches!(with(|c| c.face_cells = 0), Err(ValidationError::Config(_))));
        assert!(matches!(with(|c| c.max_segs = 1), Err(ValidationError::Config(_))));
        assert!(with(|c| c.seed = Real::NAN).is_err());
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(Config::from_json("{ seed: }"), Err(ValidationError::Config(_))));
        assert!(matches!(
            Config::from_json(r#"{ "seed": -1.0 }"#),
            Err(ValidationError::InvalidSeed(_))
        ));
    }
}
