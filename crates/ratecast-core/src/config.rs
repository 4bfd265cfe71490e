//! Pipeline configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::grid::CandidateGrid;
use crate::model_spec::{ModelSpec, SpecRecord};
use crate::sarima::InformationCriterion;
use crate::selection::AllUnfitPolicy;
use crate::series::month_start;

/// Settings shared by the selection and forecast steps.
///
/// Passed explicitly to each step so one process can run several windows or
/// horizons. Every field has a default; a JSON file may set any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// First calendar year of the training window (inclusive)
    pub train_start_year: i32,
    /// Last calendar year of the training window (inclusive)
    pub train_end_year: i32,
    /// Last forecast month (inclusive)
    pub horizon_end: NaiveDate,
    /// Candidate grid bounds
    pub grid: CandidateGrid,
    /// Criterion used to rank candidates
    pub criterion: InformationCriterion,
    /// Per-candidate fit timeout in seconds (None = unlimited)
    pub candidate_timeout_secs: Option<f64>,
    /// Score candidates on the rayon thread pool
    pub parallel: bool,
    /// What to do when no candidate can be fitted
    pub all_unfit: AllUnfitPolicy,
    /// Specification used when no selection artifact is available
    pub fallback: SpecRecord,
    /// Prediction interval level in (0, 1) (None = point forecasts only)
    pub confidence_level: Option<f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            train_start_year: 2000,
            train_end_year: 2009,
            horizon_end: NaiveDate::from_ymd_opt(2023, 12, 1).unwrap_or_default(),
            grid: CandidateGrid::default(),
            criterion: InformationCriterion::Aic,
            candidate_timeout_secs: None,
            parallel: true,
            all_unfit: AllUnfitPolicy::Accept,
            fallback: ModelSpec::fallback().to_record(None),
            confidence_level: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file and validate.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let mut config: PipelineConfig = serde_json::from_str(&text)?;
        config.horizon_end = month_start(config.horizon_end);
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.train_end_year < self.train_start_year {
            return Err(ForecastError::InvalidParameter {
                param: "train_end_year".into(),
                value: self.train_end_year.to_string(),
                reason: format!("must not precede train_start_year {}", self.train_start_year),
            });
        }

        self.grid.validate()?;
        if self.grid.is_empty() {
            return Err(ForecastError::InvalidParameter {
                param: "grid".into(),
                value: "{}".into(),
                reason: "at least one model family must be enabled".into(),
            });
        }

        if let Some(secs) = self.candidate_timeout_secs {
            if !(secs > 0.0 && Duration::try_from_secs_f64(secs).is_ok()) {
                return Err(ForecastError::InvalidParameter {
                    param: "candidate_timeout_secs".into(),
                    value: secs.to_string(),
                    reason: "must be a positive number of seconds".into(),
                });
            }
        }

        if let Some(level) = self.confidence_level {
            if !(level > 0.0 && level < 1.0) {
                return Err(ForecastError::InvalidParameter {
                    param: "confidence_level".into(),
                    value: level.to_string(),
                    reason: "must be between 0 and 1".into(),
                });
            }
        }

        self.fallback_spec()?;
        Ok(())
    }

    pub fn candidate_timeout(&self) -> Option<Duration> {
        self.candidate_timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    pub fn fallback_spec(&self) -> Result<ModelSpec> {
        ModelSpec::try_from(self.fallback.clone())
    }

    /// Human-readable training window, used in messages.
    pub fn training_label(&self) -> String {
        format!("years {}-{}", self.train_start_year, self.train_end_year)
    }
}
