//! Fit-and-forecast step producing a calendar-dated forecast.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{ForecastError, Result};
use crate::model_spec::ModelSpec;
use crate::sarima::Sarima;
use crate::series::{add_months, months_between, TrainingWindow};

/// One forecast month.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastPoint {
    /// First day of the forecast month
    pub period: NaiveDate,
    /// Point forecast
    pub predicted: f64,
    /// Lower prediction bound, if requested
    pub lower: Option<f64>,
    /// Upper prediction bound, if requested
    pub upper: Option<f64>,
}

/// Forecast result.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastOutput {
    /// Specification actually fitted
    pub spec: ModelSpec,
    /// Whether `spec` is the fallback rather than the requested one
    pub used_fallback: bool,
    /// Forecast months, consecutive from the month after training end
    pub points: Vec<ForecastPoint>,
    /// AIC of the fitted model, when finite
    pub aic: Option<f64>,
}

/// Number of months strictly after `last_period` up to and including
/// `horizon_end`.
pub fn forecast_steps(last_period: NaiveDate, horizon_end: NaiveDate) -> Result<usize> {
    let steps = months_between(last_period, horizon_end);
    if steps <= 0 {
        return Err(ForecastError::InvalidHorizon {
            last_period,
            horizon_end,
        });
    }
    Ok(steps as usize)
}

/// `steps` consecutive month starts following `last_period`.
pub fn forecast_periods(last_period: NaiveDate, steps: usize) -> Result<Vec<NaiveDate>> {
    (1..=steps)
        .map(|k| add_months(last_period, k as u32))
        .collect()
}

/// Fits one specification and projects it to a target month.
#[derive(Debug, Clone)]
pub struct ForecastEngine {
    fallback: ModelSpec,
    confidence_level: Option<f64>,
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self {
            fallback: ModelSpec::fallback(),
            confidence_level: None,
        }
    }
}

impl ForecastEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            fallback: config.fallback_spec()?,
            confidence_level: config.confidence_level,
        })
    }

    pub fn with_fallback(mut self, fallback: ModelSpec) -> Self {
        self.fallback = fallback;
        self
    }

    /// Attach prediction bounds at `level` (e.g. 0.95).
    pub fn with_confidence_level(mut self, level: Option<f64>) -> Self {
        self.confidence_level = level;
        self
    }

    pub fn fallback(&self) -> ModelSpec {
        self.fallback
    }

    /// The specification to fit: `spec` when usable, else the fallback.
    pub fn resolve(&self, spec: Option<ModelSpec>) -> (ModelSpec, bool) {
        match spec {
            Some(spec) => match spec.validate() {
                Ok(()) => (spec, false),
                Err(e) => {
                    warn!(spec = %spec, error = %e, fallback = %self.fallback, "unusable specification, using fallback");
                    (self.fallback, true)
                }
            },
            None => {
                warn!(fallback = %self.fallback, "no selected specification, using fallback");
                (self.fallback, true)
            }
        }
    }

    /// Fit once on `training` and forecast every month through `horizon_end`.
    ///
    /// Output periods are derived from the training end by calendar
    /// arithmetic; the estimator only supplies the ordered values.
    pub fn forecast(
        &self,
        training: &TrainingWindow,
        spec: Option<ModelSpec>,
        horizon_end: NaiveDate,
    ) -> Result<ForecastOutput> {
        let last_period = training.last_period().ok_or_else(|| {
            ForecastError::EmptyTrainingData("training window".to_string())
        })?;

        let (spec, used_fallback) = self.resolve(spec);
        let steps = forecast_steps(last_period, horizon_end)?;

        let fit_failure = |reason: String| ForecastError::FitFailure {
            spec: spec.to_string(),
            reason,
        };
        let model = Sarima::new(spec)
            .fit(training.values())
            .map_err(|e| fit_failure(e.to_string()))?;
        let forecast = model
            .forecast(steps, self.confidence_level)
            .map_err(|e| fit_failure(e.to_string()))?;
        let predicted = forecast.primary();
        if predicted.len() != steps || predicted.iter().any(|v| !v.is_finite()) {
            return Err(fit_failure(
                "forecast recursion produced non-finite values".to_string(),
            ));
        }

        let bounds = match self.confidence_level {
            Some(_) => {
                let lower = forecast
                    .lower_series(0)
                    .map_err(|e| fit_failure(e.to_string()))?;
                let upper = forecast
                    .upper_series(0)
                    .map_err(|e| fit_failure(e.to_string()))?;
                if lower.len() != steps || upper.len() != steps {
                    return Err(fit_failure("prediction bounds are incomplete".to_string()));
                }
                Some((lower, upper))
            }
            None => None,
        };

        let periods = forecast_periods(last_period, steps)?;
        let points = periods
            .into_iter()
            .zip(predicted)
            .enumerate()
            .map(|(h, (period, value))| ForecastPoint {
                period,
                predicted: *value,
                lower: bounds.map(|(lower, _)| lower[h]),
                upper: bounds.map(|(_, upper)| upper[h]),
            })
            .collect::<Vec<_>>();

        info!(
            spec = %spec,
            used_fallback,
            steps,
            first = %points[0].period,
            last = %points[steps - 1].period,
            "forecast complete"
        );

        Ok(ForecastOutput {
            spec,
            used_fallback,
            points,
            aic: model.aic(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// 2000-01 .. 2009-12 with trend, seasonality and deterministic noise.
    fn training() -> TrainingWindow {
        let values = (0..120)
            .map(|i| {
                let trend = 8.2 - 0.01 * i as f64;
                let season = 0.6 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin();
                let noise = ((i * 7 + 3) % 11) as f64 * 0.03 - 0.15;
                trend + season + noise
            })
            .collect();
        TrainingWindow::consecutive(ymd(2000, 1, 1), values).unwrap()
    }

    #[test]
    fn test_forecast_steps() {
        assert_eq!(forecast_steps(ymd(2009, 12, 1), ymd(2023, 12, 1)).unwrap(), 168);
        assert_eq!(forecast_steps(ymd(2009, 12, 1), ymd(2010, 1, 1)).unwrap(), 1);
        assert!(matches!(
            forecast_steps(ymd(2009, 12, 1), ymd(2009, 12, 1)),
            Err(ForecastError::InvalidHorizon { .. })
        ));
        assert!(matches!(
            forecast_steps(ymd(2009, 12, 1), ymd(2005, 1, 1)),
            Err(ForecastError::InvalidHorizon { .. })
        ));
    }

    #[test]
    fn test_forecast_periods_cross_year_boundary() {
        let periods = forecast_periods(ymd(2009, 11, 1), 3).unwrap();
        assert_eq!(periods, vec![ymd(2009, 12, 1), ymd(2010, 1, 1), ymd(2010, 2, 1)]);
    }

    #[test]
    fn test_forecast_length_and_dates() {
        let engine = ForecastEngine::new();
        let output = engine
            .forecast(&training(), Some(ModelSpec::arima(1, 1, 1)), ymd(2023, 12, 1))
            .unwrap();

        assert_eq!(output.points.len(), 168);
        assert_eq!(output.points[0].period, ymd(2010, 1, 1));
        assert_eq!(output.points[167].period, ymd(2023, 12, 1));
        assert!(!output.used_fallback);
        assert!(output
            .points
            .windows(2)
            .all(|w| months_between(w[0].period, w[1].period) == 1));
        assert!(output.points.iter().all(|p| p.lower.is_none()));
    }

    #[test]
    fn test_missing_spec_uses_fallback() {
        let engine = ForecastEngine::new();
        let output = engine.forecast(&training(), None, ymd(2023, 12, 1)).unwrap();
        assert!(output.used_fallback);
        assert_eq!(output.spec, ModelSpec::fallback());
        assert_eq!(output.points.len(), 168);
    }

    #[test]
    fn test_invalid_spec_uses_fallback() {
        let engine = ForecastEngine::new().with_fallback(ModelSpec::arima(1, 0, 0));
        let bad = ModelSpec::sarima((1, 0, 0), (1, 0, 0, 1));
        let (resolved, fallback) = engine.resolve(Some(bad));
        assert!(fallback);
        assert_eq!(resolved, ModelSpec::arima(1, 0, 0));
    }

    #[test]
    fn test_forecast_is_idempotent() {
        let engine = ForecastEngine::new();
        let a = engine.forecast(&training(), None, ymd(2015, 6, 1)).unwrap();
        let b = engine.forecast(&training(), None, ymd(2015, 6, 1)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_horizon() {
        let engine = ForecastEngine::new();
        for horizon in [ymd(2009, 12, 1), ymd(2009, 1, 1)] {
            assert!(matches!(
                engine.forecast(&training(), None, horizon),
                Err(ForecastError::InvalidHorizon { .. })
            ));
        }
    }

    #[test]
    fn test_empty_training() {
        let engine = ForecastEngine::new();
        let empty = TrainingWindow::new(vec![], vec![]).unwrap();
        assert!(matches!(
            engine.forecast(&empty, None, ymd(2023, 12, 1)),
            Err(ForecastError::EmptyTrainingData(_))
        ));
    }

    #[test]
    fn test_fit_failure_is_surfaced() {
        let engine = ForecastEngine::new();
        let short = TrainingWindow::consecutive(ymd(2009, 1, 1), vec![8.0, 8.1, 7.9, 8.2]).unwrap();
        let result = engine.forecast(&short, None, ymd(2010, 12, 1));
        assert!(matches!(result, Err(ForecastError::FitFailure { .. })));
    }

    #[test]
    fn test_prediction_bounds() {
        let engine = ForecastEngine::new().with_confidence_level(Some(0.95));
        let output = engine
            .forecast(&training(), Some(ModelSpec::arima(0, 1, 0)), ymd(2010, 12, 1))
            .unwrap();
        assert_eq!(output.points.len(), 12);
        let widths: Vec<f64> = output
            .points
            .iter()
            .map(|p| p.upper.unwrap() - p.lower.unwrap())
            .collect();
        assert!(widths.iter().all(|w| *w > 0.0));
        // Random walk bounds widen with the horizon
        assert!(widths.windows(2).all(|w| w[1] > w[0]));
        // Symmetric, with the spread growing as the square root of the horizon
        for p in &output.points {
            approx::assert_relative_eq!(
                p.upper.unwrap() - p.predicted,
                p.predicted - p.lower.unwrap(),
                epsilon = 1e-9
            );
        }
        approx::assert_relative_eq!(widths[3], 2.0 * widths[0], epsilon = 1e-9);
    }
}
