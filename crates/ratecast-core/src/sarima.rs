//! Adapter from [`ModelSpec`] to the `anofox_forecast` ARIMA and SARIMA
//! forecasters.
//!
//! Non-seasonal specifications are fitted with [`ARIMA`], seasonal ones with
//! [`SARIMA`]. Information criteria and prediction intervals come from the
//! fitted forecaster.

use std::fmt;
use std::str::FromStr;

use anofox_forecast::core::{Forecast, TimeSeriesBuilder};
use anofox_forecast::models::arima::{ARIMA, SARIMA};
use anofox_forecast::prelude::Forecaster;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::model_spec::ModelSpec;

/// Information criterion used to rank fitted candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InformationCriterion {
    #[default]
    Aic,
    Bic,
    Aicc,
}

impl InformationCriterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            InformationCriterion::Aic => "aic",
            InformationCriterion::Bic => "bic",
            InformationCriterion::Aicc => "aicc",
        }
    }
}

impl fmt::Display for InformationCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InformationCriterion {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "aic" => Ok(InformationCriterion::Aic),
            "bic" => Ok(InformationCriterion::Bic),
            "aicc" => Ok(InformationCriterion::Aicc),
            _ => Err(ForecastError::InvalidParameter {
                param: "criterion".into(),
                value: s.into(),
                reason: "expected one of aic, bic, aicc".into(),
            }),
        }
    }
}

/// The library forecaster backing a fitted specification.
#[derive(Debug, Clone)]
enum Estimator {
    Arima(ARIMA),
    Sarima(SARIMA),
}

impl Estimator {
    fn for_spec(spec: &ModelSpec) -> Self {
        let order = spec.order();
        match spec.seasonal_order() {
            Some(so) => Estimator::Sarima(SARIMA::new(
                order.p, order.d, order.q, so.p, so.d, so.q, so.s,
            )),
            None => Estimator::Arima(ARIMA::new(order.p, order.d, order.q)),
        }
    }

    fn fit(&mut self, series: &anofox_forecast::core::TimeSeries) -> anofox_forecast::Result<()> {
        match self {
            Estimator::Arima(model) => model.fit(series),
            Estimator::Sarima(model) => model.fit(series),
        }
    }

    fn aic(&self) -> Option<f64> {
        match self {
            Estimator::Arima(model) => model.aic(),
            Estimator::Sarima(model) => model.aic(),
        }
    }

    fn bic(&self) -> Option<f64> {
        match self {
            Estimator::Arima(model) => model.bic(),
            Estimator::Sarima(model) => model.bic(),
        }
    }

    fn predict(&self, horizon: usize) -> anofox_forecast::Result<Forecast> {
        match self {
            Estimator::Arima(model) => model.predict(horizon),
            Estimator::Sarima(model) => model.predict(horizon),
        }
    }

    fn predict_with_intervals(
        &self,
        horizon: usize,
        level: f64,
    ) -> anofox_forecast::Result<Forecast> {
        match self {
            Estimator::Arima(model) => model.predict_with_intervals(horizon, level),
            Estimator::Sarima(model) => model.predict_with_intervals(horizon, level),
        }
    }
}

fn library_error(spec: &ModelSpec, stage: &str, e: anofox_forecast::ForecastError) -> ForecastError {
    match e {
        anofox_forecast::ForecastError::InsufficientData { needed, got } => {
            ForecastError::InsufficientData { needed, got }
        }
        other => ForecastError::ComputationError(format!("Failed to {} {}: {}", stage, spec, other)),
    }
}

/// An unfitted model for one specification.
#[derive(Debug, Clone)]
pub struct Sarima {
    spec: ModelSpec,
}

impl Sarima {
    pub fn new(spec: ModelSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> ModelSpec {
        self.spec
    }

    /// Minimum number of observations needed to fit this specification:
    /// the differencing loss, the largest lag and five degrees of freedom.
    pub fn min_observations(&self) -> Result<usize> {
        let order = self.spec.order();
        let (sp, sd, sq, s) = self
            .spec
            .seasonal_order()
            .map_or((0, 0, 0, 1), |so| (so.p, so.d, so.q, so.s));

        let overflow =
            || ForecastError::MalformedSpecification(format!("orders of {} overflow", self.spec));
        let seasonal_loss = sd.checked_mul(s).ok_or_else(overflow)?;
        let seasonal_lag = sp.max(sq).checked_mul(s).ok_or_else(overflow)?;
        order
            .d
            .checked_add(seasonal_loss)
            .and_then(|n| n.checked_add(order.p.max(order.q).max(seasonal_lag)))
            .and_then(|n| n.checked_add(5))
            .ok_or_else(overflow)
    }

    /// Fit the model on a contiguous sequence of observations.
    pub fn fit(&self, values: &[f64]) -> Result<FittedSarima> {
        self.spec.validate()?;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::InvalidInput(
                "series contains non-finite values".to_string(),
            ));
        }

        let needed = self.min_observations()?;
        if values.len() < needed {
            return Err(ForecastError::InsufficientData {
                needed,
                got: values.len(),
            });
        }

        let series = TimeSeriesBuilder::new()
            .values(values.to_vec())
            .build()
            .map_err(|e| {
                ForecastError::ComputationError(format!("Failed to build TimeSeries: {}", e))
            })?;

        let mut model = Estimator::for_spec(&self.spec);
        model
            .fit(&series)
            .map_err(|e| library_error(&self.spec, "fit", e))?;

        Ok(FittedSarima {
            spec: self.spec,
            model,
            n_obs: values.len(),
        })
    }
}

/// A fitted model.
#[derive(Debug, Clone)]
pub struct FittedSarima {
    spec: ModelSpec,
    model: Estimator,
    n_obs: usize,
}

impl FittedSarima {
    pub fn spec(&self) -> ModelSpec {
        self.spec
    }

    /// Estimated coefficients including the intercept.
    pub fn n_params(&self) -> usize {
        let order = self.spec.order();
        let (sp, sq) = self.spec.seasonal_order().map_or((0, 0), |so| (so.p, so.q));
        order.p + order.q + sp + sq + 1
    }

    /// Observations left after differencing.
    pub fn n_effective(&self) -> usize {
        let (sd, s) = self.spec.seasonal_order().map_or((0, 1), |so| (so.d, so.s));
        self.n_obs
            .saturating_sub(self.spec.order().d)
            .saturating_sub(sd * s)
    }

    pub fn aic(&self) -> Option<f64> {
        self.model.aic().filter(|v| v.is_finite())
    }

    pub fn bic(&self) -> Option<f64> {
        self.model.bic().filter(|v| v.is_finite())
    }

    /// AIC with the small-sample correction; `None` when the effective
    /// sample does not exceed the parameter count by two.
    pub fn aicc(&self) -> Option<f64> {
        let k = self.n_params() as f64;
        let n = self.n_effective() as f64;
        if n - k - 1.0 <= 0.0 {
            return None;
        }
        self.aic().map(|aic| aic + 2.0 * k * (k + 1.0) / (n - k - 1.0))
    }

    pub fn criterion(&self, criterion: InformationCriterion) -> Option<f64> {
        match criterion {
            InformationCriterion::Aic => self.aic(),
            InformationCriterion::Bic => self.bic(),
            InformationCriterion::Aicc => self.aicc(),
        }
    }

    /// Forecast `horizon` periods, with bounds at `level` when given.
    pub fn forecast(&self, horizon: usize, level: Option<f64>) -> Result<Forecast> {
        match level {
            Some(level) => self
                .model
                .predict_with_intervals(horizon, level)
                .map_err(|e| library_error(&self.spec, "forecast", e)),
            None => self
                .model
                .predict(horizon)
                .map_err(|e| library_error(&self.spec, "forecast", e)),
        }
    }
}
