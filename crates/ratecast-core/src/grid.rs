//! Candidate grid enumeration.

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::model_spec::{
    ModelSpec, Order, SeasonalOrder, MAX_ARMA_ORDER, MAX_DIFFERENCING, MAX_SEASONAL_PERIOD,
    MONTHLY_PERIOD,
};

/// Inclusive upper bounds for a (p, d, q) triple; lower bounds are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBounds {
    pub max_p: usize,
    pub max_d: usize,
    pub max_q: usize,
}

impl OrderBounds {
    pub fn new(max_p: usize, max_d: usize, max_q: usize) -> Self {
        Self {
            max_p,
            max_d,
            max_q,
        }
    }

    /// All triples, p outermost and q innermost.
    fn triples(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        (0..=self.max_p).flat_map(move |p| {
            (0..=self.max_d).flat_map(move |d| (0..=self.max_q).map(move |q| (p, d, q)))
        })
    }

    fn count(&self) -> usize {
        (self.max_p + 1) * (self.max_d + 1) * (self.max_q + 1)
    }

    fn validate(&self, name: &str) -> Result<()> {
        for (field, value, max) in [
            ("max_p", self.max_p, MAX_ARMA_ORDER),
            ("max_d", self.max_d, MAX_DIFFERENCING),
            ("max_q", self.max_q, MAX_ARMA_ORDER),
        ] {
            if value > max {
                return Err(ForecastError::InvalidParameter {
                    param: format!("{}.{}", name, field),
                    value: value.to_string(),
                    reason: format!("must not exceed {}", max),
                });
            }
        }
        Ok(())
    }
}

/// Bounds of the seasonal family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonalBounds {
    /// Non-seasonal (p, d, q) part
    pub order: OrderBounds,
    /// Seasonal (P, D, Q) part
    pub seasonal: OrderBounds,
    /// Seasonal period
    #[serde(default = "default_period")]
    pub period: usize,
}

fn default_period() -> usize {
    MONTHLY_PERIOD
}

impl Default for SeasonalBounds {
    fn default() -> Self {
        Self {
            order: OrderBounds::new(2, 1, 2),
            seasonal: OrderBounds::new(1, 1, 1),
            period: MONTHLY_PERIOD,
        }
    }
}

/// Finite, deterministic set of candidate specifications.
///
/// Non-seasonal candidates are enumerated first, then seasonal ones with the
/// (p, d, q) part outer and the (P, D, Q) part inner. Ties in the selection
/// ranking break by this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateGrid {
    pub non_seasonal: Option<OrderBounds>,
    pub seasonal: Option<SeasonalBounds>,
}

impl Default for CandidateGrid {
    fn default() -> Self {
        Self {
            non_seasonal: Some(OrderBounds::new(2, 2, 2)),
            seasonal: Some(SeasonalBounds::default()),
        }
    }
}

impl CandidateGrid {
    pub fn non_seasonal_only(bounds: OrderBounds) -> Self {
        Self {
            non_seasonal: Some(bounds),
            seasonal: None,
        }
    }

    pub fn seasonal_only(bounds: SeasonalBounds) -> Self {
        Self {
            non_seasonal: None,
            seasonal: Some(bounds),
        }
    }

    /// Number of candidates `specs()` yields.
    pub fn len(&self) -> usize {
        let non_seasonal = self.non_seasonal.map_or(0, |b| b.count());
        let seasonal = self
            .seasonal
            .map_or(0, |b| b.order.count() * b.seasonal.count());
        non_seasonal + seasonal
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check every bound against the orders the estimator accepts.
    ///
    /// Must pass before `len` or `specs` is called on an untrusted grid.
    pub fn validate(&self) -> Result<()> {
        if let Some(bounds) = &self.non_seasonal {
            bounds.validate("grid.non_seasonal")?;
        }
        if let Some(bounds) = &self.seasonal {
            bounds.order.validate("grid.seasonal.order")?;
            bounds.seasonal.validate("grid.seasonal.seasonal")?;
            if !(2..=MAX_SEASONAL_PERIOD).contains(&bounds.period) {
                return Err(ForecastError::InvalidParameter {
                    param: "grid.seasonal.period".into(),
                    value: bounds.period.to_string(),
                    reason: format!("must be between 2 and {}", MAX_SEASONAL_PERIOD),
                });
            }
        }
        Ok(())
    }

    /// Enumerate every candidate in grid order.
    pub fn specs(&self) -> Vec<ModelSpec> {
        let mut specs = Vec::with_capacity(self.len());

        if let Some(bounds) = &self.non_seasonal {
            specs.extend(
                bounds
                    .triples()
                    .map(|(p, d, q)| ModelSpec::arima(p, d, q)),
            );
        }

        if let Some(bounds) = &self.seasonal {
            for (p, d, q) in bounds.order.triples() {
                for (sp, sd, sq) in bounds.seasonal.triples() {
                    specs.push(ModelSpec::Seasonal {
                        order: Order::new(p, d, q),
                        seasonal_order: SeasonalOrder::new(sp, sd, sq, bounds.period),
                    });
                }
            }
        }

        specs
    }
}
