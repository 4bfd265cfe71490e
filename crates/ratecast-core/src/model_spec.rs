//! Candidate model specifications and their serialized record form.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Seasonal period of monthly data.
pub const MONTHLY_PERIOD: usize = 12;

/// Largest AR or MA order, seasonal or not, accepted for a candidate.
pub const MAX_ARMA_ORDER: usize = 5;
/// Largest differencing order, seasonal or not.
pub const MAX_DIFFERENCING: usize = 2;
/// Largest seasonal period (one year of daily data).
pub const MAX_SEASONAL_PERIOD: usize = 366;

/// Non-seasonal ARIMA order (p, d, q).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Order {
    /// AR order
    pub p: usize,
    /// Differencing order
    pub d: usize,
    /// MA order
    pub q: usize,
}

impl Order {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    pub fn to_vec(self) -> Vec<usize> {
        vec![self.p, self.d, self.q]
    }
}

/// Seasonal order (P, D, Q, s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeasonalOrder {
    /// Seasonal AR order
    pub p: usize,
    /// Seasonal differencing order
    pub d: usize,
    /// Seasonal MA order
    pub q: usize,
    /// Seasonal period
    pub s: usize,
}

impl SeasonalOrder {
    pub fn new(p: usize, d: usize, q: usize, s: usize) -> Self {
        Self { p, d, q, s }
    }

    pub fn to_vec(self) -> Vec<usize> {
        vec![self.p, self.d, self.q, self.s]
    }
}

/// Model family tag used in artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    NonSeasonal,
    Seasonal,
}

impl Family {
    /// Name written to artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::NonSeasonal => "ARIMA",
            Family::Seasonal => "SARIMA",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "arima" | "nonseasonal" | "non_seasonal" => Some(Family::NonSeasonal),
            "sarima" | "sarimax" | "seasonal" => Some(Family::Seasonal),
            _ => None,
        }
    }
}

/// A single candidate model: ARIMA(p,d,q) or SARIMA(p,d,q)(P,D,Q)\[s\].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelSpec {
    NonSeasonal {
        order: Order,
    },
    Seasonal {
        order: Order,
        seasonal_order: SeasonalOrder,
    },
}

impl ModelSpec {
    pub fn arima(p: usize, d: usize, q: usize) -> Self {
        ModelSpec::NonSeasonal {
            order: Order::new(p, d, q),
        }
    }

    pub fn sarima(order: (usize, usize, usize), seasonal: (usize, usize, usize, usize)) -> Self {
        ModelSpec::Seasonal {
            order: Order::new(order.0, order.1, order.2),
            seasonal_order: SeasonalOrder::new(seasonal.0, seasonal.1, seasonal.2, seasonal.3),
        }
    }

    /// Fallback used when no selection artifact is available.
    pub fn fallback() -> Self {
        Self::sarima((1, 1, 1), (1, 1, 1, MONTHLY_PERIOD))
    }

    pub fn family(&self) -> Family {
        match self {
            ModelSpec::NonSeasonal { .. } => Family::NonSeasonal,
            ModelSpec::Seasonal { .. } => Family::Seasonal,
        }
    }

    pub fn order(&self) -> Order {
        match self {
            ModelSpec::NonSeasonal { order } | ModelSpec::Seasonal { order, .. } => *order,
        }
    }

    pub fn seasonal_order(&self) -> Option<SeasonalOrder> {
        match self {
            ModelSpec::NonSeasonal { .. } => None,
            ModelSpec::Seasonal { seasonal_order, .. } => Some(*seasonal_order),
        }
    }

    /// Check the orders are usable by the estimator.
    ///
    /// Orders and the seasonal period are bounded so that a hostile or
    /// corrupted artifact cannot drive lag arithmetic out of range.
    pub fn validate(&self) -> Result<()> {
        let order = self.order();
        check_order("p", order.p, MAX_ARMA_ORDER)?;
        check_order("d", order.d, MAX_DIFFERENCING)?;
        check_order("q", order.q, MAX_ARMA_ORDER)?;

        if let Some(seasonal) = self.seasonal_order() {
            check_order("P", seasonal.p, MAX_ARMA_ORDER)?;
            check_order("D", seasonal.d, MAX_DIFFERENCING)?;
            check_order("Q", seasonal.q, MAX_ARMA_ORDER)?;
            if !(2..=MAX_SEASONAL_PERIOD).contains(&seasonal.s) {
                return Err(ForecastError::MalformedSpecification(format!(
                    "seasonal period must be between 2 and {}, got {}",
                    MAX_SEASONAL_PERIOD, seasonal.s
                )));
            }
        }
        Ok(())
    }

    /// Convert into the artifact record, optionally carrying the fitness value.
    pub fn to_record(&self, fitness: Option<f64>) -> SpecRecord {
        SpecRecord {
            family: Some(self.family().as_str().to_string()),
            order: Some(self.order().to_vec()),
            seasonal_order: self.seasonal_order().map(SeasonalOrder::to_vec),
            aic: fitness,
        }
    }
}

fn check_order(name: &str, value: usize, max: usize) -> Result<()> {
    if value > max {
        return Err(ForecastError::MalformedSpecification(format!(
            "{} = {} exceeds the maximum of {}",
            name, value, max
        )));
    }
    Ok(())
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.order();
        match self.seasonal_order() {
            None => write!(f, "ARIMA({},{},{})", o.p, o.d, o.q),
            Some(s) => write!(
                f,
                "SARIMA({},{},{})({},{},{})[{}]",
                o.p, o.d, o.q, s.p, s.d, s.q, s.s
            ),
        }
    }
}

/// Serialized best-specification artifact.
///
/// Every field is optional on the wire so that a partially written file can
/// be read and reported as malformed instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecRecord {
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub order: Option<Vec<usize>>,
    #[serde(default)]
    pub seasonal_order: Option<Vec<usize>>,
    #[serde(default)]
    pub aic: Option<f64>,
}

impl TryFrom<SpecRecord> for ModelSpec {
    type Error = ForecastError;

    fn try_from(record: SpecRecord) -> Result<Self> {
        let order = match record.order.as_deref() {
            Some([p, d, q]) => Order::new(*p, *d, *q),
            Some(other) => {
                return Err(ForecastError::MalformedSpecification(format!(
                    "order must have 3 elements, got {}",
                    other.len()
                )))
            }
            None => {
                return Err(ForecastError::MalformedSpecification(
                    "missing order".to_string(),
                ))
            }
        };

        let family = match record.family.as_deref() {
            Some(name) => Family::parse(name).ok_or_else(|| {
                ForecastError::MalformedSpecification(format!("unknown family '{}'", name))
            })?,
            None if record.seasonal_order.is_some() => Family::Seasonal,
            None => Family::NonSeasonal,
        };

        let spec = match family {
            Family::NonSeasonal => ModelSpec::NonSeasonal { order },
            Family::Seasonal => match record.seasonal_order.as_deref() {
                Some([sp, sd, sq, s]) => ModelSpec::Seasonal {
                    order,
                    seasonal_order: SeasonalOrder::new(*sp, *sd, *sq, *s),
                },
                Some(other) => {
                    return Err(ForecastError::MalformedSpecification(format!(
                        "seasonal_order must have 4 elements, got {}",
                        other.len()
                    )))
                }
                None => {
                    return Err(ForecastError::MalformedSpecification(
                        "seasonal family without seasonal_order".to_string(),
                    ))
                }
            },
        };

        spec.validate()?;
        Ok(spec)
    }
}
