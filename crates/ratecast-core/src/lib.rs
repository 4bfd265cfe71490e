//! Core library for monthly rate forecasting.
//!
//! This crate selects an ARIMA/SARIMA specification for a monthly series by
//! grid search over information criteria, then fits the chosen model on a
//! training window and projects it to a target month.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod forecast;
pub mod grid;
pub mod model_spec;
pub mod sarima;
pub mod scorer;
pub mod selection;
pub mod series;

// Re-exports for convenience
pub use artifacts::{
    read_best_spec, write_best_spec, write_forecast, write_selection_artifacts,
    write_selection_report, BEST_SPEC_FILE, FORECAST_FILE, SELECTION_REPORT_FILE,
};
pub use config::PipelineConfig;
pub use error::{ForecastError, Result};
pub use forecast::{
    forecast_periods, forecast_steps, ForecastEngine, ForecastOutput, ForecastPoint,
};
pub use grid::{CandidateGrid, OrderBounds, SeasonalBounds};
pub use model_spec::{
    Family, ModelSpec, Order, SeasonalOrder, SpecRecord, MAX_ARMA_ORDER, MAX_DIFFERENCING,
    MAX_SEASONAL_PERIOD, MONTHLY_PERIOD,
};
pub use sarima::{FittedSarima, InformationCriterion, Sarima};
pub use scorer::{CandidateScorer, CriterionScorer, Fitness, ScoredCandidate};
pub use selection::{AllUnfitPolicy, Selection, SelectionEngine};
pub use series::{
    add_months, month_start, months_between, MonthlySeries, SeriesPoint, TrainingWindow,
};
