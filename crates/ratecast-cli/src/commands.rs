//! The `select`, `forecast` and `run` steps.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use ratecast_core::{
    forecast_steps, month_start, read_best_spec, write_forecast, write_selection_artifacts,
    AllUnfitPolicy, ForecastEngine, ForecastError, ForecastOutput,
    InformationCriterion, ModelSpec, MonthlySeries, PipelineConfig, Result, Selection,
    SelectionEngine, TrainingWindow, BEST_SPEC_FILE, FORECAST_FILE,
};
use tracing::info;

/// Command-line values layered over the configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub train_start: Option<i32>,
    pub train_end: Option<i32>,
    pub horizon_end: Option<NaiveDate>,
    pub criterion: Option<InformationCriterion>,
    pub confidence_level: Option<f64>,
    pub sequential: bool,
    pub reject_all_unfit: bool,
}

impl Overrides {
    /// Load the configuration file (or defaults) and apply the overrides.
    pub fn resolve(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(year) = self.train_start {
            config.train_start_year = year;
        }
        if let Some(year) = self.train_end {
            config.train_end_year = year;
        }
        if let Some(date) = self.horizon_end {
            config.horizon_end = month_start(date);
        }
        if let Some(criterion) = self.criterion {
            config.criterion = criterion;
        }
        if self.confidence_level.is_some() {
            config.confidence_level = self.confidence_level;
        }
        if self.sequential {
            config.parallel = false;
        }
        if self.reject_all_unfit {
            config.all_unfit = AllUnfitPolicy::Reject;
        }

        config.validate()?;
        Ok(config)
    }
}

fn load_training(input: &Path, config: &PipelineConfig) -> Result<TrainingWindow> {
    let series = MonthlySeries::from_csv_path(input)?;
    info!(
        input = %input.display(),
        months = series.len(),
        missing = series.missing_count(),
        "loaded series"
    );
    series.training_window(config.train_start_year, config.train_end_year)
}

fn select_on(
    training: &TrainingWindow,
    config: &PipelineConfig,
    out_dir: &Path,
) -> Result<Selection> {
    let selection = SelectionEngine::from_config(config).select(training, &config.grid)?;

    let best = selection.best;
    write_selection_artifacts(out_dir, &selection.ranked, &best, config.criterion)?;

    println!(
        "Best model: {} ({} = {}), {} of {} candidates fitted",
        best.spec,
        config.criterion,
        best.fitness,
        selection.fit_count(),
        selection.ranked.len()
    );
    Ok(selection)
}

fn forecast_on(
    training: &TrainingWindow,
    config: &PipelineConfig,
    spec: Option<ModelSpec>,
    output: &Path,
) -> Result<ForecastOutput> {
    let engine = ForecastEngine::from_config(config)?;
    let forecast = engine.forecast(training, spec, config.horizon_end)?;
    write_forecast(output, &forecast)?;

    println!(
        "Forecast: {} months with {}{} -> {}",
        forecast.points.len(),
        forecast.spec,
        if forecast.used_fallback { " (fallback)" } else { "" },
        output.display()
    );
    Ok(forecast)
}

/// Rank the candidate grid and write the report and best specification.
pub fn select(input: &Path, out_dir: &Path, config: &PipelineConfig) -> Result<Selection> {
    let training = load_training(input, config)?;
    select_on(&training, config, out_dir)
}

/// Fit the stored best specification (or the fallback) and write the forecast.
pub fn forecast(
    input: &Path,
    best: &Path,
    output: &Path,
    config: &PipelineConfig,
) -> Result<ForecastOutput> {
    let training = load_training(input, config)?;
    let spec = read_best_spec(best);
    forecast_on(&training, config, spec, output)
}

/// Selection followed by forecasting on the same training window.
///
/// The horizon is checked first so an impossible target fails before the
/// grid search runs.
pub fn run(input: &Path, out_dir: &Path, config: &PipelineConfig) -> Result<ForecastOutput> {
    let training = load_training(input, config)?;
    let last_period = training
        .last_period()
        .ok_or_else(|| ForecastError::EmptyTrainingData(config.training_label()))?;
    forecast_steps(last_period, config.horizon_end)?;

    select_on(&training, config, out_dir)?;
    let spec = read_best_spec(out_dir.join(BEST_SPEC_FILE));
    forecast_on(&training, config, spec, &out_dir.join(FORECAST_FILE))
}
