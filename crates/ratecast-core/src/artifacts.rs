//! Reading and writing the files passed between pipeline steps.
//!
//! Every write goes to a hidden sibling file that is renamed into place once
//! complete, so a failed step leaves any previous artifact untouched.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ForecastError, Result};
use crate::forecast::ForecastOutput;
use crate::model_spec::{ModelSpec, SpecRecord};
use crate::sarima::InformationCriterion;
use crate::scorer::ScoredCandidate;

/// Default file name of the ranked candidate report.
pub const SELECTION_REPORT_FILE: &str = "model_selection_results.csv";
/// Default file name of the best specification.
pub const BEST_SPEC_FILE: &str = "best_model.json";
/// Default file name of the forecast.
pub const FORECAST_FILE: &str = "forecast.csv";

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

/// Run `write` against a temporary sibling of `path` and return the sibling.
///
/// The sibling is removed if `write` fails.
fn stage<F>(path: &Path, write: F) -> Result<PathBuf>
where
    F: FnOnce(&Path) -> Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_sibling(path);
    if let Err(e) = write(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(tmp)
}

/// Rename a staged file over `path`.
fn commit(tmp: &Path, path: &Path) -> Result<()> {
    if let Err(e) = fs::rename(tmp, path) {
        let _ = fs::remove_file(tmp);
        return Err(e.into());
    }
    debug!(path = %path.display(), "artifact written");
    Ok(())
}

fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let tmp = stage(path, write)?;
    commit(&tmp, path)
}

fn format_tuple(values: &[usize]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("({})", parts.join(", "))
}

fn report_to(
    path: &Path,
    ranked: &[ScoredCandidate],
    criterion: InformationCriterion,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["family", "order", "seasonal_order", criterion.as_str()])?;
    for candidate in ranked {
        let spec = candidate.spec;
        let seasonal = spec
            .seasonal_order()
            .map(|s| format_tuple(&s.to_vec()))
            .unwrap_or_default();
        writer.write_record([
            spec.family().as_str().to_string(),
            format_tuple(&spec.order().to_vec()),
            seasonal,
            candidate.fitness.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn best_spec_json(spec: &ModelSpec, fitness: Option<f64>) -> Result<String> {
    let record = spec.to_record(fitness.filter(|v| v.is_finite()));
    Ok(serde_json::to_string_pretty(&record)?)
}

/// Write the ranked candidates as `family,order,seasonal_order,<criterion>`.
pub fn write_selection_report<P: AsRef<Path>>(
    path: P,
    ranked: &[ScoredCandidate],
    criterion: InformationCriterion,
) -> Result<()> {
    write_atomic(path.as_ref(), |tmp| report_to(tmp, ranked, criterion))
}

/// Write the best specification as pretty-printed JSON.
pub fn write_best_spec<P: AsRef<Path>>(path: P, spec: &ModelSpec, fitness: Option<f64>) -> Result<()> {
    let json = best_spec_json(spec, fitness)?;
    write_atomic(path.as_ref(), |tmp| {
        fs::write(tmp, json.as_bytes())?;
        Ok(())
    })
}

/// Write the selection report and best specification into `out_dir`.
///
/// Both files are staged before either is renamed into place, so a failure
/// while writing leaves the previous pair of artifacts untouched.
pub fn write_selection_artifacts<P: AsRef<Path>>(
    out_dir: P,
    ranked: &[ScoredCandidate],
    best: &ScoredCandidate,
    criterion: InformationCriterion,
) -> Result<()> {
    let report = out_dir.as_ref().join(SELECTION_REPORT_FILE);
    let best_path = out_dir.as_ref().join(BEST_SPEC_FILE);

    let staged_report = stage(&report, |tmp| report_to(tmp, ranked, criterion))?;
    let staged_best = best_spec_json(&best.spec, Some(best.fitness.value())).and_then(|json| {
        stage(&best_path, |tmp| {
            fs::write(tmp, json.as_bytes())?;
            Ok(())
        })
    });
    let staged_best = match staged_best {
        Ok(tmp) => tmp,
        Err(e) => {
            let _ = fs::remove_file(&staged_report);
            return Err(e);
        }
    };

    if let Err(e) = commit(&staged_report, &report) {
        let _ = fs::remove_file(&staged_best);
        return Err(e);
    }
    commit(&staged_best, &best_path)
}

/// Read a best-specification artifact.
///
/// A missing file is `None`. Unreadable or malformed content is logged and
/// also treated as `None`, so the forecast step falls back instead of failing.
pub fn read_best_spec<P: AsRef<Path>>(path: P) -> Option<ModelSpec> {
    let path = path.as_ref();
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no best specification artifact");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read best specification");
            return None;
        }
    };

    let parsed = serde_json::from_str::<SpecRecord>(&text)
        .map_err(|e| ForecastError::MalformedSpecification(e.to_string()))
        .and_then(ModelSpec::try_from);
    match parsed {
        Ok(spec) => Some(spec),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed best specification");
            None
        }
    }
}

/// Write a forecast as `date,pred` plus `lower,upper` when bounds exist.
pub fn write_forecast<P: AsRef<Path>>(path: P, output: &ForecastOutput) -> Result<()> {
    let with_bounds = output
        .points
        .iter()
        .all(|p| p.lower.is_some() && p.upper.is_some())
        && !output.points.is_empty();

    write_atomic(path.as_ref(), |tmp| {
        let mut writer = csv::Writer::from_path(tmp)?;
        if with_bounds {
            writer.write_record(["date", "pred", "lower", "upper"])?;
        } else {
            writer.write_record(["date", "pred"])?;
        }
        for point in &output.points {
            let date = point.period.format("%Y-%m-%d").to_string();
            let mut record = vec![date, point.predicted.to_string()];
            if with_bounds {
                record.push(point.lower.unwrap_or(f64::NAN).to_string());
                record.push(point.upper.unwrap_or(f64::NAN).to_string());
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    })
}
