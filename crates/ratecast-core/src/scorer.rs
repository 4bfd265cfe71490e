//! Failure-isolating candidate scoring.

use std::cmp::Ordering;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::{ForecastError, Result};
use crate::model_spec::ModelSpec;
use crate::sarima::{InformationCriterion, Sarima};

/// Outcome of scoring one candidate. Lower is better.
///
/// `Unfit` ranks after every `Fit`. A `Fit` never holds a non-finite value.
#[derive(Debug, Clone, Copy)]
pub enum Fitness {
    Fit(f64),
    Unfit,
}

impl Fitness {
    /// Wrap a criterion value, mapping non-finite values to `Unfit`.
    pub fn from_value(value: f64) -> Self {
        if value.is_finite() {
            Fitness::Fit(value)
        } else {
            Fitness::Unfit
        }
    }

    pub fn is_fit(&self) -> bool {
        matches!(self, Fitness::Fit(_))
    }

    /// Numeric value; `Unfit` is positive infinity.
    pub fn value(&self) -> f64 {
        match self {
            Fitness::Fit(v) => *v,
            Fitness::Unfit => f64::INFINITY,
        }
    }
}

impl PartialEq for Fitness {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Fitness {}

impl PartialOrd for Fitness {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fitness {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Fitness::Fit(a), Fitness::Fit(b)) => a.total_cmp(b),
            (Fitness::Fit(_), Fitness::Unfit) => Ordering::Less,
            (Fitness::Unfit, Fitness::Fit(_)) => Ordering::Greater,
            (Fitness::Unfit, Fitness::Unfit) => Ordering::Equal,
        }
    }
}

impl fmt::Display for Fitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fitness::Fit(v) => write!(f, "{}", v),
            Fitness::Unfit => f.write_str("inf"),
        }
    }
}

/// A grid candidate with its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub spec: ModelSpec,
    pub fitness: Fitness,
    /// Position in grid enumeration order
    pub grid_index: usize,
}

/// Scores a single candidate specification on a training series.
///
/// Implementations must not fail: a candidate that cannot be fitted is
/// reported as [`Fitness::Unfit`].
pub trait CandidateScorer: Sync {
    fn score(&self, values: &[f64], spec: &ModelSpec) -> Fitness;
}

/// Fits one candidate and returns its criterion value.
pub(crate) type FitFn = fn(&[f64], &ModelSpec, InformationCriterion) -> Result<f64>;

/// Scores candidates by the information criterion of a SARIMA fit.
#[derive(Clone)]
pub struct CriterionScorer {
    criterion: InformationCriterion,
    timeout: Option<Duration>,
    fit: FitFn,
}

impl fmt::Debug for CriterionScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CriterionScorer")
            .field("criterion", &self.criterion)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Default for CriterionScorer {
    fn default() -> Self {
        Self::new(InformationCriterion::default())
    }
}

impl CriterionScorer {
    pub fn new(criterion: InformationCriterion) -> Self {
        Self {
            criterion,
            timeout: None,
            fit: criterion_value,
        }
    }

    /// Give up on a candidate after `timeout`, treating it as unfit.
    ///
    /// The fit runs on its own thread. A fit that overruns is abandoned, not
    /// cancelled: its thread keeps running until the estimator returns, and
    /// the result is discarded.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_fit(mut self, fit: FitFn) -> Self {
        self.fit = fit;
        self
    }

    pub fn criterion(&self) -> InformationCriterion {
        self.criterion
    }

    fn score_with_timeout(&self, values: &[f64], spec: &ModelSpec, timeout: Duration) -> Fitness {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let values = values.to_vec();
        let spec = *spec;
        let criterion = self.criterion;
        let fit = self.fit;

        let spawned = thread::Builder::new()
            .name(format!("fit-{}", spec))
            .spawn(move || {
                // The receiver is gone once the deadline passed
                let _ = tx.send(isolated(fit, &values, &spec, criterion));
            });
        if let Err(e) = spawned {
            debug!(spec = %spec, error = %e, "could not spawn fit worker");
            return Fitness::Unfit;
        }

        match rx.recv_timeout(timeout) {
            Ok(fitness) => fitness,
            Err(_) => {
                debug!(spec = %spec, timeout_ms = timeout.as_millis() as u64, "candidate fit timed out");
                Fitness::Unfit
            }
        }
    }
}

impl CandidateScorer for CriterionScorer {
    fn score(&self, values: &[f64], spec: &ModelSpec) -> Fitness {
        match self.timeout {
            Some(timeout) => self.score_with_timeout(values, spec, timeout),
            None => isolated(self.fit, values, spec, self.criterion),
        }
    }
}

fn criterion_value(values: &[f64], spec: &ModelSpec, criterion: InformationCriterion) -> Result<f64> {
    Sarima::new(*spec)
        .fit(values)?
        .criterion(criterion)
        .ok_or_else(|| {
            ForecastError::ComputationError(format!("{} has no finite {}", spec, criterion))
        })
}

/// Run `fit`, absorbing errors and panics into `Unfit`.
fn isolated(
    fit: FitFn,
    values: &[f64],
    spec: &ModelSpec,
    criterion: InformationCriterion,
) -> Fitness {
    match catch_unwind(AssertUnwindSafe(|| fit(values, spec, criterion))) {
        Ok(Ok(value)) => {
            let fitness = Fitness::from_value(value);
            debug!(spec = %spec, %criterion, fitness = %fitness, "scored candidate");
            fitness
        }
        Ok(Err(e)) => {
            debug!(spec = %spec, error = %e, "candidate failed to fit");
            Fitness::Unfit
        }
        Err(_) => {
            debug!(spec = %spec, "candidate fit panicked");
            Fitness::Unfit
        }
    }
}
