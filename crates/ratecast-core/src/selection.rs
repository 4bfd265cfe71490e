//! Grid search over candidate specifications.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{ForecastError, Result};
use crate::grid::CandidateGrid;
use crate::model_spec::ModelSpec;
use crate::scorer::{CandidateScorer, CriterionScorer, ScoredCandidate};
use crate::series::TrainingWindow;

/// Behavior when every candidate in the grid is unfit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllUnfitPolicy {
    /// Return the first unfit candidate in grid order as best, with a warning
    #[default]
    Accept,
    /// Fail with `NoFeasibleCandidate`
    Reject,
}

/// Ranked outcome of a grid search.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// All candidates, ascending by fitness, ties in grid order
    pub ranked: Vec<ScoredCandidate>,
    /// First entry of `ranked`
    pub best: ScoredCandidate,
}

impl Selection {
    /// Number of candidates that produced a finite score.
    pub fn fit_count(&self) -> usize {
        self.ranked.iter().filter(|c| c.fitness.is_fit()).count()
    }
}

/// Scores every grid candidate and ranks the results.
#[derive(Debug, Clone)]
pub struct SelectionEngine<S = CriterionScorer> {
    scorer: S,
    parallel: bool,
    all_unfit: AllUnfitPolicy,
}

impl SelectionEngine<CriterionScorer> {
    /// Engine scoring by the configured information criterion.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let scorer =
            CriterionScorer::new(config.criterion).with_timeout(config.candidate_timeout());
        SelectionEngine::new(scorer)
            .with_parallel(config.parallel)
            .with_all_unfit(config.all_unfit)
    }
}

impl<S: CandidateScorer> SelectionEngine<S> {
    pub fn new(scorer: S) -> Self {
        Self {
            scorer,
            parallel: true,
            all_unfit: AllUnfitPolicy::Accept,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_all_unfit(mut self, policy: AllUnfitPolicy) -> Self {
        self.all_unfit = policy;
        self
    }

    /// Score every candidate of `grid` on `training` and rank them.
    ///
    /// Evaluation order does not affect the result: candidates are collected
    /// in grid order and stably sorted, so equal scores keep grid order.
    pub fn select(&self, training: &TrainingWindow, grid: &CandidateGrid) -> Result<Selection> {
        if training.is_empty() {
            return Err(ForecastError::EmptyTrainingData(
                "training window".to_string(),
            ));
        }

        let specs = grid.specs();
        if specs.is_empty() {
            return Err(ForecastError::InvalidInput(
                "candidate grid is empty".to_string(),
            ));
        }

        let values = training.values();
        let score = |(grid_index, spec): (usize, &ModelSpec)| ScoredCandidate {
            spec: *spec,
            fitness: self.scorer.score(values, spec),
            grid_index,
        };
        let mut ranked: Vec<ScoredCandidate> = if self.parallel {
            specs.par_iter().enumerate().map(score).collect()
        } else {
            specs.iter().enumerate().map(score).collect()
        };

        // Stable: ties stay in grid order
        ranked.sort_by(|a, b| a.fitness.cmp(&b.fitness));

        let best = ranked[0];
        let fit_count = ranked.iter().filter(|c| c.fitness.is_fit()).count();
        if fit_count == 0 {
            match self.all_unfit {
                AllUnfitPolicy::Accept => warn!(
                    candidates = ranked.len(),
                    best = %best.spec,
                    "no candidate could be fitted; keeping first grid entry as best"
                ),
                AllUnfitPolicy::Reject => {
                    return Err(ForecastError::NoFeasibleCandidate(ranked.len()))
                }
            }
        }

        info!(
            candidates = ranked.len(),
            fitted = fit_count,
            best = %best.spec,
            fitness = %best.fitness,
            "model selection complete"
        );

        Ok(Selection { ranked, best })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::OrderBounds;
    use crate::sarima::InformationCriterion;
    use crate::scorer::Fitness;
    use chrono::NaiveDate;

    /// Scores by a fixed function of the order, for deterministic rankings.
    struct TableScorer<F: Fn(&ModelSpec) -> Fitness + Sync>(F);

    impl<F: Fn(&ModelSpec) -> Fitness + Sync> CandidateScorer for TableScorer<F> {
        fn score(&self, _values: &[f64], spec: &ModelSpec) -> Fitness {
            (self.0)(spec)
        }
    }

    fn window(n: usize) -> TrainingWindow {
        let values = (0..n)
            .map(|i| {
                let season = (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin();
                8.0 + 0.5 * season + ((i * 7 + 3) % 11) as f64 * 0.05
            })
            .collect();
        TrainingWindow::consecutive(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(), values).unwrap()
    }

    fn small_grid() -> CandidateGrid {
        CandidateGrid::non_seasonal_only(OrderBounds::new(1, 1, 1))
    }

    #[test]
    fn test_ranked_is_sorted_and_best_is_first() {
        let engine = SelectionEngine::new(TableScorer(|spec: &ModelSpec| {
            let o = spec.order();
            Fitness::Fit(((o.p * 7 + o.d * 3 + o.q * 5) % 4) as f64)
        }));
        let selection = engine.select(&window(24), &small_grid()).unwrap();

        assert_eq!(selection.ranked.len(), 8);
        assert!(selection
            .ranked
            .windows(2)
            .all(|w| w[0].fitness <= w[1].fitness));
        assert_eq!(selection.best, selection.ranked[0]);
    }

    /// Everything ties except ARIMA(0,0,0).
    fn tie_score(spec: &ModelSpec) -> Fitness {
        if *spec == ModelSpec::arima(0, 0, 0) {
            Fitness::Fit(10.0)
        } else {
            Fitness::Fit(1.0)
        }
    }

    #[test]
    fn test_ties_break_by_grid_order() {
        for parallel in [true, false] {
            let engine = SelectionEngine::new(TableScorer(tie_score)).with_parallel(parallel);
            let selection = engine.select(&window(24), &small_grid()).unwrap();
            let indices: Vec<usize> = selection.ranked.iter().map(|c| c.grid_index).collect();
            assert_eq!(indices, vec![1, 2, 3, 4, 5, 6, 7, 0]);
            assert_eq!(selection.best.spec, ModelSpec::arima(0, 0, 1));
        }
    }

    #[test]
    fn test_unfit_ranks_last() {
        let engine = SelectionEngine::new(TableScorer(|spec: &ModelSpec| {
            if spec.order().d == 1 {
                Fitness::Unfit
            } else {
                Fitness::Fit(-(spec.order().p as f64))
            }
        }));
        let selection = engine.select(&window(24), &small_grid()).unwrap();
        assert_eq!(selection.fit_count(), 4);
        assert!(selection.ranked[4..].iter().all(|c| !c.fitness.is_fit()));
        assert_eq!(selection.best.spec, ModelSpec::arima(1, 0, 0));
    }

    #[test]
    fn test_all_unfit_policies() {
        let accept = SelectionEngine::new(TableScorer(|_: &ModelSpec| Fitness::Unfit));
        let selection = accept.select(&window(24), &small_grid()).unwrap();
        assert_eq!(selection.best.grid_index, 0);
        assert_eq!(selection.best.fitness, Fitness::Unfit);

        let reject = SelectionEngine::new(TableScorer(|_: &ModelSpec| Fitness::Unfit))
            .with_all_unfit(AllUnfitPolicy::Reject);
        assert!(matches!(
            reject.select(&window(24), &small_grid()),
            Err(ForecastError::NoFeasibleCandidate(8))
        ));
    }

    #[test]
    fn test_empty_training_data() {
        let engine = SelectionEngine::new(CriterionScorer::default());
        let empty = TrainingWindow::new(vec![], vec![]).unwrap();
        assert!(matches!(
            engine.select(&empty, &small_grid()),
            Err(ForecastError::EmptyTrainingData(_))
        ));
    }

    #[test]
    fn test_empty_grid() {
        let engine = SelectionEngine::new(CriterionScorer::default());
        let grid = CandidateGrid {
            non_seasonal: None,
            seasonal: None,
        };
        assert!(matches!(
            engine.select(&window(24), &grid),
            Err(ForecastError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_real_scorer_finds_finite_candidate() {
        let engine = SelectionEngine::new(CriterionScorer::default());
        let selection = engine.select(&window(120), &small_grid()).unwrap();
        assert!(selection.best.fitness.is_fit());
        assert!(selection.fit_count() > 0);
    }

    fn panics_on_ar(_: &[f64], spec: &ModelSpec, _: InformationCriterion) -> Result<f64> {
        if spec.order().p == 1 {
            panic!("estimator blew up on {}", spec);
        }
        Ok(spec.order().q as f64)
    }

    #[test]
    fn test_panicking_candidate_does_not_abort_selection() {
        for parallel in [true, false] {
            let scorer = CriterionScorer::default().with_fit(panics_on_ar);
            let engine = SelectionEngine::new(scorer).with_parallel(parallel);
            let selection = engine.select(&window(24), &small_grid()).unwrap();

            assert_eq!(selection.ranked.len(), 8);
            assert_eq!(selection.fit_count(), 4);
            assert!(selection.ranked[4..]
                .iter()
                .all(|c| c.spec.order().p == 1 && c.fitness == Fitness::Unfit));
            assert_eq!(selection.best.spec, ModelSpec::arima(0, 0, 0));
        }
    }
}
