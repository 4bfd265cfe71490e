//! Error types for the selection and forecast steps.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type for ratecast operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Error types for ratecast operations.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Empty training data: no usable observations in {0}")]
    EmptyTrainingData(String),

    #[error("Invalid horizon: {horizon_end} is not after the training end {last_period}")]
    InvalidHorizon {
        last_period: NaiveDate,
        horizon_end: NaiveDate,
    },

    #[error("Failed to fit {spec}: {reason}")]
    FitFailure { spec: String, reason: String },

    #[error("Malformed model specification: {0}")]
    MalformedSpecification(String),

    #[error("No feasible candidate: all {0} grid candidates failed to fit")]
    NoFeasibleCandidate(usize),

    #[error("Duplicate period in series: {0}")]
    DuplicatePeriod(NaiveDate),

    #[error("Invalid date format: {0}")]
    InvalidDateFormat(String),

    #[error("Insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Invalid parameter '{param}' = '{value}': {reason}")]
    InvalidParameter {
        param: String,
        value: String,
        reason: String,
    },

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ForecastError {
    /// Convert to a numeric code, used as the process exit status by the CLI.
    pub fn to_code(&self) -> i32 {
        match self {
            ForecastError::InvalidInput(_) => 2,
            ForecastError::EmptyTrainingData(_) => 3,
            ForecastError::InvalidHorizon { .. } => 4,
            ForecastError::FitFailure { .. } => 5,
            ForecastError::MalformedSpecification(_) => 6,
            ForecastError::NoFeasibleCandidate(_) => 7,
            ForecastError::DuplicatePeriod(_) => 8,
            ForecastError::InvalidDateFormat(_) => 9,
            ForecastError::InsufficientData { .. } => 10,
            ForecastError::InvalidParameter { .. } => 11,
            ForecastError::ComputationError(_) => 12,
            ForecastError::Io(_) => 13,
            ForecastError::Csv(_) => 14,
            ForecastError::Json(_) => 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(ForecastError::InvalidInput("test".into()).to_code(), 2);
        assert_eq!(
            ForecastError::EmptyTrainingData("2000-2009".into()).to_code(),
            3
        );
        let date = NaiveDate::from_ymd_opt(2009, 12, 1).unwrap();
        assert_eq!(
            ForecastError::InvalidHorizon {
                last_period: date,
                horizon_end: date
            }
            .to_code(),
            4
        );
        assert_eq!(
            ForecastError::FitFailure {
                spec: "ARIMA(1,1,1)".into(),
                reason: "test".into()
            }
            .to_code(),
            5
        );
        assert_eq!(ForecastError::NoFeasibleCandidate(27).to_code(), 7);
        assert_eq!(ForecastError::DuplicatePeriod(date).to_code(), 8);
        assert_eq!(
            ForecastError::InsufficientData { needed: 10, got: 5 }.to_code(),
            10
        );
    }

    #[test]
    fn test_error_display() {
        let err = ForecastError::EmptyTrainingData("years 2000-2009".into());
        assert_eq!(
            format!("{}", err),
            "Empty training data: no usable observations in years 2000-2009"
        );

        let err = ForecastError::InvalidHorizon {
            last_period: NaiveDate::from_ymd_opt(2009, 12, 1).unwrap(),
            horizon_end: NaiveDate::from_ymd_opt(2009, 6, 1).unwrap(),
        };
        assert_eq!(
            format!("{}", err),
            "Invalid horizon: 2009-06-01 is not after the training end 2009-12-01"
        );

        let err = ForecastError::FitFailure {
            spec: "SARIMA(1,1,1)(1,1,1)[12]".into(),
            reason: "residual variance is zero".into(),
        };
        assert_eq!(
            format!("{}", err),
            "Failed to fit SARIMA(1,1,1)(1,1,1)[12]: residual variance is zero"
        );

        let err = ForecastError::InvalidParameter {
            param: "train_end_year".into(),
            value: "1999".into(),
            reason: "must not precede train_start_year".into(),
        };
        assert_eq!(
            format!("{}", err),
            "Invalid parameter 'train_end_year' = '1999': must not precede train_start_year"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ForecastError = io.into();
        assert!(matches!(err, ForecastError::Io(_)));
        assert_eq!(err.to_code(), 13);
    }
}
