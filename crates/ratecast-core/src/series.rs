//! Monthly series loading, regularization and training-window slicing.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::error::{ForecastError, Result};

/// Column names accepted for the period.
const DATE_COLUMNS: &[&str] = &["date", "period", "month_start", "ds"];

/// Column names accepted for the value, in order of preference.
const VALUE_COLUMNS: &[&str] = &["rate", "rate_per_1000", "value", "y"];

const MONTH_NAMES: &[&str] = &[
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// A single observation; `None` marks a month with no usable value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub period: NaiveDate,
    pub value: Option<f64>,
}

/// Strictly regular monthly series.
///
/// Periods are first-of-month dates, strictly increasing by exactly one
/// month. Months absent from the source are present here with a `None`
/// value.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySeries {
    points: Vec<SeriesPoint>,
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Signed number of calendar months from `from` to `to`.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    let from_months = from.year() as i64 * 12 + from.month0() as i64;
    let to_months = to.year() as i64 * 12 + to.month0() as i64;
    to_months - from_months
}

/// `date` shifted forward by `months` calendar months.
pub fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months)).ok_or_else(|| {
        ForecastError::InvalidInput(format!("{} + {} months is out of range", date, months))
    })
}

impl MonthlySeries {
    /// Build a regular series from arbitrary (period, value) points.
    ///
    /// Points are sorted, dates normalized to the first of their month and
    /// gaps filled with missing values. Two points in the same month are an
    /// error. Non-finite values are treated as missing.
    pub fn from_points(points: Vec<(NaiveDate, Option<f64>)>) -> Result<Self> {
        let mut pairs: Vec<(NaiveDate, Option<f64>)> = points
            .into_iter()
            .map(|(d, v)| (month_start(d), v.filter(|x| x.is_finite())))
            .collect();
        pairs.sort_by_key(|(d, _)| *d);

        let mut regular: Vec<SeriesPoint> = Vec::with_capacity(pairs.len());
        for (period, value) in pairs {
            if let Some(prev_period) = regular.last().map(|p| p.period) {
                let gap = months_between(prev_period, period);
                if gap == 0 {
                    return Err(ForecastError::DuplicatePeriod(period));
                }
                for step in 1..gap {
                    regular.push(SeriesPoint {
                        period: add_months(prev_period, step as u32)?,
                        value: None,
                    });
                }
            }
            regular.push(SeriesPoint { period, value });
        }

        Ok(Self { points: regular })
    }

    /// Load a tidy CSV file.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            ForecastError::InvalidInput(format!("cannot open series {}: {}", path.display(), e))
        })?;
        let series = Self::from_reader(file)?;
        debug!(path = %path.display(), points = series.len(), "loaded monthly series");
        Ok(series)
    }

    /// Load a tidy CSV table from any reader.
    ///
    /// The period is taken from a date column or from a `year` + `month`
    /// column pair; the value from a rate-like column. Header names are
    /// matched after trimming, lowercasing and replacing spaces with `_`.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .map(|h| h.trim().to_lowercase().replace(' ', "_"))
            .collect();
        let find = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| headers.iter().position(|h| h == name))
        };

        let period_source = match find(DATE_COLUMNS) {
            Some(idx) => PeriodSource::Date(idx),
            None => match (find(&["year"]), find(&["month"])) {
                (Some(y), Some(m)) => PeriodSource::YearMonth(y, m),
                _ => {
                    return Err(ForecastError::InvalidInput(format!(
                        "no date or year/month columns found in {:?}",
                        headers
                    )))
                }
            },
        };
        let value_idx = find(VALUE_COLUMNS)
            .or_else(|| headers.iter().position(|h| h.contains("rate")))
            .ok_or_else(|| {
                ForecastError::InvalidInput(format!("no rate column found in {:?}", headers))
            })?;

        let mut points = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            let period = match period_source {
                PeriodSource::Date(idx) => parse_period(record.get(idx).unwrap_or(""))?,
                PeriodSource::YearMonth(y, m) => parse_year_month(
                    record.get(y).unwrap_or(""),
                    record.get(m).unwrap_or(""),
                )
                .ok_or_else(|| {
                    ForecastError::InvalidDateFormat(format!("row {}: unparseable year/month", row + 1))
                })?,
            };
            points.push((period, parse_value(record.get(value_idx).unwrap_or(""))));
        }

        Self::from_points(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn first_period(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.period)
    }

    pub fn last_period(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.period)
    }

    /// Number of months without a value.
    pub fn missing_count(&self) -> usize {
        self.points.iter().filter(|p| p.value.is_none()).count()
    }

    /// Usable points of the years `start_year..=end_year`.
    ///
    /// Missing values are dropped rather than interpolated.
    pub fn training_window(&self, start_year: i32, end_year: i32) -> Result<TrainingWindow> {
        let (periods, values): (Vec<NaiveDate>, Vec<f64>) = self
            .points
            .iter()
            .filter(|p| (start_year..=end_year).contains(&p.period.year()))
            .filter_map(|p| p.value.map(|v| (p.period, v)))
            .unzip();

        if values.is_empty() {
            return Err(ForecastError::EmptyTrainingData(format!(
                "years {}-{}",
                start_year, end_year
            )));
        }

        debug!(
            start_year,
            end_year,
            usable = values.len(),
            "sliced training window"
        );
        Ok(TrainingWindow { periods, values })
    }
}

enum PeriodSource {
    Date(usize),
    YearMonth(usize, usize),
}

fn parse_period(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(month_start(d));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(month_start(dt.date()));
        }
    }
    // "%Y-%m" has no day, so parse it with a synthetic one
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d") {
        return Ok(d);
    }
    Err(ForecastError::InvalidDateFormat(raw.to_string()))
}

fn parse_year_month(year: &str, month: &str) -> Option<NaiveDate> {
    let year: i32 = year.trim().parse().ok()?;
    let month = parse_month(month)?;
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn parse_month(raw: &str) -> Option<u32> {
    let raw = raw.trim().to_lowercase();
    if let Ok(m) = raw.parse::<u32>() {
        return (1..=12).contains(&m).then_some(m);
    }
    if raw.len() < 3 {
        return None;
    }
    MONTH_NAMES
        .iter()
        .position(|name| name.starts_with(raw.as_str()))
        .map(|i| i as u32 + 1)
}

fn parse_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Usable observations of a training slice, in period order.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingWindow {
    periods: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl TrainingWindow {
    /// Build a window from parallel period/value vectors.
    ///
    /// Periods must be strictly increasing and values finite. An empty
    /// window is allowed here; the selection and forecast steps reject it.
    pub fn new(periods: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self> {
        if periods.len() != values.len() {
            return Err(ForecastError::InvalidInput(format!(
                "{} periods but {} values",
                periods.len(),
                values.len()
            )));
        }
        if let Some(w) = periods.windows(2).find(|w| w[1] <= w[0]) {
            return Err(ForecastError::InvalidInput(format!(
                "periods must be strictly increasing: {} then {}",
                w[0], w[1]
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::InvalidInput(
                "training values must be finite".to_string(),
            ));
        }
        Ok(Self {
            periods: periods.into_iter().map(month_start).collect(),
            values,
        })
    }

    /// Window of consecutive months starting at `start`.
    pub fn consecutive(start: NaiveDate, values: Vec<f64>) -> Result<Self> {
        let start = month_start(start);
        let periods = (0..values.len())
            .map(|i| add_months(start, i as u32))
            .collect::<Result<Vec<_>>>()?;
        Self::new(periods, values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn periods(&self) -> &[NaiveDate] {
        &self.periods
    }

    pub fn last_period(&self) -> Option<NaiveDate> {
        self.periods.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_months_between() {
        assert_eq!(months_between(ymd(2009, 12, 1), ymd(2023, 12, 1)), 168);
        assert_eq!(months_between(ymd(2009, 12, 1), ymd(2010, 1, 1)), 1);
        assert_eq!(months_between(ymd(2009, 12, 1), ymd(2009, 12, 1)), 0);
        assert_eq!(months_between(ymd(2009, 12, 1), ymd(2009, 6, 1)), -6);
    }

    #[test]
    fn test_from_points_fills_gaps() {
        // February missing
        let series = MonthlySeries::from_points(vec![
            (ymd(2023, 3, 1), Some(3.0)),
            (ymd(2023, 1, 1), Some(1.0)),
        ])
        .unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series.points()[1].period, ymd(2023, 2, 1));
        assert_eq!(series.points()[1].value, None);
        assert_eq!(series.missing_count(), 1);
    }

    #[test]
    fn test_from_points_normalizes_to_month_start() {
        let series = MonthlySeries::from_points(vec![
            (ymd(2023, 1, 15), Some(1.0)),
            (ymd(2023, 2, 28), Some(f64::NAN)),
        ])
        .unwrap();
        assert_eq!(series.first_period(), Some(ymd(2023, 1, 1)));
        assert_eq!(series.last_period(), Some(ymd(2023, 2, 1)));
        assert_eq!(series.points()[1].value, None);
    }

    #[test]
    fn test_duplicate_period_rejected() {
        let result = MonthlySeries::from_points(vec![
            (ymd(2023, 1, 1), Some(1.0)),
            (ymd(2023, 1, 20), Some(2.0)),
        ]);
        assert!(matches!(result, Err(ForecastError::DuplicatePeriod(d)) if d == ymd(2023, 1, 1)));
    }

    #[test]
    fn test_reader_with_date_column_and_header_variation() {
        let csv = "Date , Rate Per 1000\n2000-01-01,8.2\n2000-02-01,\n2000-04-01,8.5\n";
        let series = MonthlySeries::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(series.len(), 4);
        assert_eq!(series.missing_count(), 2);
        assert_eq!(series.points()[3].value, Some(8.5));
    }

    #[test]
    fn test_reader_with_year_month_columns() {
        let csv = "year,month,rate_per_1000\n2001,Jan,7.0\n2001,February,7.1\n2001,3,7.2\n";
        let series = MonthlySeries::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.first_period(), Some(ymd(2001, 1, 1)));
        assert_eq!(series.points()[2].value, Some(7.2));
    }

    #[test]
    fn test_reader_accepts_year_month_strings() {
        let csv = "period,value\n2005-11,1.0\n2005-12,NA\n";
        let series = MonthlySeries::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(series.first_period(), Some(ymd(2005, 11, 1)));
        assert_eq!(series.points()[1].value, None);
    }

    #[test]
    fn test_reader_rejects_bad_dates_and_missing_columns() {
        let bad_date = "date,rate\nnot-a-date,1.0\n";
        assert!(matches!(
            MonthlySeries::from_reader(bad_date.as_bytes()),
            Err(ForecastError::InvalidDateFormat(_))
        ));

        let no_rate = "date,count\n2000-01-01,5\n";
        assert!(matches!(
            MonthlySeries::from_reader(no_rate.as_bytes()),
            Err(ForecastError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month("1"), Some(1));
        assert_eq!(parse_month("12"), Some(12));
        assert_eq!(parse_month("13"), None);
        assert_eq!(parse_month("Sep"), Some(9));
        assert_eq!(parse_month("december"), Some(12));
        assert_eq!(parse_month("ju"), None);
    }

    #[test]
    fn test_training_window_drops_missing() {
        let series = MonthlySeries::from_points(vec![
            (ymd(1999, 12, 1), Some(0.5)),
            (ymd(2000, 1, 1), Some(1.0)),
            (ymd(2000, 2, 1), None),
            (ymd(2000, 3, 1), Some(3.0)),
            (ymd(2010, 1, 1), Some(9.0)),
        ])
        .unwrap();

        let window = series.training_window(2000, 2009).unwrap();
        assert_eq!(window.values(), &[1.0, 3.0]);
        assert_eq!(window.periods(), &[ymd(2000, 1, 1), ymd(2000, 3, 1)]);
        assert_eq!(window.last_period(), Some(ymd(2000, 3, 1)));
    }

    #[test]
    fn test_training_window_empty() {
        let series = MonthlySeries::from_points(vec![
            (ymd(2000, 1, 1), None),
            (ymd(2011, 1, 1), Some(1.0)),
        ])
        .unwrap();
        assert!(matches!(
            series.training_window(2000, 2009),
            Err(ForecastError::EmptyTrainingData(_))
        ));
    }

    #[test]
    fn test_training_window_constructors() {
        let window = TrainingWindow::consecutive(ymd(2000, 1, 1), vec![1.0; 24]).unwrap();
        assert_eq!(window.len(), 24);
        assert_eq!(window.last_period(), Some(ymd(2001, 12, 1)));

        assert!(TrainingWindow::new(vec![ymd(2000, 2, 1), ymd(2000, 1, 1)], vec![1.0, 2.0]).is_err());
        assert!(TrainingWindow::new(vec![ymd(2000, 1, 1)], vec![f64::INFINITY]).is_err());
        assert!(TrainingWindow::new(vec![], vec![]).unwrap().is_empty());
    }
}
