//! Fourier seasonal components

use chrono::NaiveDateTime;
use std::f64::consts::PI;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// A periodic component expressed as a truncated Fourier series
#[derive(Debug, Clone, PartialEq)]
pub struct Seasonality {
    pub name: String,
    /// Period in days
    pub period: f64,
    pub fourier_order: usize,
}

impl Seasonality {
    pub fn new(name: impl Into<String>, period: f64, fourier_order: usize) -> Self {
        Self {
            name: name.into(),
            period,
            fourier_order,
        }
    }

    /// Number of feature columns
    pub fn width(&self) -> usize {
        2 * self.fourier_order
    }

    /// Feature values at `ds`: sin, cos for each harmonic
    pub(crate) fn features(&self, ds: NaiveDateTime) -> Vec<f64> {
        let days = days_since_epoch(ds);
        (1..=self.fourier_order)
            .flat_map(|n| {
                let angle = 2.0 * PI * n as f64 * days / self.period;
                [angle.sin(), angle.cos()]
            })
            .collect()
    }
}

pub(crate) fn days_since_epoch(ds: NaiveDateTime) -> f64 {
    ds.and_utc().timestamp_millis() as f64 / MILLIS_PER_DAY
}

/// Seasonalities supported by the span and spacing of `dates` (sorted)
pub(crate) fn auto_seasonalities(dates: &[NaiveDateTime]) -> Vec<Seasonality> {
    if dates.len() < 2 {
        return Vec::new();
    }

    let span_days = (dates[dates.len() - 1] - dates[0]).num_milliseconds() as f64 / MILLIS_PER_DAY;
    let min_spacing = dates
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds() as f64 / MILLIS_PER_DAY)
        .filter(|&gap| gap > 0.0)
        .fold(f64::INFINITY, f64::min);

    let mut seasonalities = Vec::new();
    if span_days >= 730.0 {
        seasonalities.push(Seasonality::new("yearly", 365.25, 10));
    }
    if span_days >= 14.0 && min_spacing < 7.0 {
        seasonalities.push(Seasonality::new("weekly", 7.0, 3));
    }
    if span_days >= 2.0 && min_spacing < 1.0 {
        seasonalities.push(Seasonality::new("daily", 1.0, 4));
    }
    seasonalities
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn daily(n: i64) -> Vec<NaiveDateTime> {
        let start = NaiveDate::from_ymd_opt(2022, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n).map(|i| start + Duration::days(i)).collect()
    }

    fn names(seasonalities: &[Seasonality]) -> Vec<&str> {
        seasonalities.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_auto_seasonalities_daily_data() {
        assert!(auto_seasonalities(&daily(10)).is_empty());
        assert_eq!(names(&auto_seasonalities(&daily(200))), vec!["weekly"]);
        assert_eq!(
            names(&auto_seasonalities(&daily(800))),
            vec!["yearly", "weekly"]
        );
    }

    #[test]
    fn test_auto_seasonalities_hourly_data() {
        let start = daily(1)[0];
        let hourly: Vec<NaiveDateTime> = (0..24 * 20).map(|h| start + Duration::hours(h)).collect();
        assert_eq!(
            names(&auto_seasonalities(&hourly)),
            vec!["weekly", "daily"]
        );
    }

    #[test]
    fn test_weekly_features_repeat() {
        let weekly = Seasonality::new("weekly", 7.0, 3);
        let dates = daily(8);
        let first = weekly.features(dates[0]);
        let next_week = weekly.features(dates[7]);
        assert_eq!(first.len(), weekly.width());
        for (a, b) in first.iter().zip(next_week.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }
}
