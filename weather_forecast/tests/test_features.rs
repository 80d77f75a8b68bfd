use approx::assert_relative_eq;
use std::io::Write;
use weather_forecast::ForecastError;
use tempfile::NamedTempFile;
use weather_forecast::{Covariate, DataLoader, FeatureEngineer};

fn create_weather_data() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "ds,temperature_celsius,humidity").unwrap();
    writeln!(file, "2023-03-01,12.0,").unwrap();
    writeln!(file, "2023-03-02,14.0,65").unwrap();
    writeln!(file, "2023-03-03,,70").unwrap();
    writeln!(file, "2023-03-04,13.0,75").unwrap();
    writeln!(file, "2023-03-05,15.0,68").unwrap();
    writeln!(file, "2023-03-06,16.0,").unwrap();
    file
}

#[test]
fn test_features_from_csv_have_no_gaps() {
    let file = create_weather_data();
    let observations = DataLoader::from_csv(file.path()).unwrap();
    let features = FeatureEngineer::default().transform(&observations).unwrap();

    assert_eq!(features.len(), 6);
    for covariate in Covariate::ALL {
        let column = features.column(covariate);
        assert_eq!(column.len(), 6);
        assert!(column.iter().all(|v| v.is_finite()), "{} has gaps", covariate);
    }
    assert!(features.targets().iter().all(|v| v.is_finite()));
}

#[test]
fn test_humidity_lag_and_fill() {
    let file = create_weather_data();
    let observations = DataLoader::from_csv(file.path()).unwrap();
    let features = FeatureEngineer::default().transform(&observations).unwrap();

    // leading gap back-filled, trailing gap forward-filled
    assert_eq!(
        features.column(Covariate::Humidity),
        vec![65.0, 65.0, 70.0, 75.0, 68.0, 68.0]
    );
    // first two lags are missing and back-filled from the third
    assert_eq!(
        features.column(Covariate::HumidityLag1),
        vec![65.0, 65.0, 65.0, 70.0, 75.0, 68.0]
    );
}

#[test]
fn test_smoothed_target_skips_missing_rows() {
    let file = create_weather_data();
    let observations = DataLoader::from_csv(file.path()).unwrap();
    let features = FeatureEngineer::default().transform(&observations).unwrap();
    let y = features.targets();

    // alpha = 2 / (span + 1) = 1/3
    assert_relative_eq!(y[0], 12.0);
    assert_relative_eq!(y[1], 12.0 + (14.0 - 12.0) / 3.0, epsilon = 1e-12);
    // the missing row carries the last smoothed value
    assert_relative_eq!(y[2], y[1]);
    // and the carried value has decayed to weight 4/9 against 1/3
    assert_relative_eq!(
        y[3],
        (4.0 / 9.0 * y[2] + 13.0 / 3.0) / (4.0 / 9.0 + 1.0 / 3.0),
        epsilon = 1e-12
    );
    assert!(y[5] > y[4]);
}

#[test]
fn test_custom_span() {
    let file = create_weather_data();
    let observations = DataLoader::from_csv(file.path()).unwrap();
    let engineer = FeatureEngineer::new().with_span(1.0).unwrap();
    let features = engineer.transform(&observations).unwrap();

    // span 1 leaves the observed values untouched
    assert_eq!(features.targets()[4], 15.0);
}

fn temperature_csv(temperatures: &[Option<f64>]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "ds,y,humidity").unwrap();
    for (day, temperature) in temperatures.iter().enumerate() {
        let value = temperature.map(|t| t.to_string()).unwrap_or_default();
        writeln!(file, "2023-04-{:02},{},{}", day + 1, value, 60 + day).unwrap();
    }
    file
}

#[test]
fn test_gap_handling_matches_recursive_ewm() {
    let file = temperature_csv(&[Some(10.0), None, Some(16.0), Some(12.0), Some(14.0), Some(13.0)]);
    let observations = DataLoader::from_csv(file.path()).unwrap();
    let features = FeatureEngineer::default().transform(&observations).unwrap();

    let expected_y = [
        10.0,
        10.0,
        88.0 / 7.0,
        260.0 / 21.0,
        814.0 / 63.0,
        2447.0 / 189.0,
    ];
    for (actual, expected) in features.targets().iter().zip(expected_y) {
        assert_relative_eq!(*actual, expected, epsilon = 1e-9);
    }

    let rolling = features.column(Covariate::TempRolling3);
    // first full window at the third row, back-filled to the first two
    for value in &rolling[..3] {
        assert_relative_eq!(*value, 76.0 / 7.0, epsilon = 1e-9);
    }
    assert_relative_eq!(rolling[3], 734.0 / 63.0, epsilon = 1e-9);
}

#[test]
fn test_short_series_with_gap() {
    for temperatures in [
        vec![Some(10.0), None, Some(16.0)],
        vec![Some(10.0), None, Some(16.0), Some(12.0)],
    ] {
        let file = temperature_csv(&temperatures);
        let observations = DataLoader::from_csv(file.path()).unwrap();
        let features = FeatureEngineer::default().transform(&observations).unwrap();

        assert_eq!(features.len(), temperatures.len());
        assert_relative_eq!(features.targets()[2], 88.0 / 7.0, epsilon = 1e-9);
        assert_relative_eq!(
            features.column(Covariate::TempRolling3)[0],
            76.0 / 7.0,
            epsilon = 1e-9
        );
    }
}

#[test]
fn test_too_short_for_rolling_window() {
    let file = temperature_csv(&[Some(10.0), Some(11.0)]);
    let observations = DataLoader::from_csv(file.path()).unwrap();
    assert!(matches!(
        FeatureEngineer::default().transform(&observations),
        Err(ForecastError::DataError(_))
    ));
}

#[test]
fn test_smoothed_values_stay_between_previous_and_raw() {
    let raw: Vec<Option<f64>> = (0..30)
        .map(|d| {
            if d % 7 == 3 {
                None
            } else {
                Some(15.0 + 6.0 * (d as f64 / 3.0).sin() + (d % 5) as f64)
            }
        })
        .collect();
    let file = temperature_csv(&raw);
    let observations = DataLoader::from_csv(file.path()).unwrap();
    let y = FeatureEngineer::default().transform(&observations).unwrap().targets();

    for i in 1..raw.len() {
        match raw[i] {
            Some(x) => {
                let (low, high) = if x < y[i - 1] { (x, y[i - 1]) } else { (y[i - 1], x) };
                assert!(
                    y[i] >= low - 1e-12 && y[i] <= high + 1e-12,
                    "row {}: {} outside [{}, {}]",
                    i,
                    y[i],
                    low,
                    high
                );
            }
            None => assert_eq!(y[i], y[i - 1]),
        }
    }
}
