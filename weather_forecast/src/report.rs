//! CSV export and forecast charts

use crate::error::{ForecastError, Result};
use crate::forecasting::{ForecastRow, ForecastTable};
use chrono::{Duration, NaiveDateTime};
use plotters::prelude::*;
use polars::prelude::{CsvWriter, SerWriter};
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Default file name of the full forecast chart
pub const HISTORY_CHART: &str = "Historical and Future Forecast.png";
/// Default file name of the horizon chart
pub const HORIZON_CHART: &str = "Next 7 days Forecast.png";

const SECONDS_PER_DAY: f64 = 86_400.0;

const LINE: RGBColor = RGBColor(0, 191, 255);
const BAND: RGBColor = RGBColor(30, 144, 255);
const GRID: RGBColor = RGBColor(211, 211, 211);

/// Write every forecast column to a CSV file, replacing any existing file
pub fn export_csv<P: AsRef<Path>>(table: &ForecastTable, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut df = table.to_dataframe()?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).has_header(true).finish(&mut df)?;

    info!(path = %path.display(), rows = df.height(), "exported forecast");
    Ok(())
}

/// Chart the whole forecast, history and future
pub fn plot_forecast<P: AsRef<Path>>(table: &ForecastTable, path: P) -> Result<()> {
    let style = ChartStyle {
        title: "Forecast : Historic & Future 7 Days".to_string(),
        size: (1000, 500),
        markers: false,
    };
    render(table.rows(), path.as_ref(), &style)
}

/// Chart the forecast horizon with a marker per point
pub fn plot_horizon<P: AsRef<Path>>(rows: &[ForecastRow], path: P) -> Result<()> {
    let style = ChartStyle {
        title: format!("Next {} Days Temperature Forecast", rows.len()),
        size: (1200, 600),
        markers: true,
    };
    render(rows, path.as_ref(), &style)
}

struct ChartStyle {
    title: String,
    size: (u32, u32),
    markers: bool,
}

fn plot_error<E: std::fmt::Display>(err: E) -> ForecastError {
    ForecastError::PlotError(err.to_string())
}

/// Value range padded by 5% on each side
fn padded_range(low: f64, high: f64) -> (f64, f64) {
    if high > low {
        let pad = (high - low) * 0.05;
        (low - pad, high + pad)
    } else {
        (low - 1.0, high + 1.0)
    }
}

fn render(rows: &[ForecastRow], path: &Path, style: &ChartStyle) -> Result<()> {
    let (first, last) = match (rows.first(), rows.last()) {
        (Some(first), Some(last)) => (first.ds, last.ds),
        _ => {
            return Err(ForecastError::PlotError(format!(
                "Nothing to plot for {}",
                path.display()
            )))
        }
    };

    let day = |ds: NaiveDateTime| (ds - first).num_seconds() as f64 / SECONDS_PER_DAY;
    let (x_low, x_high) = padded_range(0.0, day(last));
    let low = rows.iter().map(|r| r.yhat_lower).fold(f64::INFINITY, f64::min);
    let high = rows.iter().map(|r| r.yhat_upper).fold(f64::NEG_INFINITY, f64::max);
    if !low.is_finite() || !high.is_finite() {
        return Err(ForecastError::PlotError(
            "Forecast bounds are not finite".to_string(),
        ));
    }
    let (y_low, y_high) = padded_range(low, high);

    let root = BitMapBackend::new(path, style.size).into_drawing_area();
    root.fill(&BLACK).map_err(plot_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(&style.title, ("sans-serif", 22).into_font().color(&WHITE))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d(x_low..x_high, y_low..y_high)
        .map_err(plot_error)?;

    let date_label = |x: &f64| {
        (first + Duration::seconds((x * SECONDS_PER_DAY).round() as i64))
            .format("%Y-%m-%d")
            .to_string()
    };
    chart
        .configure_mesh()
        .light_line_style(GRID.mix(0.15).stroke_width(1))
        .bold_line_style(GRID.mix(0.4).stroke_width(1))
        .axis_style(GRID.stroke_width(1))
        .label_style(("sans-serif", 13).into_font().color(&GRID))
        .axis_desc_style(("sans-serif", 15).into_font().color(&WHITE))
        .x_labels(8)
        .x_label_formatter(&date_label)
        .x_desc("Date")
        .y_desc("Temperature in (°C)")
        .draw()
        .map_err(plot_error)?;

    let mut band: Vec<(f64, f64)> = rows.iter().map(|r| (day(r.ds), r.yhat_upper)).collect();
    band.extend(rows.iter().rev().map(|r| (day(r.ds), r.yhat_lower)));
    chart
        .draw_series(std::iter::once(Polygon::new(band, BAND.mix(0.3).filled())))
        .map_err(plot_error)?
        .label("Confidence Interval")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], BAND.mix(0.3).filled()));

    chart
        .draw_series(LineSeries::new(
            rows.iter().map(|r| (day(r.ds), r.yhat)),
            LINE.stroke_width(2),
        ))
        .map_err(plot_error)?
        .label("Predicted Temperature")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], LINE.stroke_width(2)));

    if style.markers {
        chart
            .draw_series(
                rows.iter()
                    .map(|r| Circle::new((day(r.ds), r.yhat), 4, LINE.filled())),
            )
            .map_err(plot_error)?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(BLACK.mix(0.8).filled())
        .border_style(GRID.stroke_width(1))
        .label_font(("sans-serif", 13).into_font().color(&WHITE))
        .draw()
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    info!(path = %path.display(), "saved chart");
    Ok(())
}
