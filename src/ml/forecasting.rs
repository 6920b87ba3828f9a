/*!
 * # Demand Forecasting
 *
 * Gradient-boosted regression over engineered time-series features:
 * calendar signals, demand lags, and rolling statistics over the daily
 * demand series. Multi-step forecasts are produced iteratively, feeding
 * each prediction back into the lag window for the next day; forecast
 * error can therefore compound over the horizon, which is the accepted
 * trade-off of this strategy.
 */

use crate::dataset::{DailyDemand, Dataset};
use crate::errors::ServiceError;
use crate::ml::gbdt::{GbdtParams, GbdtRegressor};
use crate::ml::metrics::{self, RegressionMetrics};
use chrono::{Datelike, Duration, NaiveDate};
use dashmap::DashMap;
use serde::Serialize;
use std::f64::consts::PI;
use std::sync::Arc;
use tracing::info;

pub const LAGS: [usize; 4] = [1, 7, 14, 28];
pub const WINDOWS: [usize; 3] = [7, 14, 30];

/// Minimum post-lag daily rows required to train. Below this the 80/20
/// chronological split leaves too little held-out data to report metrics.
pub const MIN_TRAIN_ROWS: usize = 40;

/// Demand values carried into the iterative forecast as the lag window.
const FEEDBACK_WINDOW: usize = 30;

const TEST_FRACTION: f64 = 0.2;

/// Cache key for the unfiltered (all categories) model.
const ALL_CATEGORIES_KEY: &str = "__all__";

/// One forecast day.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted_demand: f64,
}

/// Training outcome: held-out metrics plus the held-out tail itself.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastTraining {
    pub metrics: RegressionMetrics,
    pub actuals: Vec<f64>,
    pub predictions: Vec<f64>,
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug)]
struct FittedForecast {
    model: GbdtRegressor,
    feature_names: Vec<String>,
    training: ForecastTraining,
}

fn cache_key(category: Option<&str>) -> String {
    category.unwrap_or(ALL_CATEGORIES_KEY).to_string()
}

fn calendar_feature_names() -> Vec<String> {
    [
        "year",
        "month",
        "quarter",
        "day_of_week",
        "day_of_year",
        "week_of_year",
        "is_weekend",
        "is_month_start",
        "is_month_end",
        "is_quarter_start",
        "month_sin",
        "month_cos",
        "dow_sin",
        "dow_cos",
        "is_holiday_season",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn push_calendar_features(date: NaiveDate, row: &mut Vec<f64>) {
    let month = date.month() as f64;
    let dow = date.weekday().num_days_from_monday() as f64;
    let next_day = date + Duration::days(1);

    row.push(date.year() as f64);
    row.push(month);
    row.push(((date.month() - 1) / 3 + 1) as f64);
    row.push(dow);
    row.push(date.ordinal() as f64);
    row.push(date.iso_week().week() as f64);
    row.push(flag(dow >= 5.0));
    row.push(flag(date.day() == 1));
    row.push(flag(next_day.month() != date.month()));
    row.push(flag(date.day() == 1 && matches!(date.month(), 1 | 4 | 7 | 10)));
    row.push((2.0 * PI * month / 12.0).sin());
    row.push((2.0 * PI * month / 12.0).cos());
    row.push((2.0 * PI * dow / 7.0).sin());
    row.push((2.0 * PI * dow / 7.0).cos());
    row.push(flag(date.month() == 11 || date.month() == 12));
}

fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

fn feature_names() -> Vec<String> {
    let mut names: Vec<String> = vec![
        "revenue".to_string(),
        "num_orders".to_string(),
        "avg_price".to_string(),
        "avg_discount".to_string(),
    ];
    for lag in LAGS {
        names.push(format!("demand_lag_{lag}"));
    }
    for window in WINDOWS {
        names.push(format!("demand_rolling_mean_{window}"));
        names.push(format!("demand_rolling_std_{window}"));
    }
    names.extend(calendar_feature_names());
    names
}

/// Feature matrix, target vector, and dates from the daily series. Rows
/// without full lag history (the first `max(LAGS)` days) are dropped.
fn prepare(series: &[DailyDemand]) -> (Vec<Vec<f64>>, Vec<f64>, Vec<NaiveDate>) {
    let max_lag = *LAGS.iter().max().unwrap_or(&0);
    let demands: Vec<f64> = series.iter().map(|d| d.demand).collect();

    let mut rows = Vec::new();
    let mut targets = Vec::new();
    let mut dates = Vec::new();

    for i in max_lag..series.len() {
        let day = &series[i];
        let mut row = vec![day.revenue, day.num_orders, day.avg_price, day.avg_discount];
        for lag in LAGS {
            row.push(demands[i - lag]);
        }
        for window in WINDOWS {
            let start = i.saturating_sub(window - 1);
            let slice = &demands[start..=i];
            row.push(metrics::mean(slice));
            row.push(metrics::sample_std(slice));
        }
        push_calendar_features(day.date, &mut row);

        rows.push(row);
        targets.push(day.demand);
        dates.push(day.date);
    }

    (rows, targets, dates)
}

/// Demand forecasting engine with a per-category model cache.
pub struct DemandForecaster {
    params: GbdtParams,
    models: DashMap<String, Arc<FittedForecast>>,
}

impl DemandForecaster {
    pub fn new() -> Self {
        Self::with_params(GbdtParams::default())
    }

    pub fn with_params(params: GbdtParams) -> Self {
        Self {
            params,
            models: DashMap::new(),
        }
    }

    pub fn is_trained(&self, category: Option<&str>) -> bool {
        self.models.contains_key(&cache_key(category))
    }

    pub fn clear_cache(&self) {
        self.models.clear();
    }

    /// Train on the daily demand series, chronologically split 80/20.
    /// When a model for the same category key is already cached, that model
    /// and its original held-out report are returned without refitting;
    /// [`Self::clear_cache`] forces a refit on new data.
    pub fn train(
        &self,
        dataset: &Dataset,
        category: Option<&str>,
    ) -> Result<ForecastTraining, ServiceError> {
        if let Some(fitted) = self.models.get(&cache_key(category)) {
            return Ok(fitted.training.clone());
        }

        let series = dataset.daily_demand(category);
        let (rows, targets, dates) = prepare(&series);

        if rows.len() < MIN_TRAIN_ROWS {
            return Err(ServiceError::InsufficientData(format!(
                "{} daily rows after lag features; at least {} required",
                rows.len(),
                MIN_TRAIN_ROWS
            )));
        }

        // Time series: keep order, hold out the tail.
        let n_test = ((rows.len() as f64 * TEST_FRACTION).ceil() as usize).max(1);
        let split = rows.len() - n_test;

        let model = GbdtRegressor::fit(&rows[..split], &targets[..split], self.params.clone());
        let predictions = model.predict_batch(&rows[split..]);
        let actuals = targets[split..].to_vec();
        let report_metrics = metrics::regression_metrics(&actuals, &predictions);

        info!(
            category = category.unwrap_or("all"),
            train_rows = split,
            test_rows = n_test,
            mae = report_metrics.mae,
            rmse = report_metrics.rmse,
            "demand forecaster trained"
        );

        let training = ForecastTraining {
            metrics: report_metrics,
            actuals,
            predictions,
            dates: dates[split..].to_vec(),
        };
        self.models.insert(
            cache_key(category),
            Arc::new(FittedForecast {
                model,
                feature_names: feature_names(),
                training: training.clone(),
            }),
        );

        Ok(training)
    }

    /// Iterative multi-step forecast starting the day after the last
    /// observed date. Each prediction is appended to the demand tail so
    /// later days see it through their lag and rolling features.
    pub fn forecast_future(
        &self,
        dataset: &Dataset,
        horizon_days: u32,
        category: Option<&str>,
    ) -> Result<Vec<ForecastPoint>, ServiceError> {
        let fitted = self
            .models
            .get(&cache_key(category))
            .map(|entry| Arc::clone(&entry))
            .ok_or_else(|| {
                ServiceError::ModelNotTrained(format!(
                    "no demand model for category '{}'",
                    category.unwrap_or("all")
                ))
            })?;

        let series = dataset.daily_demand(category);
        let last = series.last().ok_or_else(|| {
            ServiceError::InsufficientData("daily demand series is empty".to_string())
        })?;
        let last_date = last.date;

        let mut tail: Vec<f64> = series
            .iter()
            .rev()
            .take(FEEDBACK_WINDOW)
            .rev()
            .map(|d| d.demand)
            .collect();

        let mut forecasts = Vec::with_capacity(horizon_days as usize);
        for offset in 1..=i64::from(horizon_days) {
            let date = last_date + Duration::days(offset);

            // Non-demand numerics are frozen at their last observed value.
            let mut row = vec![last.revenue, last.num_orders, last.avg_price, last.avg_discount];
            for lag in LAGS {
                let value = if tail.len() >= lag {
                    tail[tail.len() - lag]
                } else {
                    tail.first().copied().unwrap_or(0.0)
                };
                row.push(value);
            }
            for window in WINDOWS {
                let start = tail.len().saturating_sub(window);
                let slice = &tail[start..];
                row.push(metrics::mean(slice));
                row.push(if slice.len() > 1 {
                    metrics::population_std(slice)
                } else {
                    0.0
                });
            }
            push_calendar_features(date, &mut row);

            // Demand cannot be negative.
            let predicted = fitted.model.predict(&row).max(0.0);
            forecasts.push(ForecastPoint {
                date,
                predicted_demand: predicted,
            });
            tail.push(predicted);
        }

        Ok(forecasts)
    }

    /// Ranked (feature, importance) pairs from the cached model; empty
    /// when untrained.
    pub fn feature_importance(&self, top_n: usize, category: Option<&str>) -> Vec<(String, f64)> {
        let Some(fitted) = self.models.get(&cache_key(category)) else {
            return Vec::new();
        };
        let mut pairs: Vec<(String, f64)> = fitted
            .feature_names
            .iter()
            .cloned()
            .zip(fitted.model.feature_importances())
            .collect();
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        pairs.truncate(top_n);
        pairs
    }
}

impl Default for DemandForecaster {
    fn default() -> Self {
        Self::new()
    }
}
