//! Shared builders for synthetic order datasets.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use supplysight::dataset::{Dataset, OrderRecord};

pub fn base_date() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2017, 1, 1)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

#[allow(clippy::too_many_arguments)]
pub fn order(
    id: i64,
    date: NaiveDateTime,
    category: &str,
    department: &str,
    region: &str,
    quantity: f64,
    revenue: f64,
    late: bool,
) -> OrderRecord {
    OrderRecord {
        order_id: id,
        order_date: date,
        shipping_date: None,
        product_category: category.to_string(),
        product_name: format!("{category} Item {}", id % 4),
        region: region.to_string(),
        sub_region: None,
        customer_segment: "Consumer".to_string(),
        shipping_mode: "Standard Class".to_string(),
        order_status: "COMPLETE".to_string(),
        delivery_status: None,
        late_delivery: late,
        quantity,
        unit_price: if quantity > 0.0 { revenue / quantity } else { 0.0 },
        revenue,
        profit: Some(revenue * 0.12),
        benefit: None,
        total_price: None,
        actual_shipping_days: if late { 6.0 } else { 4.0 },
        scheduled_shipping_days: 4.0,
        discount_percent: 0.05,
        profit_margin: Some(0.12),
        department: Some(department.to_string()),
        latitude: None,
        longitude: None,
        payment_type: None,
        order_year: 0,
        order_month: 0,
        order_quarter: 0,
        order_day_of_week: 0,
        delivery_delay_days: 0.0,
    }
}

/// One order per day per category with weekly seasonality and a mild
/// trend, enough history to train the forecaster.
pub fn seasonal_dataset(days: usize) -> Dataset {
    let start = base_date();
    let mut records = Vec::new();
    for day in 0..days {
        let date = start + Duration::days(day as i64);
        let weekly = [8.0, 6.0, 5.0, 5.0, 7.0, 12.0, 14.0][day % 7];
        let demand = weekly + day as f64 * 0.02;
        records.push(order(
            day as i64,
            date,
            "Cleats",
            "Fan Shop",
            "Europe",
            demand,
            demand * 25.0,
            day % 4 == 0,
        ));
        records.push(order(
            (day + 10_000) as i64,
            date,
            "Books",
            "Book Shop",
            "LATAM",
            3.0,
            36.0,
            day % 2 == 0,
        ));
    }
    Dataset::from_records(records)
}

/// `n` identical on-time orders with the given revenue.
pub fn uniform_dataset(n: usize, revenue: f64) -> Dataset {
    let records = (0..n)
        .map(|i| {
            order(
                i as i64,
                base_date() + Duration::days((i % 30) as i64),
                "Cleats",
                "Fan Shop",
                "Europe",
                2.0,
                revenue,
                false,
            )
        })
        .collect();
    Dataset::from_records(records)
}
