//! CSV ingestion for the external order dataset.
//!
//! The source ships with vendor column names; a static name table remaps
//! them to the internal schema. Rows missing an order date or revenue
//! after coercion are dropped, and the drop count is logged.

use super::{Dataset, OrderRecord};
use crate::errors::ServiceError;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// External header -> internal field name.
const COLUMN_MAP: &[(&str, &str)] = &[
    ("order date (DateOrders)", "order_date"),
    ("shipping date (DateOrders)", "shipping_date"),
    ("Category Name", "product_category"),
    ("Product Name", "product_name"),
    ("Market", "region"),
    ("Order Region", "sub_region"),
    ("Customer Segment", "customer_segment"),
    ("Shipping Mode", "shipping_mode"),
    ("Order Status", "order_status"),
    ("Delivery Status", "delivery_status"),
    ("Late_delivery_risk", "late_delivery"),
    ("Order Item Quantity", "quantity"),
    ("Product Price", "unit_price"),
    ("Sales", "revenue"),
    ("Order Profit Per Order", "profit"),
    ("Benefit per order", "benefit"),
    ("Order Item Total", "total_price"),
    ("Days for shipping (real)", "actual_shipping_days"),
    ("Days for shipment (scheduled)", "scheduled_shipping_days"),
    ("Order Item Discount Rate", "discount_percent"),
    ("Order Item Profit Ratio", "profit_margin"),
    ("Order Id", "order_id"),
    ("Department Name", "department"),
    ("Latitude", "latitude"),
    ("Longitude", "longitude"),
    ("Type", "payment_type"),
];

const DATE_FORMATS: &[&str] = &["%m/%d/%Y %H:%M", "%Y-%m-%d %H:%M:%S", "%m/%d/%Y", "%Y-%m-%d"];

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn parse_f64(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok()
}

struct Row<'a> {
    columns: &'a HashMap<String, usize>,
    record: &'a csv::ByteRecord,
}

impl Row<'_> {
    fn text(&self, field: &str) -> Option<String> {
        let idx = *self.columns.get(field)?;
        let raw = self.record.get(idx)?;
        // Source files are latin-1; lossy conversion keeps every row usable.
        let s = String::from_utf8_lossy(raw).trim().to_string();
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }

    fn number(&self, field: &str) -> Option<f64> {
        self.text(field).as_deref().and_then(parse_f64)
    }

    fn datetime(&self, field: &str) -> Option<NaiveDateTime> {
        self.text(field).as_deref().and_then(parse_datetime)
    }
}

/// Load the order dataset from a CSV file.
pub fn load_csv(path: &Path) -> Result<Dataset, ServiceError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

    let header_to_field: HashMap<&str, &str> = COLUMN_MAP.iter().copied().collect();
    let mut columns: HashMap<String, usize> = HashMap::new();
    for (idx, header) in reader.byte_headers()?.iter().enumerate() {
        let name = String::from_utf8_lossy(header).trim().to_string();
        if let Some(field) = header_to_field.get(name.as_str()) {
            columns.insert((*field).to_string(), idx);
        }
    }

    for required in ["order_date", "revenue"] {
        if !columns.contains_key(required) {
            return Err(ServiceError::DataError(format!(
                "required column '{}' missing from {}",
                required,
                path.display()
            )));
        }
    }

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for byte_record in reader.byte_records() {
        let byte_record = byte_record?;
        let row = Row {
            columns: &columns,
            record: &byte_record,
        };

        // Order date and revenue are the load-time invariants.
        let (order_date, revenue) = match (row.datetime("order_date"), row.number("revenue")) {
            (Some(d), Some(r)) => (d, r),
            _ => {
                dropped += 1;
                continue;
            }
        };

        records.push(OrderRecord {
            order_id: row.number("order_id").unwrap_or_default() as i64,
            order_date,
            shipping_date: row.datetime("shipping_date"),
            product_category: row.text("product_category").unwrap_or_default(),
            product_name: row.text("product_name").unwrap_or_default(),
            region: row.text("region").unwrap_or_default(),
            sub_region: row.text("sub_region"),
            customer_segment: row.text("customer_segment").unwrap_or_default(),
            shipping_mode: row.text("shipping_mode").unwrap_or_default(),
            order_status: row.text("order_status").unwrap_or_default(),
            delivery_status: row.text("delivery_status"),
            late_delivery: row.number("late_delivery").unwrap_or(0.0) > 0.5,
            quantity: row.number("quantity").unwrap_or(0.0),
            unit_price: row.number("unit_price").unwrap_or(0.0),
            revenue,
            profit: row.number("profit"),
            benefit: row.number("benefit"),
            total_price: row.number("total_price"),
            actual_shipping_days: row.number("actual_shipping_days").unwrap_or(0.0),
            scheduled_shipping_days: row.number("scheduled_shipping_days").unwrap_or(0.0),
            discount_percent: row.number("discount_percent").unwrap_or(0.0),
            profit_margin: row.number("profit_margin"),
            department: row.text("department"),
            latitude: row.number("latitude"),
            longitude: row.number("longitude"),
            payment_type: row.text("payment_type"),
            order_year: 0,
            order_month: 0,
            order_quarter: 0,
            order_day_of_week: 0,
            delivery_delay_days: 0.0,
        });
    }

    if dropped > 0 {
        warn!(dropped, "dropped rows missing order date or revenue");
    }

    let dataset = Dataset::from_records(records);
    info!(
        rows = dataset.len(),
        has_department = dataset.capabilities().has_department,
        "dataset loaded from {}",
        path.display()
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
Order Id,order date (DateOrders),Sales,Category Name,Market,Shipping Mode,Customer Segment,Order Status,Order Item Quantity,Product Price,Days for shipping (real),Days for shipment (scheduled),Order Item Discount Rate,Late_delivery_risk,Department Name,Product Name
1,1/15/2017 10:30,120.50,Cleats,Europe,Standard Class,Consumer,COMPLETE,2,60.25,5,4,0.1,1,Fan Shop,Cleat Pro
2,1/16/2017 11:00,80.00,Books,LATAM,First Class,Corporate,COMPLETE,1,80.00,2,2,0.0,0,Book Shop,Novel
3,,90.00,Books,LATAM,First Class,Corporate,COMPLETE,1,90.00,2,2,0.0,0,Book Shop,Novel
";

    #[test]
    fn loads_and_drops_invalid_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let ds = load_csv(file.path()).unwrap();
        // Third row has no order date and is dropped.
        assert_eq!(ds.len(), 2);

        let first = &ds.records()[0];
        assert_eq!(first.product_category, "Cleats");
        assert!(first.late_delivery);
        assert_eq!(first.order_year, 2017);
        assert!((first.delivery_delay_days - 1.0).abs() < 1e-9);
        assert!(ds.capabilities().has_department);
        assert!(!ds.capabilities().has_profit);
    }

    #[test]
    fn missing_required_column_is_a_data_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"Order Id,Category Name\n1,Cleats\n").unwrap();
        let err = load_csv(file.path()).unwrap_err();
        assert!(matches!(err, ServiceError::DataError(_)));
    }

    #[test]
    fn parses_multiple_date_formats() {
        assert!(parse_datetime("1/31/2018 22:56").is_some());
        assert!(parse_datetime("2018-01-31 22:56:00").is_some());
        assert!(parse_datetime("2018-01-31").is_some());
        assert!(parse_datetime("not a date").is_none());
    }
}
