use std::str::FromStr;

use chrono::NaiveDate;
use itertools::Itertools;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    config::{InvalidRows, TransformSettings},
    domain::{schema::REVENUE, Row, Table, Value},
};

const QUANTITY: &str = "quantity";
const PRICE: &str = "price";
const ORDER_DATE: &str = "order_date";

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£'];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("input table has no `{column}` column")]
    MissingColumn { column: &'static str },
    #[error("row {row}: `{column}` value {value:?} is not numeric")]
    NotNumeric {
        row: usize,
        column: &'static str,
        value: String,
    },
    #[error("row {row}: revenue overflows")]
    Overflow { row: usize },
    #[error(transparent)]
    Shape(#[from] crate::domain::error::Error),
}

/// Cleans the extracted table and derives `revenue = quantity * price`.
///
/// Cells are trimmed and blank cells become [`Value::Null`]. Exact duplicate
/// rows are dropped when configured to. `quantity` becomes an integer (or a
/// decimal when fractional), `price` a decimal after removing currency symbols
/// and separators, and ISO `order_date`s become dates. Rows whose quantity or
/// price cannot be coerced either abort the transform or are excluded,
/// according to [`InvalidRows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transformer {
    invalid_rows: InvalidRows,
    drop_duplicates: bool,
}

impl Default for Transformer {
    fn default() -> Self {
        Self::from(&TransformSettings::default())
    }
}

impl From<&TransformSettings> for Transformer {
    fn from(settings: &TransformSettings) -> Self {
        Self::new(settings.invalid_rows, settings.drop_duplicates)
    }
}

impl Transformer {
    pub fn new(invalid_rows: InvalidRows, drop_duplicates: bool) -> Self {
        Self {
            invalid_rows,
            drop_duplicates,
        }
    }

    #[tracing::instrument(name = "transform", skip_all)]
    pub fn transform(&self, table: &Table) -> Result<Table, TransformError> {
        info!(rows = table.height(), "starting data transformation");

        let quantity = column(table, QUANTITY)?;
        let price = column(table, PRICE)?;
        let order_date = table.position(ORDER_DATE);

        let mut columns = table.columns().to_vec();
        let revenue = table.position(REVENUE).unwrap_or_else(|| {
            columns.push(REVENUE.to_owned());
            columns.len() - 1
        });

        let cleaned = table
            .rows()
            .iter()
            .enumerate()
            .map(|(index, row)| (index + 1, row.iter().map(clean).collect::<Row>()));
        let cleaned: Vec<(usize, Row)> = if self.drop_duplicates {
            cleaned.unique_by(|(_, row)| row.clone()).collect()
        } else {
            cleaned.collect()
        };

        let duplicates = table.height() - cleaned.len();
        if duplicates > 0 {
            warn!(duplicates, "dropped duplicate rows");
        }

        let mut rows = Vec::with_capacity(cleaned.len());
        let mut invalid = 0;

        for (number, mut row) in cleaned {
            let derived = coerce(&mut row, number, quantity, price);
            let amount = match (derived, self.invalid_rows) {
                (Ok(amount), _) => amount,
                (Err(err), InvalidRows::Drop) => {
                    debug!(error = %err, "excluding row");
                    invalid += 1;
                    continue;
                }
                (Err(err), InvalidRows::Reject) => {
                    error!(error = %err, "row failed numeric coercion");
                    return Err(err);
                }
            };

            if let Some(position) = order_date {
                row[position] = parse_date(&row[position]);
            }

            if revenue < row.len() {
                row[revenue] = Value::Decimal(amount);
            } else {
                row.push(Value::Decimal(amount));
            }
            rows.push(row);
        }

        if invalid > 0 {
            warn!(
                excluded = invalid,
                "excluded rows with non-numeric quantity or price"
            );
        }

        let output = Table::new(columns, rows)?;
        info!(
            rows = output.height(),
            columns = output.width(),
            "data transformation completed"
        );
        Ok(output)
    }
}

/// Transform with the default policy: reject non-numeric rows and drop
/// duplicates.
pub fn transform(table: &Table) -> Result<Table, TransformError> {
    Transformer::default().transform(table)
}

fn column(table: &Table, column: &'static str) -> Result<usize, TransformError> {
    table.position(column).ok_or_else(|| {
        error!(column, "input table is missing a required column");
        TransformError::MissingColumn { column }
    })
}

fn clean(value: &Value) -> Value {
    match value {
        Value::Text(text) => match text.trim() {
            "" => Value::Null,
            trimmed => Value::text(trimmed),
        },
        other => other.clone(),
    }
}

/// Coerce `quantity` and `price` in place and return their product.
fn coerce(
    row: &mut Row,
    number: usize,
    quantity: usize,
    price: usize,
) -> Result<Decimal, TransformError> {
    let not_numeric = |column: &'static str, value: &Value| TransformError::NotNumeric {
        row: number,
        column,
        value: value.to_string(),
    };

    let parsed_quantity =
        parse_quantity(&row[quantity]).ok_or_else(|| not_numeric(QUANTITY, &row[quantity]))?;
    let parsed_price =
        parse_price(&row[price]).ok_or_else(|| not_numeric(PRICE, &row[price]))?;

    let amount = parsed_quantity
        .as_decimal()
        .and_then(|q| q.checked_mul(parsed_price))
        .ok_or(TransformError::Overflow { row: number })?;

    row[quantity] = parsed_quantity;
    row[price] = Value::Decimal(parsed_price);
    Ok(amount.normalize())
}

fn parse_quantity(value: &Value) -> Option<Value> {
    match value {
        Value::Text(text) => {
            let digits = strip_separators(text);
            match digits.parse::<i64>() {
                Ok(integer) => Some(Value::Integer(integer)),
                Err(_) => Decimal::from_str(&digits).ok().map(Value::Decimal),
            }
        }
        Value::Integer(_) | Value::Decimal(_) => Some(value.clone()),
        Value::Null | Value::Date(_) => None,
    }
}

fn parse_price(value: &Value) -> Option<Decimal> {
    match value {
        Value::Text(text) => {
            let digits = strip_separators(text.trim_start_matches(CURRENCY_SYMBOLS).trim());
            Decimal::from_str(&digits).ok()
        }
        _ => value.as_decimal(),
    }
}

/// `,` is always a thousands separator; `.` is the only decimal mark.
fn strip_separators(text: &str) -> String {
    text.replace(',', "")
}

fn parse_date(value: &Value) -> Value {
    let Value::Text(text) = value else {
        return value.clone();
    };

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .map_or_else(|| value.clone(), Value::Date)
}
