use std::{collections::BTreeSet, fmt};

use thiserror::Error;

use super::table::Table;

/// Name of the column computed by the transform stage.
pub const REVENUE: &str = "revenue";

const INPUT_COLUMNS: &[&str] = &[
    "order_id",
    "order_date",
    "customer_id",
    "product",
    "quantity",
    "price",
];

const OUTPUT_COLUMNS: &[&str] = &[
    "order_id",
    "order_date",
    "customer_id",
    "product",
    "quantity",
    "price",
    REVENUE,
];

/// Pipeline boundary at which a [`SchemaContract`] is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Extract,
    Load,
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extract => f.write_str("extract"),
            Self::Load => f.write_str("load"),
        }
    }
}

/// Minimal set of columns a table must carry when it crosses a boundary.
/// Extra columns are tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaContract {
    boundary: Boundary,
    required: &'static [&'static str],
}

impl SchemaContract {
    pub const INPUT: Self = Self {
        boundary: Boundary::Extract,
        required: INPUT_COLUMNS,
    };

    pub const OUTPUT: Self = Self {
        boundary: Boundary::Load,
        required: OUTPUT_COLUMNS,
    };

    pub fn boundary(&self) -> Boundary {
        self.boundary
    }

    pub fn required(&self) -> &'static [&'static str] {
        self.required
    }

    pub fn check(&self, table: &Table) -> Result<(), SchemaMismatch> {
        let observed = table.column_set();
        let missing: BTreeSet<String> = self
            .required
            .iter()
            .filter(|column| !observed.contains(*column))
            .map(|column| column.to_string())
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        Err(SchemaMismatch {
            boundary: self.boundary,
            expected: self.required.iter().map(|c| c.to_string()).collect(),
            observed: observed.into_iter().map(str::to_owned).collect(),
            missing,
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{boundary} schema mismatch: missing {missing:?}, expected {expected:?}, got {observed:?}")]
pub struct SchemaMismatch {
    pub boundary: Boundary,
    pub expected: BTreeSet<String>,
    pub observed: BTreeSet<String>,
    pub missing: BTreeSet<String>,
}
