use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("column {name:?} appears more than once in the header")]
    DuplicateColumn { name: String },
    #[error("row {row} has {found} fields but the header has {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
