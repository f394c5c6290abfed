use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Cannot multiply a {lhs_width}x{lhs_height} matrix by a {rhs_width}x{rhs_height} matrix: inner dimensions differ")]
    DimensionMismatch {
        lhs_width: usize,
        lhs_height: usize,
        rhs_width: usize,
        rhs_height: usize,
    },

    #[error("Matrix must be square, got {width}x{height}")]
    NotSquare { width: usize, height: usize },

    #[error("Variable `{name}` is not bound in the environment")]
    UnboundVariable { name: String },

    #[error("Storage of variable `{name}` does not fit its lens: {source}")]
    StorageMismatch {
        name: String,
        #[source]
        source: LensError,
    },

    #[error("Operation `{name}` returned {actual} partial derivatives for {expected} inputs")]
    DerivativeArity {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Failure of a lens to address a cell of the storage it was given.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LensError {
    #[error("expected a {expected}, found a {found}")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },

    #[error("expected a {expected_width}x{expected_height} matrix, found {width}x{height}")]
    WrongShape {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    #[error("cell ({row}, {col}) is out of range")]
    OutOfRange { row: usize, col: usize },
}

impl GraphError {
    pub fn storage_mismatch(name: impl Into<String>, source: LensError) -> Self {
        GraphError::StorageMismatch {
            name: name.into(),
            source,
        }
    }
}
