use crate::{
    error::LensError,
    storage::{Matrix, Storage},
};

/// An accessor binding a leaf node to one position inside a variable's storage.
///
/// Many leaves may share one variable name, each addressing a different cell
/// of the same storage through its own lens. The evaluator attaches the
/// variable name to any [`LensError`].
pub trait Lens: std::fmt::Debug {
    /// A zero-filled storage of the shape this lens expects.
    fn init(&self) -> Storage;
    fn get(&self, storage: &Storage) -> Result<f64, LensError>;
    fn set(&self, storage: &mut Storage, value: f64) -> Result<(), LensError>;
}

fn kind(storage: &Storage) -> &'static str {
    match storage {
        Storage::Scalar(_) => "scalar",
        Storage::Matrix(_) => "matrix",
    }
}

/// The identity lens over a single number.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScalarLens;

impl Lens for ScalarLens {
    fn init(&self) -> Storage {
        Storage::Scalar(0.)
    }

    fn get(&self, storage: &Storage) -> Result<f64, LensError> {
        storage.as_scalar().ok_or(LensError::WrongKind {
            expected: "scalar",
            found: kind(storage),
        })
    }

    fn set(&self, storage: &mut Storage, value: f64) -> Result<(), LensError> {
        match storage {
            Storage::Scalar(val) => {
                *val = value;
                Ok(())
            }
            Storage::Matrix(_) => Err(LensError::WrongKind {
                expected: "scalar",
                found: "matrix",
            }),
        }
    }
}

/// A lens addressing one cell of a `width` x `height` matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellLens {
    pub row: usize,
    pub col: usize,
    pub width: usize,
    pub height: usize,
}

impl CellLens {
    fn matrix_mut<'s>(&self, storage: &'s mut Storage) -> Result<&'s mut Matrix, LensError> {
        match storage {
            Storage::Matrix(mat) => {
                self.check_shape(mat)?;
                Ok(mat)
            }
            Storage::Scalar(_) => Err(LensError::WrongKind {
                expected: "matrix",
                found: "scalar",
            }),
        }
    }

    fn check_shape(&self, mat: &Matrix) -> Result<(), LensError> {
        if mat.width() != self.width || mat.height() != self.height {
            return Err(LensError::WrongShape {
                expected_width: self.width,
                expected_height: self.height,
                width: mat.width(),
                height: mat.height(),
            });
        }
        Ok(())
    }

    fn out_of_range(&self) -> LensError {
        LensError::OutOfRange {
            row: self.row,
            col: self.col,
        }
    }
}

impl Lens for CellLens {
    fn init(&self) -> Storage {
        Storage::Matrix(Matrix::zeros(self.width, self.height))
    }

    fn get(&self, storage: &Storage) -> Result<f64, LensError> {
        let mat = storage.as_matrix().ok_or(LensError::WrongKind {
            expected: "matrix",
            found: kind(storage),
        })?;
        self.check_shape(mat)?;
        mat.get(self.row, self.col)
            .ok_or_else(|| self.out_of_range())
    }

    fn set(&self, storage: &mut Storage, value: f64) -> Result<(), LensError> {
        let cell = self
            .matrix_mut(storage)?
            .get_mut(self.row, self.col)
            .ok_or_else(|| self.out_of_range())?;
        *cell = value;
        Ok(())
    }
}

#[test]
fn test_scalar_lens() {
    let mut storage = ScalarLens.init();
    assert_eq!(ScalarLens.get(&storage), Ok(0.));
    ScalarLens.set(&mut storage, 42.).unwrap();
    assert_eq!(storage, Storage::Scalar(42.));
    assert_eq!(
        ScalarLens.get(&Storage::Matrix(Matrix::zeros(1, 1))),
        Err(LensError::WrongKind {
            expected: "scalar",
            found: "matrix"
        })
    );
}

#[test]
fn test_cell_lens() {
    let lens = CellLens {
        row: 2,
        col: 1,
        width: 2,
        height: 3,
    };
    let mut storage = lens.init();
    lens.set(&mut storage, 7.).unwrap();
    let mat = storage.as_matrix().unwrap();
    assert_eq!(mat.get(2, 1), Some(7.));
    assert_eq!(mat.iter().sum::<f64>(), 7.);
    assert_eq!(lens.get(&storage), Ok(7.));

    let wrong = Storage::Matrix(Matrix::zeros(3, 2));
    assert_eq!(
        lens.get(&wrong),
        Err(LensError::WrongShape {
            expected_width: 2,
            expected_height: 3,
            width: 3,
            height: 2,
        })
    );
    assert!(matches!(
        lens.get(&Storage::Scalar(1.)),
        Err(LensError::WrongKind { .. })
    ));

    let outside = CellLens { row: 3, ..lens };
    assert_eq!(
        outside.set(&mut storage, 1.),
        Err(LensError::OutOfRange { row: 3, col: 1 })
    );
}
