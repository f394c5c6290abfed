use std::collections::HashMap;
use std::fmt::Display;

/// A dense row-major block of numbers backing a structured variable.
///
/// `width` is the number of columns and `height` the number of rows, so a
/// `Matrix::zeros(2, 4)` has four rows of two cells each.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.; width * height],
        }
    }

    /// Build a matrix from a list of rows. Returns `None` if the rows are ragged.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Option<Self> {
        let height = rows.len();
        let width = rows.first().map(|row| row.as_ref().len()).unwrap_or(0);
        let mut data = Vec::with_capacity(width * height);
        for row in rows {
            let row = row.as_ref();
            if row.len() != width {
                return None;
            }
            data.extend_from_slice(row);
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.height && col < self.width {
            Some(self.data[row * self.width + col])
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut f64> {
        if row < self.height && col < self.width {
            Some(&mut self.data[row * self.width + col])
        } else {
            None
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks(self.width.max(1)).take(self.height)
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.data.iter()
    }
}

impl Display for Matrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, row) in self.rows().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{row:?}")?;
        }
        write!(f, "]")
    }
}

/// The physical shape of a variable's backing value.
#[derive(Clone, Debug, PartialEq)]
pub enum Storage {
    Scalar(f64),
    Matrix(Matrix),
}

impl Storage {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(val) => Some(*val),
            Self::Matrix(_) => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&Matrix> {
        match self {
            Self::Scalar(_) => None,
            Self::Matrix(mat) => Some(mat),
        }
    }
}

impl From<f64> for Storage {
    fn from(val: f64) -> Self {
        Self::Scalar(val)
    }
}

impl From<Matrix> for Storage {
    fn from(mat: Matrix) -> Self {
        Self::Matrix(mat)
    }
}

impl Display for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(val) => write!(f, "{val}"),
            Self::Matrix(mat) => write!(f, "{mat}"),
        }
    }
}

/// Named storage, used both as the evaluation environment and as the gradient map
/// returned by reverse mode.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Variables(HashMap<String, Storage>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scalar(mut self, name: impl Into<String>, val: f64) -> Self {
        self.insert(name, val);
        self
    }

    pub fn with_matrix(mut self, name: impl Into<String>, mat: Matrix) -> Self {
        self.insert(name, mat);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, val: impl Into<Storage>) -> Option<Storage> {
        self.0.insert(name.into(), val.into())
    }

    pub fn get(&self, name: &str) -> Option<&Storage> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Storage> {
        self.0.get_mut(name)
    }

    pub(crate) fn entry(
        &mut self,
        name: &str,
    ) -> std::collections::hash_map::Entry<'_, String, Storage> {
        self.0.entry(name.to_string())
    }

    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Storage::as_scalar)
    }

    pub fn matrix(&self, name: &str) -> Option<&Matrix> {
        self.get(name).and_then(Storage::as_matrix)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Storage)> {
        self.0.iter().map(|(name, val)| (name.as_str(), val))
    }
}

impl<S: Into<String>, V: Into<Storage>> FromIterator<(S, V)> for Variables {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, val)| (name.into(), val.into()))
                .collect(),
        )
    }
}

#[test]
fn test_matrix_from_rows() {
    let mat = Matrix::from_rows(&[[1., 2.], [3., 4.], [5., 6.]]).unwrap();
    assert_eq!(mat.width(), 2);
    assert_eq!(mat.height(), 3);
    assert_eq!(mat.get(2, 1), Some(6.));
    assert_eq!(mat.get(1, 2), None);
    assert_eq!(mat.to_string(), "[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]");
}

#[test]
fn test_matrix_ragged() {
    let rows: Vec<Vec<f64>> = vec![vec![1., 2.], vec![3.]];
    assert!(Matrix::from_rows(&rows).is_none());
}

#[test]
fn test_variables_lookup() {
    let vars = Variables::new()
        .with_scalar("x", 2.)
        .with_matrix("w", Matrix::zeros(2, 2));
    assert_eq!(vars.scalar("x"), Some(2.));
    assert_eq!(vars.scalar("w"), None);
    assert_eq!(vars.matrix("w").map(Matrix::width), Some(2));
    assert!(vars.get("y").is_none());
}
