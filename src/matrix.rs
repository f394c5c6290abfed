use crate::{
    error::GraphError,
    graph::{Graph, Node},
    lens::CellLens,
    ops::{add, mult, neg},
};

/// A structured variable or expression: one node per cell, in row-major order.
#[derive(Clone, Debug)]
pub struct MatrixNode<'a> {
    width: usize,
    height: usize,
    cells: Vec<Node<'a>>,
}

impl Graph {
    /// Declare a `width` x `height` matrix variable bound to `name`. Every cell
    /// is its own leaf, sharing the storage of `name` through a [`CellLens`].
    pub fn matrix<'a>(&'a self, name: &str, width: usize, height: usize) -> MatrixNode<'a> {
        let mut cells = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                cells.push(self.variable(
                    format!("{name}[{row},{col}]"),
                    name,
                    CellLens {
                        row,
                        col,
                        width,
                        height,
                    },
                ));
            }
        }
        MatrixNode {
            width,
            height,
            cells,
        }
    }
}

impl<'a> MatrixNode<'a> {
    /// Assemble a matrix from existing nodes, given as rows. Returns `None` if the rows are ragged.
    pub fn from_rows(rows: Vec<Vec<Node<'a>>>) -> Option<Self> {
        let height = rows.len();
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|row| row.len() != width) {
            return None;
        }
        Some(Self {
            width,
            height,
            cells: rows.into_iter().flatten().collect(),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Node<'a>> {
        if row < self.height && col < self.width {
            Some(self.cells[row * self.width + col])
        } else {
            None
        }
    }

    pub fn cells(&self) -> &[Node<'a>] {
        &self.cells
    }

    /// The only cell of a 1x1 matrix.
    pub fn to_scalar(&self) -> Option<Node<'a>> {
        if self.width == 1 && self.height == 1 {
            Some(self.cells[0])
        } else {
            None
        }
    }

    /// Matrix product `self * rhs`. Every output cell is a sum of products that
    /// reuses the input cell nodes, so the result is a DAG rather than a tree.
    pub fn matmul(&self, rhs: &Self) -> Result<Self, GraphError> {
        if self.width != rhs.height || self.width == 0 {
            return Err(GraphError::DimensionMismatch {
                lhs_width: self.width,
                lhs_height: self.height,
                rhs_width: rhs.width,
                rhs_height: rhs.height,
            });
        }
        let mut cells = Vec::with_capacity(rhs.width * self.height);
        for row in 0..self.height {
            for col in 0..rhs.width {
                let term = |k: usize| {
                    mult(
                        self.cells[row * self.width + k],
                        rhs.cells[k * rhs.width + col],
                    )
                };
                let cell = (1..self.width).fold(term(0), |acc, k| add(acc, term(k)));
                cells.push(cell);
            }
        }
        Ok(Self {
            width: rhs.width,
            height: self.height,
            cells,
        })
    }

    /// Determinant by cofactor expansion along the first row.
    pub fn determinant(&self) -> Result<Node<'a>, GraphError> {
        if self.width != self.height || self.width == 0 {
            return Err(GraphError::NotSquare {
                width: self.width,
                height: self.height,
            });
        }
        Ok(det(&self.cells, self.width))
    }
}

fn det<'a>(cells: &[Node<'a>], n: usize) -> Node<'a> {
    match n {
        1 => cells[0],
        2 => {
            let ad = mult(cells[0], cells[3]);
            let bc = mult(cells[1], cells[2]);
            add(ad, neg(bc))
        }
        _ => {
            let mut sum: Option<Node<'a>> = None;
            for col in 0..n {
                let minor: Vec<_> = (1..n)
                    .flat_map(|row| {
                        (0..n)
                            .filter(move |&c| c != col)
                            .map(move |c| cells[row * n + c])
                    })
                    .collect();
                let term = mult(cells[col], det(&minor, n - 1));
                let term = if col % 2 == 0 { term } else { neg(term) };
                sum = Some(match sum {
                    Some(acc) => add(acc, term),
                    None => term,
                });
            }
            // n >= 3, so the loop ran at least once.
            sum.unwrap_or(cells[0])
        }
    }
}

/// Multiply two matrices, failing at construction if the inner dimensions differ.
pub fn matmul<'a>(lhs: &MatrixNode<'a>, rhs: &MatrixNode<'a>) -> Result<MatrixNode<'a>, GraphError> {
    lhs.matmul(rhs)
}

#[test]
fn test_matmul_shape() {
    let graph = Graph::new();
    let w = graph.matrix("w", 2, 4);
    let x = graph.matrix("x", 4, 2);
    let wx = matmul(&w, &x).unwrap();
    assert_eq!((wx.width(), wx.height()), (4, 4));
    let xw = matmul(&x, &w).unwrap();
    assert_eq!((xw.width(), xw.height()), (2, 2));
    assert!(wx.to_scalar().is_none());
}

#[test]
fn test_matmul_mismatch() {
    let graph = Graph::new();
    let w = graph.matrix("w", 2, 4);
    let before = graph.len();
    assert_eq!(
        matmul(&w, &w).unwrap_err(),
        GraphError::DimensionMismatch {
            lhs_width: 2,
            lhs_height: 4,
            rhs_width: 2,
            rhs_height: 4,
        }
    );
    assert_eq!(graph.len(), before);
}

#[test]
fn test_determinant_not_square() {
    let graph = Graph::new();
    let m = graph.matrix("m", 2, 3);
    assert!(matches!(
        m.determinant(),
        Err(GraphError::NotSquare {
            width: 2,
            height: 3
        })
    ));
}

#[test]
fn test_from_rows() {
    let graph = Graph::new();
    let a = graph.scalar("a");
    let b = graph.scalar("b");
    let m = MatrixNode::from_rows(vec![vec![a, b], vec![b, a]]).unwrap();
    assert_eq!(m.get(1, 0).map(|n| n.index()), Some(b.index()));
    assert!(MatrixNode::from_rows(vec![vec![a, b], vec![a]]).is_none());
}
