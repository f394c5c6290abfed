use approx::assert_abs_diff_eq;
use lensograd::{gradient_descent, matmul, Graph, GraphError, Matrix, Variables};

fn mat(rows: &[&[f64]]) -> Matrix {
    Matrix::from_rows(rows).unwrap()
}

fn product(a: &Matrix, b: &Matrix) -> Matrix {
    let mut rows = vec![vec![0.; b.width()]; a.height()];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = (0..a.width())
                .map(|k| a.get(r, k).unwrap() * b.get(k, c).unwrap())
                .sum();
        }
    }
    Matrix::from_rows(&rows).unwrap()
}

fn plain_chain(vars: &Variables) -> f64 {
    let m = |name| vars.matrix(name).unwrap();
    let wx = product(m("w"), m("x"));
    let wxy = product(&wx, m("y"));
    product(m("z"), &wxy).get(0, 0).unwrap()
}

fn chain_vars() -> Variables {
    Variables::new()
        .with_matrix("w", mat(&[&[1., 2.], &[3., 4.], &[5., 6.], &[7., 8.]]))
        .with_matrix("x", mat(&[&[9., 8., 7., 6.], &[5., 4., 3., 2.]]))
        .with_matrix("y", mat(&[&[1.], &[2.], &[3.], &[4.]]))
        .with_matrix("z", mat(&[&[9., 8., 7., 6.]]))
}

/// Central difference of `f` with respect to one matrix cell.
fn cell_slope(f: impl Fn(&Variables) -> f64, vars: &Variables, name: &str, row: usize, col: usize) -> f64 {
    let h = 1e-4;
    let shifted = |delta: f64| {
        let mut vars = vars.clone();
        let mut cells = vars.matrix(name).unwrap().clone();
        *cells.get_mut(row, col).unwrap() += delta;
        vars.insert(name, cells);
        f(&vars)
    };
    (shifted(h) - shifted(-h)) / (2. * h)
}

#[test]
fn matmul_chain_gradient() {
    let _ = env_logger::builder().is_test(true).try_init();
    let graph = Graph::new();
    let w = graph.matrix("w", 2, 4);
    let x = graph.matrix("x", 4, 2);
    let y = graph.matrix("y", 1, 4);
    let z = graph.matrix("z", 4, 1);

    let wx = matmul(&w, &x).unwrap();
    let wxy = matmul(&wx, &y).unwrap();
    let f = matmul(&z, &wxy).unwrap();
    assert_eq!((f.width(), f.height()), (1, 1));
    let f = f.to_scalar().unwrap();

    let vars = chain_vars();
    let (value, grads) = f.reverse(&vars).unwrap();
    assert_abs_diff_eq!(value, plain_chain(&vars), epsilon = 1e-9);

    for (name, storage) in vars.iter() {
        let shape = storage.as_matrix().unwrap();
        let grad = grads.matrix(name).unwrap();
        assert_eq!((grad.width(), grad.height()), (shape.width(), shape.height()));
        for row in 0..shape.height() {
            for col in 0..shape.width() {
                let expected = cell_slope(plain_chain, &vars, name, row, col);
                assert_abs_diff_eq!(grad.get(row, col).unwrap(), expected, epsilon = 1e-3);
            }
        }
        let tangent = f.forward(name, &vars).unwrap();
        assert_abs_diff_eq!(tangent.derivative, grad.iter().sum::<f64>(), epsilon = 1e-9);
    }
}

#[test]
fn matmul_dimension_mismatch() {
    let graph = Graph::new();
    let a = graph.matrix("a", 3, 2);
    let b = graph.matrix("b", 2, 2);
    assert_eq!(
        matmul(&a, &b).unwrap_err(),
        GraphError::DimensionMismatch {
            lhs_width: 3,
            lhs_height: 2,
            rhs_width: 2,
            rhs_height: 2,
        }
    );
    assert!(matmul(&b, &a).is_ok());
}

#[test]
fn determinant_2x2() {
    let graph = Graph::new();
    let m = graph.matrix("m", 2, 2);
    let det = m.determinant().unwrap();
    let vars = Variables::new().with_matrix("m", mat(&[&[3., 5.], &[2., 7.]]));
    let (value, grads) = det.reverse(&vars).unwrap();
    assert_eq!(value, 11.);
    assert_eq!(grads.matrix("m"), Some(&mat(&[&[7., -2.], &[-5., 3.]])));
}

fn plain_det(m: &Matrix) -> f64 {
    let n = m.width();
    if n == 1 {
        return m.get(0, 0).unwrap();
    }
    (0..n)
        .map(|col| {
            let minor: Vec<Vec<f64>> = (1..n)
                .map(|r| (0..n).filter(|&c| c != col).map(|c| m.get(r, c).unwrap()).collect())
                .collect();
            let sign = if col % 2 == 0 { 1. } else { -1. };
            sign * m.get(0, col).unwrap() * plain_det(&Matrix::from_rows(&minor).unwrap())
        })
        .sum()
}

#[test]
fn determinant_4x4_gradient() {
    let graph = Graph::new();
    let m = graph.matrix("m", 4, 4);
    let det = m.determinant().unwrap();
    let vars = Variables::new().with_matrix(
        "m",
        mat(&[
            &[2., 1., 1., 0.],
            &[1., 3., 2., 1.],
            &[1., 0., 0., 4.],
            &[0., 2., 1., 1.],
        ]),
    );
    let (value, grads) = det.reverse(&vars).unwrap();
    let plain = |vars: &Variables| plain_det(vars.matrix("m").unwrap());
    assert_abs_diff_eq!(value, plain(&vars), epsilon = 1e-9);
    let grad = grads.matrix("m").unwrap();
    for row in 0..4 {
        for col in 0..4 {
            let expected = cell_slope(plain, &vars, "m", row, col);
            assert_abs_diff_eq!(grad.get(row, col).unwrap(), expected, epsilon = 1e-6);
        }
    }
}

#[test]
fn descent_on_matrix_cells() {
    let graph = Graph::new();
    let w = graph.matrix("w", 2, 1);
    let x = graph.matrix("x", 1, 2);
    let out = matmul(&w, &x).unwrap().to_scalar().unwrap();
    let diff = out - 3.;
    let loss = diff * diff;

    let start = Variables::new()
        .with_matrix("w", mat(&[&[0.5, -0.5]]))
        .with_matrix("x", mat(&[&[1.], &[2.]]));
    let (before, _) = loss.reverse(&start).unwrap();
    let result = gradient_descent(loss, start, 0.01, 500).unwrap();
    let (after, _) = loss.reverse(&result).unwrap();
    assert!(after < before);
    assert_abs_diff_eq!(after, 0., epsilon = 1e-6);
    assert_eq!(result.matrix("w").map(Matrix::height), Some(1));
}
