use crate::{error::GraphError, graph::Node, storage::Variables};

/// Fixed-step batch gradient descent driven by reverse mode.
///
/// Every iteration runs one reverse pass over the whole graph and moves every
/// leaf by `-learning_rate * gradient` in place. There is no convergence check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientDescent {
    pub learning_rate: f64,
    pub iterations: usize,
}

impl GradientDescent {
    pub fn new(learning_rate: f64, iterations: usize) -> Self {
        Self {
            learning_rate,
            iterations,
        }
    }

    pub fn minimize(&self, root: Node, mut vars: Variables) -> Result<Variables, GraphError> {
        let rate = self.learning_rate;
        let mut warned = false;
        for i in 0..self.iterations {
            let (loss, _) = root.reverse_update(&mut vars, |_loss, current, gradient| {
                current - rate * gradient
            })?;
            if !loss.is_finite() && !warned {
                log::warn!("gradient descent: loss became {loss} at iteration {i}");
                warned = true;
            }
            log::trace!("gradient descent: iteration {i}, loss {loss}");
        }
        log::debug!(
            "gradient descent: {} iterations at rate {rate} done",
            self.iterations
        );
        Ok(vars)
    }
}

/// Run `iterations` steps of gradient descent on `root`, starting from `vars`,
/// and return the final environment.
pub fn gradient_descent(
    root: Node,
    vars: Variables,
    learning_rate: f64,
    iterations: usize,
) -> Result<Variables, GraphError> {
    GradientDescent::new(learning_rate, iterations).minimize(root, vars)
}

#[test]
fn test_single_step() {
    let graph = crate::Graph::new();
    let x = graph.scalar("x");
    let f = x * x;
    let vars = Variables::new().with_scalar("x", 4.);
    let vars = gradient_descent(f, vars, 0.25, 1).unwrap();
    assert_eq!(vars.scalar("x"), Some(2.));
}

#[test]
fn test_zero_iterations() {
    let graph = crate::Graph::new();
    let f = graph.scalar("x").exp();
    let vars = Variables::new().with_scalar("x", 4.);
    let out = GradientDescent::new(0.1, 0).minimize(f, vars.clone()).unwrap();
    assert_eq!(out, vars);
}
