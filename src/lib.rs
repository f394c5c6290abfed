//! Automatic differentiation over an immutable DAG of scalar operations.
//!
//! Build the graph once in a [`Graph`], bind variable names to storage in a
//! [`Variables`] environment, then evaluate it in forward mode for a single
//! directional derivative or in reverse mode for the whole gradient.

pub mod error;
mod forward;
mod graph;
mod lens;
mod matrix;
mod operation;
pub mod ops;
mod optim;
mod reverse;
mod storage;
mod trace;

pub use error::{GraphError, LensError};
pub use forward::{forward, Tangent};
pub use graph::{Graph, Node};
pub use lens::{CellLens, Lens, ScalarLens};
pub use matrix::{matmul, MatrixNode};
pub use operation::Operation;
pub use optim::{gradient_descent, GradientDescent};
pub use reverse::{reverse, reverse_update, UpdateFn};
pub use storage::{Matrix, Storage, Variables};
pub use trace::{Phase, Visit};
