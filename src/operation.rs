/// A trait that represents an operation node in the graph.
/// It needs to implement the value of the operation and its partial derivatives
/// with respect to each input, both evaluated at the given input values.
///
/// `deriv` must return exactly as many entries as there are inputs.
pub trait Operation {
    fn name(&self) -> String;
    fn value(&self, inputs: &[f64]) -> f64;
    fn deriv(&self, inputs: &[f64]) -> Vec<f64>;
}

/// An operation made of a pair of closures.
pub(crate) struct FnOperation<F, D> {
    pub name: String,
    pub value: F,
    pub deriv: D,
}

impl<F, D> Operation for FnOperation<F, D>
where
    F: Fn(&[f64]) -> f64,
    D: Fn(&[f64]) -> Vec<f64>,
{
    fn name(&self) -> String {
        self.name.clone()
    }
    fn value(&self, inputs: &[f64]) -> f64 {
        (self.value)(inputs)
    }
    fn deriv(&self, inputs: &[f64]) -> Vec<f64> {
        (self.deriv)(inputs)
    }
}

/// A unary operation made of plain function pointers.
pub(crate) struct PtrUnaryFn {
    pub name: String,
    pub f: fn(f64) -> f64,
    pub grad: fn(f64) -> f64,
}

impl Operation for PtrUnaryFn {
    fn name(&self) -> String {
        self.name.clone()
    }
    fn value(&self, inputs: &[f64]) -> f64 {
        (self.f)(inputs[0])
    }
    fn deriv(&self, inputs: &[f64]) -> Vec<f64> {
        vec![(self.grad)(inputs[0])]
    }
}

#[test]
fn test_fn_operation() {
    let op = FnOperation {
        name: "mul".to_string(),
        value: |x: &[f64]| x[0] * x[1],
        deriv: |x: &[f64]| vec![x[1], x[0]],
    };
    assert_eq!(op.name(), "mul");
    assert_eq!(op.value(&[3., 4.]), 12.);
    assert_eq!(op.deriv(&[3., 4.]), vec![4., 3.]);
}
