//! The baseline operation catalog. Each function builds one operation node whose
//! `deriv` follows the ordinary rules of calculus.

use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::graph::Node;

#[cfg(feature = "expr_name")]
fn label(_short: &str, expr: impl FnOnce() -> String) -> String {
    expr()
}

#[cfg(not(feature = "expr_name"))]
fn label(short: &str, _expr: impl FnOnce() -> String) -> String {
    short.to_string()
}

pub fn add<'a>(a: Node<'a>, b: Node<'a>) -> Node<'a> {
    let name = label("add", || format!("({} + {})", a.name(), b.name()));
    a.graph
        .operation(name, &[a, b], |x| x[0] + x[1], |_| vec![1., 1.])
}

pub fn sub<'a>(a: Node<'a>, b: Node<'a>) -> Node<'a> {
    let name = label("sub", || format!("({} - {})", a.name(), b.name()));
    a.graph
        .operation(name, &[a, b], |x| x[0] - x[1], |_| vec![1., -1.])
}

pub fn neg(a: Node) -> Node {
    let name = label("neg", || format!("-{}", a.name()));
    a.graph.operation(name, &[a], |x| -x[0], |_| vec![-1.])
}

pub fn constadd(k: f64, a: Node) -> Node {
    let name = label("constadd", || format!("({} + {k})", a.name()));
    a.graph.operation(name, &[a], move |x| k + x[0], |_| vec![1.])
}

pub fn mult<'a>(a: Node<'a>, b: Node<'a>) -> Node<'a> {
    let name = label("mult", || format!("({} * {})", a.name(), b.name()));
    a.graph
        .operation(name, &[a, b], |x| x[0] * x[1], |x| vec![x[1], x[0]])
}

pub fn constmult(k: f64, a: Node) -> Node {
    let name = label("constmult", || format!("{k}{}", a.name()));
    a.graph.operation(name, &[a], move |x| k * x[0], move |_| vec![k])
}

pub fn div<'a>(a: Node<'a>, b: Node<'a>) -> Node<'a> {
    let name = label("div", || format!("({} / {})", a.name(), b.name()));
    a.graph.operation(
        name,
        &[a, b],
        |x| x[0] / x[1],
        |x| vec![1. / x[1], -x[0] / (x[1] * x[1])],
    )
}

pub fn constdiv(k: f64, a: Node) -> Node {
    let name = label("constdiv", || format!("({k} / {})", a.name()));
    a.graph.operation(
        name,
        &[a],
        move |x| k / x[0],
        move |x| vec![-k / (x[0] * x[0])],
    )
}

pub fn constpow(a: Node, k: f64) -> Node {
    let name = label("constpow", || format!("{}^{k}", a.name()));
    a.graph.operation(
        name,
        &[a],
        move |x| x[0].powf(k),
        move |x| vec![k * x[0].powf(k - 1.)],
    )
}

pub fn exp(a: Node) -> Node {
    a.apply("exp", f64::exp, f64::exp)
}

pub fn ln(a: Node) -> Node {
    a.apply("ln", f64::ln, f64::recip)
}

impl<'a> Node<'a> {
    pub fn exp(self) -> Self {
        exp(self)
    }

    pub fn ln(self) -> Self {
        ln(self)
    }

    pub fn powf(self, k: f64) -> Self {
        constpow(self, k)
    }
}

impl<'a> Add for Node<'a> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        add(self, rhs)
    }
}

impl<'a> Add<f64> for Node<'a> {
    type Output = Self;
    fn add(self, rhs: f64) -> Self::Output {
        constadd(rhs, self)
    }
}

impl<'a> Add<Node<'a>> for f64 {
    type Output = Node<'a>;
    fn add(self, rhs: Node<'a>) -> Self::Output {
        constadd(self, rhs)
    }
}

impl<'a> Sub for Node<'a> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        sub(self, rhs)
    }
}

impl<'a> Sub<f64> for Node<'a> {
    type Output = Self;
    fn sub(self, rhs: f64) -> Self::Output {
        constadd(-rhs, self)
    }
}

impl<'a> Mul for Node<'a> {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        mult(self, rhs)
    }
}

impl<'a> Mul<f64> for Node<'a> {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self::Output {
        constmult(rhs, self)
    }
}

impl<'a> Mul<Node<'a>> for f64 {
    type Output = Node<'a>;
    fn mul(self, rhs: Node<'a>) -> Self::Output {
        constmult(self, rhs)
    }
}

impl<'a> Div for Node<'a> {
    type Output = Self;
    fn div(self, rhs: Self) -> Self::Output {
        div(self, rhs)
    }
}

impl<'a> Div<Node<'a>> for f64 {
    type Output = Node<'a>;
    fn div(self, rhs: Node<'a>) -> Self::Output {
        constdiv(self, rhs)
    }
}

impl<'a> Neg for Node<'a> {
    type Output = Self;
    fn neg(self) -> Self::Output {
        neg(self)
    }
}

#[cfg(test)]
fn check_partials(build: impl for<'g> Fn(&'g crate::Graph) -> Node<'g>, at: &[(&str, f64)]) {
    use crate::Variables;
    let graph = crate::Graph::new();
    let root = build(&graph);
    let vars: Variables = at.iter().copied().collect();
    let (_, grads) = root.reverse(&vars).unwrap();
    for &(name, val) in at {
        let h = 1e-6;
        let mut hi = vars.clone();
        hi.insert(name, val + h);
        let mut lo = vars.clone();
        lo.insert(name, val - h);
        let numeric = (root.forward(name, &hi).unwrap().value
            - root.forward(name, &lo).unwrap().value)
            / (2. * h);
        let analytic = grads.scalar(name).unwrap();
        assert!(
            (numeric - analytic).abs() < 1e-5,
            "d/d{name}: numeric {numeric}, analytic {analytic}"
        );
    }
}

#[test]
fn test_catalog_against_central_differences() {
    let at = [("a", 1.7), ("b", -0.6)];
    check_partials(|g| g.scalar("a") + g.scalar("b"), &at);
    check_partials(|g| g.scalar("a") - g.scalar("b"), &at);
    check_partials(|g| -g.scalar("a"), &at[..1]);
    check_partials(|g| constadd(3., g.scalar("a")), &at[..1]);
    check_partials(|g| g.scalar("a") * g.scalar("b"), &at);
    check_partials(|g| constmult(-2.5, g.scalar("a")), &at[..1]);
    check_partials(|g| g.scalar("a") / g.scalar("b"), &at);
    check_partials(|g| constdiv(4., g.scalar("a")), &at[..1]);
    check_partials(|g| constpow(g.scalar("a"), 3.), &at[..1]);
    check_partials(|g| g.scalar("a").exp(), &at[..1]);
    check_partials(|g| g.scalar("a").ln(), &at[..1]);
}

#[test]
fn test_quotient_rule() {
    let graph = crate::Graph::new();
    let a = graph.scalar("a");
    let b = graph.scalar("b");
    let vars = crate::Variables::new().with_scalar("a", 3.).with_scalar("b", 2.);
    let (value, grads) = (a / b).reverse(&vars).unwrap();
    assert_eq!(value, 1.5);
    assert_eq!(grads.scalar("a"), Some(0.5));
    assert_eq!(grads.scalar("b"), Some(-0.75));
}
