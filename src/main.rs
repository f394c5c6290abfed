use lensograd::{gradient_descent, ops, Graph, Variables};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let graph = Graph::new();
    let x1 = graph.scalar("x1");
    let x2 = graph.scalar("x2");
    let f = x1 * ops::exp(-0.5 * (x1.powf(2.) + x2.powf(2.)));

    let vars = Variables::new().with_scalar("x1", 2.).with_scalar("x2", 0.5);
    let (value, grads) = f.reverse(&vars)?;
    println!("f = {value}");
    for (name, grad) in grads.iter() {
        println!("df/d{name} = {grad}");
    }
    for name in ["x1", "x2"] {
        let tangent = f.forward(name, &vars)?;
        println!("forward df/d{name} = {}", tangent.derivative);
    }

    // x^2 + (y + 2)^2 + (z - 10)^2
    let x = graph.scalar("x");
    let y = graph.scalar("y");
    let z = graph.scalar("z");
    let g = x.powf(2.) + (y + 2.).powf(2.) + (z - 10.).powf(2.);
    let start = Variables::new()
        .with_scalar("x", 10.)
        .with_scalar("y", -5.)
        .with_scalar("z", 10.);
    let result = gradient_descent(g, start, 0.001, 10000)?;
    for name in ["x", "y", "z"] {
        println!("{name} = {}", result.get(name).map(|v| v.to_string()).unwrap_or_default());
    }

    f.dot(&mut std::io::stdout())?;
    Ok(())
}
