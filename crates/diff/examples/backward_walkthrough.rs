//! Reverse-Mode Autodiff over Scalars
//!
//! Run with: RUST_LOG=debug cargo run -p scalargrad-diff --example backward_walkthrough
//!
//! This example demonstrates:
//! - Building a graph as a side effect of arithmetic
//! - The chain rule through a backward pass
//! - Gradient accumulation for nodes used more than once
//! - Derived operations (division) built from primitives
//! - Numerical gradient checking for verification

use scalargrad_diff::{grad_check, DiffError, GradCheckConfig, ScalarGraph};

fn main() -> Result<(), DiffError> {
    env_logger::init();

    println!("=== Reverse-Mode Autodiff over Scalars ===\n");

    // -------------------------------------------------------------------------
    // 1. Chain rule: f = a * b + c
    // -------------------------------------------------------------------------
    println!("1. Chain rule: f = a * b + c");
    println!("----------------------------");
    println!();

    let mut graph = ScalarGraph::new();
    let a = graph.leaf(2.0);
    let b = graph.leaf(-3.0);
    let c = graph.leaf(10.0);
    let ab = graph.mul(a, b)?;
    let f = graph.add(ab, c)?;
    graph.backward(f)?;

    println!("a = 2, b = -3, c = 10");
    println!("f = {}", graph.node(f));
    println!();
    println!("Gradients:");
    println!("  a: {}  (= b)", graph.node(a));
    println!("  b: {}  (= a)", graph.node(b));
    println!("  c: {}", graph.node(c));
    println!();
    println!("Graph:");
    print!("{}", graph.render(f)?);
    println!();

    // -------------------------------------------------------------------------
    // 2. Fan-out: c = a + a
    // -------------------------------------------------------------------------
    println!("2. Fan-out: c = a + a");
    println!("---------------------");
    println!();

    let mut graph = ScalarGraph::new();
    let a = graph.leaf(3.0);
    let c = graph.add(a, a)?;
    graph.backward(c)?;

    println!("a = {}", graph.node(a));
    println!("  (Both slots contribute, so the gradient is 2, not 1)");
    println!();

    // -------------------------------------------------------------------------
    // 3. Division: y = 1 / x, built as 1 * x^-1
    // -------------------------------------------------------------------------
    println!("3. Division: y = 1 / x");
    println!("----------------------");
    println!();

    let mut graph = ScalarGraph::new();
    let x = graph.leaf(4.0);
    let y = graph.rdiv(1.0, x)?;
    graph.backward(y)?;

    println!("y = {}", graph.node(y));
    println!("x = {}  (d/dx x^-1 = -x^-2)", graph.node(x));
    println!("Intermediate nodes: {}", graph.len());
    println!();

    // -------------------------------------------------------------------------
    // 4. Accumulation across passes
    // -------------------------------------------------------------------------
    println!("4. Repeated backward accumulates");
    println!("--------------------------------");
    println!();

    graph.backward(y)?;
    println!("after a second pass: x = {}", graph.node(x));
    graph.zero_grad();
    graph.backward(y)?;
    println!("after zero_grad + pass: x = {}", graph.node(x));
    println!();

    // -------------------------------------------------------------------------
    // 5. Gradient check
    // -------------------------------------------------------------------------
    println!("5. Gradient check: relu(x * y + 1) / y");
    println!("--------------------------------------");
    println!();

    let mut graph = ScalarGraph::new();
    let x = graph.leaf(0.8);
    let y = graph.leaf(1.6);
    let xy = graph.mul(x, y)?;
    let s = graph.add(xy, 1.0)?;
    let r = graph.relu(s)?;
    let loss = graph.div(r, y)?;

    match grad_check(&graph, loss, &[x, y], &GradCheckConfig::default()) {
        Ok(()) => println!("analytical and numerical gradients agree"),
        Err(e) => println!("{}", e),
    }

    Ok(())
}
