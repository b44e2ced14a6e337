//! `has_combination` benchmarks
//!
//! The solver answers every visibility query, so its cost dominates large
//! runs. Two shapes:
//! - a chain of diamonds, each branch rebinding one variable under a
//!   condition (queries cross every condition node)
//! - a linear chain where each binding cites the previous one (long
//!   source-set expansion)

use codegraph_absint::{BindingId, CfgNodeId, Program, ValueId};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// `width` sequential if/else diamonds over one variable; returns the
/// program, the exit node and the bindings of the last diamond
fn diamonds(width: usize) -> (Program, CfgNodeId, Vec<BindingId>) {
    let mut program = Program::new();
    let root = program.new_cfg_node("root", None);
    program.set_entrypoint(root);
    let flag = program.new_variable();
    let on = program.add_binding(flag, ValueId::from_index(0), [], root);
    let off = program.add_binding(flag, ValueId::from_index(1), [], root);

    let x = program.new_variable();
    let mut node = root;
    let mut last = Vec::new();
    for i in 0..width {
        let then = program.connect_new(node, "Then", Some(on));
        let other = program.connect_new(node, "Else", Some(off));
        let a = program.add_binding(x, ValueId::from_index(2 + 2 * i), [on], then);
        let b = program.add_binding(x, ValueId::from_index(3 + 2 * i), [off], other);
        let join = program.connect_new(then, "Join", None);
        program.connect_to(other, join);
        node = join;
        last = vec![a, b];
    }
    (program, node, last)
}

/// `len` nodes in a row, each binding sourced from the previous one
fn provenance_chain(len: usize) -> (Program, CfgNodeId, BindingId) {
    let mut program = Program::new();
    let root = program.new_cfg_node("root", None);
    program.set_entrypoint(root);
    let mut node = root;
    let mut previous: Option<BindingId> = None;
    for i in 0..len {
        node = program.connect_new(node, "Step", None);
        let var = program.new_variable();
        previous = Some(program.add_binding(var, ValueId::from_index(i), previous, node));
    }
    (program, node, previous.unwrap())
}

fn bench_diamonds(c: &mut Criterion) {
    let mut group = c.benchmark_group("has_combination_diamonds");
    for width in [4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            b.iter_with_setup(
                || diamonds(width),
                |(program, exit, last)| {
                    black_box(program.has_combination(exit, &[last[0]]));
                    black_box(program.has_combination(exit, &last));
                },
            );
        });
    }
    group.finish();
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("has_combination_chain");
    for len in [16usize, 128, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            b.iter_with_setup(
                || provenance_chain(len),
                |(program, exit, last)| black_box(program.has_combination(exit, &[last])),
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_diamonds, bench_chain);
criterion_main!(benches);
