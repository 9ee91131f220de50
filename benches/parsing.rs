use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::Value;
use sql_rag::pipeline::bounder::bound_rows;
use sql_rag::pipeline::executor::parse_literal;
use std::fmt::Write;
use std::hint::black_box;

fn engine_output(rows: usize) -> String {
    let mut output = String::from("[");
    for id in 0..rows {
        if id > 0 {
            output.push_str(", ");
        }
        write!(
            output,
            "{{'actor_id': {id}, 'first_name': 'ACTOR{id}', 'last_name': \"O'BRIEN\", 'score': {}.5, 'active': True, 'note': None}}",
            id % 97
        )
        .expect("writing to a String cannot fail");
    }
    output.push(']');
    output
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let output = engine_output(16_044);
    c.bench_function("parse_literal", |b| {
        b.iter(|| parse_literal(black_box(&output)))
    });

    let rows = match parse_literal(&output).expect("benchmark input parses") {
        Value::Array(rows) => rows,
        _ => Vec::new(),
    };
    c.bench_function("bound_rows", |b| {
        b.iter(|| bound_rows(black_box(&rows), black_box(30)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
