use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use sysdata::{
    Record,
    record::{Cell, Converter, Depth, Direction, Scope, SchemaRow, SystemId, WriteOpts},
    schema_row,
};

fn system() -> SystemId {
    SystemId::new("Bench").expect("valid system id")
}

/// Creates a record with `rows` elements in the `Items` sequence and the
/// `Bench` backend declared for `direction`
fn declared_record(rows: usize, direction: Direction) -> Record {
    let mut rec = Record::new();
    rec.set_val("Id", 0).set_val("Name", "");
    for i in 0..rows {
        rec.set_val(format!("Items/{i}/Code"), "")
            .set_val(format!("Items/{i}/Qty"), 0);
    }
    let convert = match direction {
        Direction::From => "int",
        Direction::Onto => "str",
    };
    let converter = |name| Converter::named(name).expect("builtin converter");
    let mut row: SchemaRow = schema_row!["bQty", "Items/0/Qty", Cell::Empty, Cell::Empty];
    match direction {
        Direction::From => row.push(Cell::from(converter(convert))),
        Direction::Onto => row.extend([Cell::Empty, Cell::from(converter(convert))]),
    }
    let rows = vec![
        schema_row!["bId", "Id"],
        schema_row!["bName", "Name"],
        schema_row!["bCode", "Items/0/Code"],
        row,
    ];
    rec.set_system(Some(system())).set_direction(Some(direction));
    rec.add_system_fields(&rows, None, true)
        .expect("Failed to declare backend");
    rec
}

/// Benchmarks pulling backend values of records with growing sequences
fn bench_pull(c: &mut Criterion) {
    let mut group = c.benchmark_group("pull");
    let from = Scope::new(system(), Direction::From);

    for rows in [1, 10, 100].iter() {
        let mut rec = declared_record(*rows, Direction::From);
        for i in 0..*rows {
            rec.set_val_in(format!("Items/{i}/Qty"), i.to_string(), &from, WriteOpts::exact());
        }
        group.throughput(Throughput::Elements(*rows as u64));
        group.bench_with_input(BenchmarkId::new("items", rows), &rec, |b, rec| {
            b.iter_with_setup(
                || rec.copy(Depth::SHALLOW),
                |mut rec| {
                    rec.pull(black_box(&system()));
                    black_box(rec)
                },
            );
        });
    }

    group.finish();
}

/// Benchmarks pushing canonical values onto the backend
fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("push");

    for rows in [1, 10, 100].iter() {
        let mut rec = declared_record(*rows, Direction::Onto);
        for i in 0..*rows {
            rec.set_val_in(format!("Items/{i}/Qty"), i as i64, &Scope::canonical(), WriteOpts::default());
        }
        group.throughput(Throughput::Elements(*rows as u64));
        group.bench_with_input(BenchmarkId::new("items", rows), &rec, |b, rec| {
            b.iter_with_setup(
                || rec.copy(Depth::SHALLOW),
                |mut rec| {
                    rec.push(black_box(&system()));
                    black_box(rec)
                },
            );
        });
    }

    group.finish();
}

/// Benchmarks copies at different depths; shallow copies share every field
fn bench_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("copy");
    let rec = declared_record(100, Direction::From);

    for (label, depth) in [("shallow", Depth::SHALLOW), ("until_field", Depth::UntilField), ("all", Depth::All)] {
        group.bench_function(label, |b| {
            b.iter(|| black_box(rec.copy(black_box(depth))));
        });
    }

    group.finish();
}

/// Custom Criterion configuration for consistent benchmarking
/// Fixed sample size ensures reproducible results across different machines
fn criterion_config() -> Criterion {
    Criterion::default().sample_size(50).configure_from_args()
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets =
        bench_pull,
        bench_push,
        bench_copy,
}
criterion_main!(benches);
