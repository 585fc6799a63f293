use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use insight_mda::{Chart, DataSet, FilterCoordinator, GroupingHandle, Record, Series, Value, WidgetHandle};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

fn bench_rows() -> usize {
    std::env::var("INSIGHT_MDA_BENCH_ROWS")
        .ok()
        .and_then(|v| v.replace('_', "").parse::<usize>().ok())
        // Large enough for the incremental path to dominate, small enough to build quickly.
        .filter(|&v| v >= 10_000 && v <= 2_000_000)
        .unwrap_or(200_000)
}

fn field(name: &'static str) -> impl Fn(&Record) -> Value {
    move |record| record.get(name).cloned().unwrap_or_default()
}

fn build_dataset(rows: usize) -> DataSet {
    let countries = 50usize;
    let languages = 12usize;
    let records = (0..rows).map(|i| {
        let tags: Vec<String> = (0..(i % 3))
            .map(|t| format!("tag_{:02}", (i + t * 7) % 20))
            .collect();
        Record::new()
            .with("country", format!("Country_{:03}", i % countries))
            .with("language", format!("lang_{:02}", (i / 7) % languages))
            .with("pop", (i % 1_000) as f64)
            .with("tags", tags)
    });
    DataSet::new(records)
}

fn chart(name: &str, grouping: &GroupingHandle) -> WidgetHandle {
    Rc::new(RefCell::new(
        Chart::new(name).with_series(Series::new(name, grouping)),
    ))
}

fn bench_selection_propagation(c: &mut Criterion) {
    let rows = bench_rows();
    let ds = build_dataset(rows);

    let country = ds.group("country", field("country"), false).unwrap();
    let language = ds.group("language", field("language"), false).unwrap();
    let tags = ds.group("tags", field("tags"), true).unwrap();
    language.borrow_mut().sum(["pop"]).mean(["pop"]).count(["tags"]);
    tags.borrow_mut().ordered(true).cumulative(["Count"]);

    let mut coordinator = FilterCoordinator::new();
    for (name, grouping) in [("country", &country), ("language", &language), ("tags", &tags)] {
        coordinator.register(chart(name, grouping)).unwrap();
    }
    coordinator.draw().unwrap();

    let selected = Value::from("Country_007");

    // Sanity check: a double toggle leaves the language counts untouched.
    let before = language.borrow_mut().get_data(None, None).unwrap();
    coordinator.on_selection(&country, &selected).unwrap();
    coordinator.on_selection(&country, &selected).unwrap();
    assert_eq!(language.borrow_mut().get_data(None, None).unwrap(), before);

    let mut group = c.benchmark_group("selection_propagation");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    group.bench_with_input(BenchmarkId::new("toggle_country", rows), &rows, |b, _| {
        b.iter(|| {
            coordinator.on_selection(&country, &selected).unwrap();
            coordinator.on_selection(&country, &selected).unwrap();
            black_box(coordinator.filtered_dimension_names().count());
        })
    });

    let tag = Value::from("tag_03");
    group.bench_with_input(BenchmarkId::new("toggle_tag", rows), &rows, |b, _| {
        b.iter(|| {
            coordinator.on_selection(&tags, &tag).unwrap();
            coordinator.on_selection(&tags, &tag).unwrap();
            black_box(coordinator.filtered_dimension_names().count());
        })
    });

    group.finish();

    let mut read_group = c.benchmark_group("selection_propagation_reads");
    read_group.sample_size(10);
    read_group.measurement_time(Duration::from_secs(5));

    read_group.bench_with_input(BenchmarkId::new("ordered_top_10", rows), &rows, |b, _| {
        b.iter(|| {
            let rows = tags.borrow_mut().get_ordered_data(Some(10)).unwrap();
            black_box(rows);
        })
    });

    read_group.bench_with_input(BenchmarkId::new("summary", rows), &rows, |b, _| {
        b.iter(|| {
            let summary = language.borrow_mut().summary().unwrap();
            black_box(summary);
        })
    });

    read_group.finish();
}

criterion_group!(benches, bench_selection_propagation);
criterion_main!(benches);
