mod common;

use common::{counts, countries, data, field, group, people};
use insight_mda::{
    by_count_descending, DataSet, GroupTotals, Key, Occurrences, Record, Value,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

fn select(dataset: &DataSet, dimension: &str, value: &str) {
    let dimension = dataset.field_dimension(dimension, false).unwrap();
    let mut dimension = dimension.borrow_mut();
    let predicate = dimension.create_filter_predicate(&Value::from(value));
    dimension.toggle(predicate).unwrap();
}

#[test]
fn initial_data_sums_and_counts_per_key() {
    let ds = DataSet::new(countries());
    let g = group(&ds, "country");
    g.borrow_mut().sum(["pop"]);

    let rows: Vec<(String, i64, Option<f64>)> = data(&g)
        .iter()
        .map(|e| (e.key.to_string(), e.value.count, e.value.sum("pop")))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("UK".to_string(), 2, Some(15.0)),
            ("FR".to_string(), 1, Some(7.0)),
        ]
    );
}

#[test]
fn mean_unions_into_sum_and_zero_count_average_is_zero() {
    let ds = DataSet::new(people());
    let g = group(&ds, "country");
    g.borrow_mut().mean(["pop"]);
    assert_eq!(g.borrow().summed_fields(), ["pop".to_string()]);

    let averages: Vec<Option<f64>> = data(&g).iter().map(|e| e.value.average("pop")).collect();
    assert_eq!(averages, vec![Some(7.5), Some(7.0), Some(3.0)]);

    select(&ds, "language", "fr");
    g.borrow_mut().recalculate().unwrap();

    let rows: Vec<(String, i64, Option<f64>)> = data(&g)
        .iter()
        .map(|e| (e.key.to_string(), e.value.count, e.value.average("pop")))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("UK".to_string(), 0, Some(0.0)),
            ("FR".to_string(), 1, Some(7.0)),
            ("DE".to_string(), 0, Some(0.0)),
        ]
    );
}

#[test]
fn counted_multi_valued_field_counts_each_value_and_total() {
    let ds = DataSet::new(people());
    let g = group(&ds, "country");
    g.borrow_mut().count(["tags"]);

    let before = data(&g);
    let uk = before[0].value.occurrences("tags").unwrap();
    assert_eq!(uk.get(&Key::from("a")), 1);
    assert_eq!(uk.get(&Key::from("b")), 2);
    assert_eq!(uk.total, 3);
    let de = before[2].value.occurrences("tags").unwrap();
    assert_eq!(de.total, 0);

    // Filtering out both UK records takes every UK occurrence back out.
    select(&ds, "language", "fr");
    g.borrow_mut().recalculate().unwrap();
    let filtered = data(&g);
    let uk = filtered[0].value.occurrences("tags").unwrap();
    assert_eq!(uk.get(&Key::from("a")), 0);
    assert_eq!(uk.get(&Key::from("b")), 0);
    assert_eq!(uk.total, 0);

    select(&ds, "language", "fr");
    g.borrow_mut().recalculate().unwrap();
    assert_eq!(data(&g), before);
}

fn skewed() -> Vec<Record> {
    let mut records = Vec::new();
    for (key, n) in [("x", 3), ("y", 5), ("z", 2)] {
        for _ in 0..n {
            records.push(Record::new().with("kind", key));
        }
    }
    records
}

#[test]
fn cumulative_count_follows_display_order() {
    let ds = DataSet::new(skewed());
    let g = group(&ds, "kind");
    g.borrow_mut()
        .ordered(true)
        .order_function(|a, b| b.value.count.cmp(&a.value.count))
        .cumulative(["Count"]);

    let rows = g.borrow_mut().get_ordered_data(None).unwrap();
    let cumulative: Vec<(String, Option<f64>)> = rows
        .iter()
        .map(|e| (e.key.to_string(), e.value.cumulative("Count")))
        .collect();
    assert_eq!(
        cumulative,
        vec![
            ("y".to_string(), Some(5.0)),
            ("x".to_string(), Some(8.0)),
            ("z".to_string(), Some(10.0)),
        ]
    );
}

#[test]
fn unordered_cumulative_uses_insertion_order() {
    let ds = DataSet::new(skewed());
    let g = group(&ds, "kind");
    g.borrow_mut().cumulative(["Count"]);

    let cumulative: Vec<Option<f64>> = data(&g)
        .iter()
        .map(|e| e.value.cumulative("Count"))
        .collect();
    assert_eq!(cumulative, vec![Some(3.0), Some(8.0), Some(10.0)]);
}

#[test]
fn cumulative_resolves_nested_paths() {
    let ds = DataSet::new(people());
    let g = group(&ds, "country");
    g.borrow_mut()
        .sum(["pop"])
        .count(["tags"])
        .cumulative(["pop.Sum", "tags.b", "tags.Total"]);

    let rows: Vec<(Option<f64>, Option<f64>, Option<f64>)> = data(&g)
        .iter()
        .map(|e| {
            (
                e.value.cumulative("pop.Sum"),
                e.value.cumulative("tags.b"),
                e.value.cumulative("tags.Total"),
            )
        })
        .collect();
    assert_eq!(
        rows,
        vec![
            (Some(15.0), Some(2.0), Some(3.0)),
            (Some(22.0), None, Some(4.0)),
            (Some(25.0), None, Some(4.0)),
        ]
    );
}

#[test]
fn totals_merge_occurrences_and_sum_values() {
    let ds = DataSet::new(people());
    let g = group(&ds, "country");
    g.borrow_mut()
        .sum(["pop"])
        .count(["tags"])
        .total(["tags", "pop", "Count"]);
    g.borrow_mut().initialize().unwrap();

    let mut expected = GroupTotals::default();
    expected.values.insert("pop".to_string(), 25.0);
    expected.values.insert("Count".to_string(), 4.0);
    expected.occurrences.insert(
        "tags".to_string(),
        Occurrences {
            counts: BTreeMap::from([(Key::from("a"), 2), (Key::from("b"), 2)]),
            total: 4,
        },
    );
    assert_eq!(g.borrow().totals(), &expected);
}

#[test]
fn get_data_returns_a_sorted_cut_filtered_copy() {
    let ds = DataSet::new(people());
    let g = group(&ds, "country");

    let mut copy = data(&g);
    copy[0].value.count = 99;
    assert_eq!(
        counts(&data(&g)),
        vec![("UK".to_string(), 2), ("FR".to_string(), 1), ("DE".to_string(), 1)]
    );

    let top = g
        .borrow_mut()
        .get_data(Some(&by_count_descending), Some(1))
        .unwrap();
    assert_eq!(counts(&top), vec![("UK".to_string(), 2)]);

    g.borrow_mut().filter(|e| e.value.count == 1);
    assert_eq!(
        counts(&data(&g)),
        vec![("FR".to_string(), 1), ("DE".to_string(), 1)]
    );

    g.borrow_mut().clear_filter();
    let unlimited = g.borrow_mut().get_data(None, Some(0)).unwrap();
    assert_eq!(unlimited.len(), 3);
}

#[test]
fn ordered_data_falls_back_to_configured_top() {
    let ds = DataSet::new(people());
    let g = group(&ds, "country");
    g.borrow_mut().top(2);

    let rows = g.borrow_mut().get_ordered_data(None).unwrap();
    assert_eq!(
        counts(&rows),
        vec![("UK".to_string(), 2), ("FR".to_string(), 1)]
    );

    let rows = g.borrow_mut().get_ordered_data(Some(1)).unwrap();
    assert_eq!(counts(&rows), vec![("UK".to_string(), 2)]);
}

#[test]
fn changing_reduced_fields_after_initialize_rebuilds() {
    let ds = DataSet::new(people());
    let g = group(&ds, "country");
    g.borrow_mut().sum(["pop"]);
    let first = data(&g);
    assert!(first[0].value.occurrences("tags").is_none());
    assert!(g.borrow().is_initialized());

    g.borrow_mut().count(["tags"]);
    assert!(!g.borrow().is_initialized());

    let rebuilt = data(&g);
    assert_eq!(rebuilt[0].value.sum("pop"), Some(15.0));
    assert_eq!(rebuilt[0].value.occurrences("tags").map(|o| o.total), Some(3));
}

#[test]
fn summary_ignores_its_own_dimension_filter() {
    let ds = DataSet::new(people());
    let g = group(&ds, "country");
    g.borrow_mut().sum(["pop"]).mean(["pop"]);

    let all = g.borrow_mut().summary().unwrap();
    assert_eq!((all.count, all.sum("pop"), all.average("pop")), (4, Some(25.0), Some(6.25)));

    select(&ds, "country", "UK");
    let own = g.borrow_mut().summary().unwrap();
    assert_eq!((own.count, own.sum("pop")), (4, Some(25.0)));

    select(&ds, "language", "fr");
    let other = g.borrow_mut().summary().unwrap();
    assert_eq!((other.count, other.sum("pop")), (1, Some(7.0)));
}

#[test]
fn one_to_many_grouping_has_an_entry_per_element() {
    let ds = DataSet::new(people());
    let g = ds.group("tags", field("tags"), true).unwrap();
    assert!(g.borrow().one_to_many());

    let rows = g.borrow_mut().get_ordered_data(None).unwrap();
    assert_eq!(
        counts(&rows),
        vec![("a".to_string(), 2), ("b".to_string(), 2)]
    );

    select(&ds, "language", "en");
    let rows = g.borrow_mut().get_ordered_data(None).unwrap();
    assert_eq!(
        counts(&rows),
        vec![("b".to_string(), 2), ("a".to_string(), 1)]
    );
}

#[test]
fn disposed_grouping_rebuilds_on_next_read() {
    let ds = DataSet::new(countries());
    let g = group(&ds, "country");
    assert_eq!(data(&g).len(), 2);

    g.borrow_mut().dispose().unwrap();
    assert!(!g.borrow().is_initialized());
    assert_eq!(
        counts(&data(&g)),
        vec![("UK".to_string(), 2), ("FR".to_string(), 1)]
    );
}
