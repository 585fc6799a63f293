mod common;

use common::{chart, data, group, handle};
use insight_mda::{DataSet, FilterCoordinator, GroupEntry, GroupingHandle, Record, Value};
use proptest::prelude::*;

const COUNTRIES: [&str; 3] = ["UK", "FR", "DE"];
const LANGUAGES: [&str; 3] = ["en", "fr", "de"];
const DIMENSIONS: [&str; 2] = ["country", "language"];

fn record() -> impl Strategy<Value = Record> {
    (0..COUNTRIES.len(), 0..LANGUAGES.len(), 0i64..50).prop_map(|(c, l, pop)| {
        Record::new()
            .with("country", COUNTRIES[c])
            .with("language", LANGUAGES[l])
            .with("pop", pop)
    })
}

fn selection() -> impl Strategy<Value = (usize, usize)> {
    (0..DIMENSIONS.len(), 0..COUNTRIES.len())
}

fn value_for(dimension: usize, idx: usize) -> Value {
    if dimension == 0 {
        Value::from(COUNTRIES[idx])
    } else {
        Value::from(LANGUAGES[idx])
    }
}

fn snapshot(groupings: &[GroupingHandle]) -> Vec<Vec<GroupEntry>> {
    groupings.iter().map(data).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn selecting_twice_restores_everything(
        records in proptest::collection::vec(record(), 1..40),
        prefix in proptest::collection::vec(selection(), 0..6),
        repeated in selection(),
    ) {
        let ds = DataSet::new(records);
        let groupings: Vec<GroupingHandle> = DIMENSIONS
            .iter()
            .map(|name| {
                let g = group(&ds, *name);
                g.borrow_mut().sum(["pop"]).mean(["pop"]);
                g
            })
            .collect();

        let mut coordinator = FilterCoordinator::new();
        for g in &groupings {
            coordinator.register(handle(&chart("chart", g))).unwrap();
        }

        for (dimension, idx) in prefix {
            coordinator
                .on_selection(&groupings[dimension], &value_for(dimension, idx))
                .unwrap();
        }

        let before = snapshot(&groupings);
        for entry in before.iter().flatten() {
            let average = entry.value.average("pop").unwrap_or_default();
            prop_assert!(average.is_finite());
            if entry.value.count == 0 {
                prop_assert_eq!(average, 0.0);
            }
        }
        let filtered_before: Vec<String> =
            coordinator.filtered_dimension_names().map(String::from).collect();
        let visible_before = ds.filtered_records().unwrap().len();

        let (dimension, idx) = repeated;
        let value = value_for(dimension, idx);
        coordinator.on_selection(&groupings[dimension], &value).unwrap();
        coordinator.on_selection(&groupings[dimension], &value).unwrap();

        prop_assert_eq!(snapshot(&groupings), before);
        let filtered_after: Vec<String> =
            coordinator.filtered_dimension_names().map(String::from).collect();
        prop_assert_eq!(filtered_after, filtered_before);
        prop_assert_eq!(ds.filtered_records().unwrap().len(), visible_before);
    }
}
