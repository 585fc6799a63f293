#![allow(dead_code)]

use insight_mda::{
    Chart, DataSet, GroupEntry, GroupingHandle, Record, Series, Table, Value, WidgetHandle,
};
use std::cell::RefCell;
use std::rc::Rc;

pub fn field(name: &'static str) -> impl Fn(&Record) -> Value {
    move |record| record.get(name).cloned().unwrap_or_default()
}

/// The three-record example: two UK rows and one FR row.
pub fn countries() -> Vec<Record> {
    vec![
        Record::new().with("country", "UK").with("pop", 10),
        Record::new().with("country", "UK").with("pop", 5),
        Record::new().with("country", "FR").with("pop", 7),
    ]
}

/// Four records with a language column and a multi-valued `tags` column.
pub fn people() -> Vec<Record> {
    vec![
        Record::new()
            .with("country", "UK")
            .with("language", "en")
            .with("pop", 10)
            .with("tags", vec!["a", "b"]),
        Record::new()
            .with("country", "UK")
            .with("language", "en")
            .with("pop", 5)
            .with("tags", vec!["b"]),
        Record::new()
            .with("country", "FR")
            .with("language", "fr")
            .with("pop", 7)
            .with("tags", vec!["a"]),
        Record::new()
            .with("country", "DE")
            .with("language", "de")
            .with("pop", 3)
            .with("tags", Vec::<&str>::new()),
    ]
}

pub fn group(dataset: &DataSet, name: &'static str) -> GroupingHandle {
    dataset.group(name, field(name), false).unwrap()
}

pub fn counts(entries: &[GroupEntry]) -> Vec<(String, i64)> {
    entries
        .iter()
        .map(|e| (e.key.to_string(), e.value.count))
        .collect()
}

pub fn data(grouping: &GroupingHandle) -> Vec<GroupEntry> {
    grouping.borrow_mut().get_data(None, None).unwrap()
}

pub fn chart(name: &str, grouping: &GroupingHandle) -> Rc<RefCell<Chart>> {
    Rc::new(RefCell::new(
        Chart::new(name).with_series(Series::new(name, grouping)),
    ))
}

pub fn table(name: &str, grouping: &GroupingHandle) -> Rc<RefCell<Table>> {
    Rc::new(RefCell::new(Table::new(name, grouping)))
}

pub fn handle<W: insight_mda::Widget + 'static>(widget: &Rc<RefCell<W>>) -> WidgetHandle {
    widget.clone()
}
