//! Incrementally maintained statistics over one dimension.
//!
//! Raw aggregates (`count`, per-field `sum`, occurrence counts) are kept current by the filter
//! engine through [`GroupReducer`]'s add/remove callbacks. Everything derived from them
//! (averages, running cumulative totals and cross-entry totals) is rebuilt by
//! [`Grouping::recalculate`], which has to run after every filter change.

use crate::backend::{borrow_engine, borrow_engine_mut, SharedEngine};
use crate::dimension::DimensionHandle;
use crate::error::{MdaError, MdaResult};
use insight_crossfilter::{DimensionId, GroupId, Key, Record, Reducer, Value};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub type GroupEntry = insight_crossfilter::GroupEntry<GroupValue>;
pub type GroupingHandle = Rc<RefCell<Grouping>>;
pub type OrderFn = Rc<dyn Fn(&GroupEntry, &GroupEntry) -> Ordering>;
pub type EntryFilter = Rc<dyn Fn(&GroupEntry) -> bool>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldAggregate {
    pub sum: f64,
    pub average: f64,
}

/// How often each distinct value of a counted field occurs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Occurrences {
    pub counts: BTreeMap<Key, i64>,
    /// Always equal to the sum of `counts`.
    pub total: i64,
}

impl Occurrences {
    pub fn get(&self, key: &Key) -> i64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Looks a count up by the string form of its value.
    pub fn by_label(&self, label: &str) -> Option<i64> {
        self.counts
            .iter()
            .find(|(key, _)| key.to_string() == label)
            .map(|(_, count)| *count)
    }

    fn merge(&mut self, other: &Occurrences) {
        for (key, count) in &other.counts {
            *self.counts.entry(key.clone()).or_insert(0) += count;
        }
        self.total += other.total;
    }
}

/// The reduced value of one group entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupValue {
    pub count: i64,
    pub fields: BTreeMap<String, FieldAggregate>,
    pub occurrences: BTreeMap<String, Occurrences>,
    /// Running totals keyed by cumulative path (`"Count"` holds `CountCumulative`).
    pub cumulative: BTreeMap<String, f64>,
}

impl GroupValue {
    pub fn sum(&self, field: &str) -> Option<f64> {
        self.fields.get(field).map(|agg| agg.sum)
    }

    pub fn average(&self, field: &str) -> Option<f64> {
        self.fields.get(field).map(|agg| agg.average)
    }

    pub fn occurrences(&self, field: &str) -> Option<&Occurrences> {
        self.occurrences.get(field)
    }

    pub fn cumulative(&self, path: &str) -> Option<f64> {
        self.cumulative.get(path).copied()
    }

    /// Resolves a dotted path: `Count`, `<field>.Sum`, `<field>.Average`, `<field>.Total` or
    /// `<field>.<value>`.
    pub fn resolve(&self, path: &str) -> Option<f64> {
        if path == "Count" {
            return Some(self.count as f64);
        }
        let (field, leaf) = path.rsplit_once('.')?;
        if let Some(agg) = self.fields.get(field) {
            match leaf {
                "Sum" => return Some(agg.sum),
                "Average" => return Some(agg.average),
                _ => {}
            }
        }
        let occurrences = self.occurrences.get(field)?;
        match leaf {
            "Total" => Some(occurrences.total as f64),
            label => occurrences.by_label(label).map(|count| count as f64),
        }
    }
}

/// Add/remove/initial callbacks handed to the filter engine.
#[derive(Clone, Debug, Default)]
pub struct GroupReducer {
    sum_fields: Vec<String>,
    count_fields: Vec<String>,
}

impl GroupReducer {
    pub fn new(sum_fields: Vec<String>, count_fields: Vec<String>) -> Self {
        Self {
            sum_fields,
            count_fields,
        }
    }

    fn apply(&self, acc: &mut GroupValue, record: &Record, sign: i64) {
        acc.count += sign;

        for field in &self.sum_fields {
            if let Some(n) = record.get(field).and_then(Value::as_number) {
                acc.fields.entry(field.clone()).or_default().sum += sign as f64 * n;
            }
        }

        // A list counts each distinct element once.
        for field in &self.count_fields {
            let Some(value) = record.get(field) else {
                continue;
            };
            let occurrences = acc.occurrences.entry(field.clone()).or_default();
            for key in value.keys() {
                *occurrences.counts.entry(key).or_insert(0) += sign;
                occurrences.total += sign;
            }
        }
    }
}

impl Reducer<GroupValue> for GroupReducer {
    fn initial(&self) -> GroupValue {
        GroupValue {
            count: 0,
            fields: self
                .sum_fields
                .iter()
                .map(|f| (f.clone(), FieldAggregate::default()))
                .collect(),
            occurrences: self
                .count_fields
                .iter()
                .map(|f| (f.clone(), Occurrences::default()))
                .collect(),
            cumulative: BTreeMap::new(),
        }
    }

    fn add(&self, acc: &mut GroupValue, record: &Record) {
        self.apply(acc, record, 1);
    }

    fn remove(&self, acc: &mut GroupValue, record: &Record) {
        self.apply(acc, record, -1);
    }
}

/// Totals across every entry, for fields declared with [`Grouping::total`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupTotals {
    pub values: BTreeMap<String, f64>,
    pub occurrences: BTreeMap<String, Occurrences>,
}

/// Descending `count`.
pub fn by_count_descending(a: &GroupEntry, b: &GroupEntry) -> Ordering {
    b.value.count.cmp(&a.value.count)
}

/// `sum / count`, or 0 when there is nothing to divide by.
fn update_averages(value: &mut GroupValue, fields: &[String]) {
    let count = value.count;
    for field in fields {
        let agg = value.fields.entry(field.clone()).or_default();
        let mean = agg.sum / count as f64;
        agg.average = if count != 0 && mean.is_finite() {
            mean
        } else {
            0.0
        };
    }
}

fn unique(fields: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for field in fields {
        let field = field.into();
        if !out.contains(&field) {
            out.push(field);
        }
    }
    out
}

pub struct Grouping {
    dimension: DimensionHandle,
    dimension_name: String,
    dimension_id: DimensionId,
    one_to_many: bool,
    engine: SharedEngine,

    sum_fields: Vec<String>,
    count_fields: Vec<String>,
    mean_fields: Vec<String>,
    cumulative_fields: Vec<String>,
    total_fields: Vec<String>,
    ordered: bool,
    order_function: OrderFn,
    filter: Option<EntryFilter>,
    top_limit: Option<usize>,

    group: Option<GroupId>,
    summary: Option<GroupId>,
    stale: bool,
    totals: GroupTotals,
}

impl fmt::Debug for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grouping")
            .field("dimension", &self.dimension_name)
            .field("one_to_many", &self.one_to_many)
            .field("sum", &self.sum_fields)
            .field("count", &self.count_fields)
            .field("mean", &self.mean_fields)
            .field("cumulative", &self.cumulative_fields)
            .field("total", &self.total_fields)
            .field("ordered", &self.ordered)
            .field("top_limit", &self.top_limit)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

impl Grouping {
    pub fn new(dimension: &DimensionHandle) -> MdaResult<Self> {
        let (dimension_name, dimension_id, one_to_many, engine) = {
            let dim = dimension
                .try_borrow()
                .map_err(|_| MdaError::DimensionBusy {
                    dimension: String::from("(unknown)"),
                })?;
            (
                dim.name().to_string(),
                dim.engine_dimension(),
                dim.one_to_many(),
                dim.engine().clone(),
            )
        };

        Ok(Self {
            dimension: dimension.clone(),
            dimension_name,
            dimension_id,
            one_to_many,
            engine,
            sum_fields: Vec::new(),
            count_fields: Vec::new(),
            mean_fields: Vec::new(),
            cumulative_fields: Vec::new(),
            total_fields: Vec::new(),
            ordered: false,
            order_function: Rc::new(by_count_descending),
            filter: None,
            top_limit: None,
            group: None,
            summary: None,
            stale: false,
            totals: GroupTotals::default(),
        })
    }

    pub fn into_handle(self) -> GroupingHandle {
        Rc::new(RefCell::new(self))
    }

    pub fn dimension(&self) -> &DimensionHandle {
        &self.dimension
    }

    pub fn dimension_name(&self) -> &str {
        &self.dimension_name
    }

    pub fn one_to_many(&self) -> bool {
        self.one_to_many
    }

    pub fn sum<S: Into<String>>(&mut self, fields: impl IntoIterator<Item = S>) -> &mut Self {
        self.sum_fields = unique(fields);
        let averaged: Vec<String> = self
            .mean_fields
            .iter()
            .filter(|f| !self.sum_fields.contains(*f))
            .cloned()
            .collect();
        self.sum_fields.extend(averaged);
        self.mark_stale();
        self
    }

    pub fn count<S: Into<String>>(&mut self, fields: impl IntoIterator<Item = S>) -> &mut Self {
        self.count_fields = unique(fields);
        self.mark_stale();
        self
    }

    /// Averaged fields are also summed.
    pub fn mean<S: Into<String>>(&mut self, fields: impl IntoIterator<Item = S>) -> &mut Self {
        self.mean_fields = unique(fields);
        let missing: Vec<String> = self
            .mean_fields
            .iter()
            .filter(|f| !self.sum_fields.contains(*f))
            .cloned()
            .collect();
        if !missing.is_empty() {
            self.sum_fields.extend(missing);
            self.mark_stale();
        }
        self
    }

    pub fn cumulative<S: Into<String>>(
        &mut self,
        paths: impl IntoIterator<Item = S>,
    ) -> &mut Self {
        self.cumulative_fields = unique(paths);
        self
    }

    pub fn total<S: Into<String>>(&mut self, fields: impl IntoIterator<Item = S>) -> &mut Self {
        self.total_fields = unique(fields);
        self
    }

    pub fn ordered(&mut self, ordered: bool) -> &mut Self {
        self.ordered = ordered;
        self
    }

    pub fn order_function(
        &mut self,
        order: impl Fn(&GroupEntry, &GroupEntry) -> Ordering + 'static,
    ) -> &mut Self {
        self.order_function = Rc::new(order);
        self
    }

    /// Keeps only entries for which `filter` returns true in [`Grouping::get_data`].
    pub fn filter(&mut self, filter: impl Fn(&GroupEntry) -> bool + 'static) -> &mut Self {
        self.filter = Some(Rc::new(filter));
        self
    }

    pub fn clear_filter(&mut self) -> &mut Self {
        self.filter = None;
        self
    }

    pub fn top(&mut self, limit: usize) -> &mut Self {
        self.top_limit = Some(limit);
        self
    }

    pub fn summed_fields(&self) -> &[String] {
        &self.sum_fields
    }

    pub fn counted_fields(&self) -> &[String] {
        &self.count_fields
    }

    pub fn averaged_fields(&self) -> &[String] {
        &self.mean_fields
    }

    pub fn cumulative_fields(&self) -> &[String] {
        &self.cumulative_fields
    }

    pub fn total_fields(&self) -> &[String] {
        &self.total_fields
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn order_fn(&self) -> &OrderFn {
        &self.order_function
    }

    pub fn entry_filter(&self) -> Option<&EntryFilter> {
        self.filter.as_ref()
    }

    pub fn top_limit(&self) -> Option<usize> {
        self.top_limit
    }

    pub fn is_initialized(&self) -> bool {
        self.group.is_some() && !self.stale
    }

    pub fn totals(&self) -> &GroupTotals {
        &self.totals
    }

    fn mark_stale(&mut self) {
        if self.group.is_some() {
            self.stale = true;
        }
    }

    fn reducer(&self) -> GroupReducer {
        GroupReducer::new(self.sum_fields.clone(), self.count_fields.clone())
    }

    /// Builds the engine group (replacing any earlier one) and runs the derived pass.
    pub fn initialize(&mut self) -> MdaResult<&mut Self> {
        self.build()?;
        Ok(self)
    }

    fn build(&mut self) -> MdaResult<GroupId> {
        let group = {
            let mut engine = borrow_engine_mut(&self.engine)?;
            for old in [self.group.take(), self.summary.take()].into_iter().flatten() {
                engine.dispose(old)?;
            }
            engine.group(self.dimension_id, Box::new(self.reducer()))?
        };
        self.group = Some(group);
        self.stale = false;
        log::debug!(
            "grouping on {:?}: initialised engine group {group} (sum {:?}, count {:?})",
            self.dimension_name,
            self.sum_fields,
            self.count_fields
        );
        self.derive(group)?;
        Ok(group)
    }

    fn ensure_group(&mut self) -> MdaResult<GroupId> {
        match self.group {
            Some(group) if !self.stale => Ok(group),
            _ => self.build(),
        }
    }

    /// A copy of the entries, sorted by `order`, cut to `top`, then passed through the
    /// configured filter. A `top` of zero means no limit.
    pub fn get_data(
        &mut self,
        order: Option<&dyn Fn(&GroupEntry, &GroupEntry) -> Ordering>,
        top: Option<usize>,
    ) -> MdaResult<Vec<GroupEntry>> {
        let group = self.ensure_group()?;
        let mut data = borrow_engine(&self.engine)?.entries(group)?.to_vec();
        if let Some(order) = order {
            data.sort_by(|a, b| order(a, b));
        }
        if let Some(top) = top.filter(|&n| n > 0) {
            data.truncate(top);
        }
        if let Some(filter) = &self.filter {
            data.retain(|entry| filter(entry));
        }
        Ok(data)
    }

    /// [`Grouping::get_data`] in this grouping's own order, cut to `top` or the configured limit.
    pub fn get_ordered_data(&mut self, top: Option<usize>) -> MdaResult<Vec<GroupEntry>> {
        let order = self.order_function.clone();
        self.get_data(Some(&*order), top.or(self.top_limit))
    }

    /// Re-derives averages, cumulative totals and totals from the current raw aggregates.
    pub fn recalculate(&mut self) -> MdaResult<()> {
        match self.group {
            Some(group) if !self.stale => self.derive(group),
            _ => self.build().map(|_| ()),
        }
    }

    fn derive(&mut self, group: GroupId) -> MdaResult<()> {
        let mut engine = borrow_engine_mut(&self.engine)?;
        let entries = engine.entries_mut(group)?;

        let mut order: Vec<usize> = (0..entries.len()).collect();
        if self.ordered {
            let compare = &self.order_function;
            order.sort_by(|&a, &b| compare(&entries[a], &entries[b]));
        }

        let mut running = vec![0.0f64; self.cumulative_fields.len()];
        let mut resolved = vec![false; self.cumulative_fields.len()];
        for idx in order {
            let value = &mut entries[idx].value;

            update_averages(value, &self.mean_fields);

            value.cumulative.clear();
            for (slot, path) in self.cumulative_fields.iter().enumerate() {
                if let Some(v) = value.resolve(path) {
                    running[slot] += v;
                    resolved[slot] = true;
                    value.cumulative.insert(path.clone(), running[slot]);
                }
            }
        }

        if !entries.is_empty() {
            for (path, _) in self
                .cumulative_fields
                .iter()
                .zip(&resolved)
                .filter(|(_, ok)| !**ok)
            {
                log::warn!(
                    "grouping on {:?}: cumulative path {path:?} does not resolve on any entry",
                    self.dimension_name
                );
            }
        }

        let totals = self.compute_totals(entries);
        drop(engine);
        self.totals = totals;
        log::trace!("grouping on {:?}: derived statistics rebuilt", self.dimension_name);
        Ok(())
    }

    fn compute_totals(&self, entries: &[GroupEntry]) -> GroupTotals {
        let mut totals = GroupTotals::default();
        for field in &self.total_fields {
            if self.count_fields.contains(field) {
                let merged = totals.occurrences.entry(field.clone()).or_default();
                for entry in entries {
                    if let Some(occurrences) = entry.value.occurrences.get(field) {
                        merged.merge(occurrences);
                    }
                }
            } else if self.sum_fields.contains(field) {
                let sum = entries.iter().filter_map(|e| e.value.sum(field)).sum();
                totals.values.insert(field.clone(), sum);
            } else {
                let sum = entries.iter().filter_map(|e| e.value.resolve(field)).sum();
                totals.values.insert(field.clone(), sum);
            }
        }
        totals
    }

    /// One reduction over every record visible to this grouping's dimension.
    pub fn summary(&mut self) -> MdaResult<GroupValue> {
        self.ensure_group()?;
        let summary = match self.summary {
            Some(summary) => summary,
            None => {
                let id = borrow_engine_mut(&self.engine)?
                    .group_all(self.dimension_id, Box::new(self.reducer()))?;
                self.summary = Some(id);
                id
            }
        };

        let mut value = borrow_engine(&self.engine)?.value(summary)?.clone();
        update_averages(&mut value, &self.mean_fields);
        Ok(value)
    }

    /// Releases the engine groups. The next read rebuilds them.
    pub fn dispose(&mut self) -> MdaResult<()> {
        let mut engine = borrow_engine_mut(&self.engine)?;
        for old in [self.group.take(), self.summary.take()].into_iter().flatten() {
            engine.dispose(old)?;
        }
        self.stale = false;
        log::debug!("grouping on {:?}: disposed", self.dimension_name);
        Ok(())
    }
}
