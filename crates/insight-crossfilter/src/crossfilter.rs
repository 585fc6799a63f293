#![forbid(unsafe_code)]

//! Incremental filtering and grouping over an in-memory record set.
//!
//! Every dimension caches its slice value and derived keys per record, plus a [`BitVec`] of the
//! records passing its current filter. Per record the engine also tracks how many dimensions
//! reject it. A group on dimension `g` sees a record when no dimension other than `g` rejects
//! it, so a record is visible to `g` iff its rejection count is 0, or the count is 1 and `g` is
//! the one rejecting it.
//!
//! Changing one dimension's filter only visits records whose pass state flips, and for each of
//! those only groups on other dimensions can change. Those groups receive exactly one
//! `add`/`remove` per affected key.

use crate::bitmap::BitVec;
use crate::reduce::{GroupEntry, Reducer};
use crate::record::Record;
use crate::value::{Key, Value};
use std::collections::HashMap;
use std::fmt;

pub type DimensionId = usize;
pub type GroupId = usize;

pub type CrossfilterResult<T> = Result<T, CrossfilterError>;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CrossfilterError {
    #[error("unknown dimension: {0}")]
    UnknownDimension(DimensionId),

    #[error("unknown group: {0}")]
    UnknownGroup(GroupId),

    #[error("group {0} has been disposed")]
    DisposedGroup(GroupId),

    #[error("group {0} reduces a whole dimension and has no keyed entries")]
    NotKeyed(GroupId),

    #[error("group {0} is keyed and has no single reduction")]
    NotGroupAll(GroupId),

    #[error("dimension limit reached ({limit})")]
    DimensionLimit { limit: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct CrossfilterOptions {
    /// Records to preallocate room for.
    pub record_capacity: usize,
    /// Upper bound on dimensions per crossfilter.
    pub max_dimensions: usize,
}

impl Default for CrossfilterOptions {
    fn default() -> Self {
        Self {
            record_capacity: 0,
            max_dimensions: 32,
        }
    }
}

type SliceFn = Box<dyn Fn(&Record) -> Value>;
type FilterFn = Box<dyn Fn(&Value) -> bool>;

struct DimensionSlot {
    slice: SliceFn,
    one_to_many: bool,
    values: Vec<Value>,
    keys: Vec<Vec<Key>>,
    passes: BitVec,
    filter: Option<FilterFn>,
}

impl DimensionSlot {
    fn keys_for(&self, value: &Value) -> Vec<Key> {
        if !self.one_to_many {
            return vec![Key::from_value(value)];
        }
        match value {
            Value::Null => Vec::new(),
            value => value.keys(),
        }
    }

    fn passes(&self, value: &Value) -> bool {
        self.filter.as_ref().map_or(true, |f| f(value))
    }
}

enum GroupKind<V> {
    Keyed {
        entries: Vec<GroupEntry<V>>,
        index: HashMap<Key, usize>,
    },
    All(V),
}

struct GroupSlot<V> {
    dimension: DimensionId,
    reducer: Box<dyn Reducer<V>>,
    kind: GroupKind<V>,
}

impl<V> GroupSlot<V> {
    fn reduce(&mut self, keys: &[Key], record: &Record, add: bool) {
        match &mut self.kind {
            GroupKind::Keyed { entries, index } => {
                for key in keys {
                    let idx = match index.get(key) {
                        Some(&idx) => idx,
                        None => {
                            let idx = entries.len();
                            entries.push(GroupEntry {
                                key: key.clone(),
                                value: self.reducer.initial(),
                            });
                            index.insert(key.clone(), idx);
                            idx
                        }
                    };
                    let acc = &mut entries[idx].value;
                    if add {
                        self.reducer.add(acc, record);
                    } else {
                        self.reducer.remove(acc, record);
                    }
                }
            }
            GroupKind::All(acc) => {
                if add {
                    self.reducer.add(acc, record);
                } else {
                    self.reducer.remove(acc, record);
                }
            }
        }
    }
}

#[inline]
fn visible_with(rejections: u32, passes_own: bool) -> bool {
    rejections == 0 || (rejections == 1 && !passes_own)
}

/// A filterable record set with incrementally maintained groups.
pub struct Crossfilter<V> {
    options: CrossfilterOptions,
    records: Vec<Record>,
    rejections: Vec<u32>,
    dimensions: Vec<DimensionSlot>,
    groups: Vec<Option<GroupSlot<V>>>,
}

impl<V> fmt::Debug for Crossfilter<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crossfilter")
            .field("records", &self.records.len())
            .field("dimensions", &self.dimensions.len())
            .field("groups", &self.groups.iter().flatten().count())
            .finish()
    }
}

impl<V> Default for Crossfilter<V> {
    fn default() -> Self {
        Self::new(CrossfilterOptions::default())
    }
}

impl<V> Crossfilter<V> {
    pub fn new(options: CrossfilterOptions) -> Self {
        Self {
            options,
            records: Vec::with_capacity(options.record_capacity),
            rejections: Vec::with_capacity(options.record_capacity),
            dimensions: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn with_records(records: impl IntoIterator<Item = Record>, options: CrossfilterOptions) -> Self {
        let mut crossfilter = Self::new(options);
        crossfilter.add(records);
        crossfilter
    }

    pub fn options(&self) -> &CrossfilterOptions {
        &self.options
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn record(&self, row: usize) -> Option<&Record> {
        self.records.get(row)
    }

    pub fn dimension_count(&self) -> usize {
        self.dimensions.len()
    }

    /// Appends records, reducing each one into every existing group it is visible to.
    pub fn add(&mut self, records: impl IntoIterator<Item = Record>) {
        let mut added = 0usize;
        for record in records {
            let row = self.records.len();
            let mut rejected = 0u32;
            for slot in &mut self.dimensions {
                let value = (slot.slice)(&record);
                let passes = slot.passes(&value);
                let keys = slot.keys_for(&value);
                slot.keys.push(keys);
                slot.values.push(value);
                slot.passes.push(passes);
                if !passes {
                    rejected += 1;
                }
            }
            self.rejections.push(rejected);

            for group in self.groups.iter_mut().flatten() {
                let own = &self.dimensions[group.dimension];
                if visible_with(rejected, own.passes.get(row)) {
                    group.reduce(&own.keys[row], &record, true);
                }
            }
            self.records.push(record);
            added += 1;
        }
        log::trace!("crossfilter: added {added} records (size {})", self.records.len());
    }

    /// Registers a slicing function; it runs once per record now and once per record added later.
    pub fn dimension(
        &mut self,
        slice: impl Fn(&Record) -> Value + 'static,
        one_to_many: bool,
    ) -> CrossfilterResult<DimensionId> {
        if self.dimensions.len() >= self.options.max_dimensions {
            return Err(CrossfilterError::DimensionLimit {
                limit: self.options.max_dimensions,
            });
        }

        let mut slot = DimensionSlot {
            slice: Box::new(slice),
            one_to_many,
            values: Vec::with_capacity(self.records.len()),
            keys: Vec::with_capacity(self.records.len()),
            passes: BitVec::with_len_all_true(self.records.len()),
            filter: None,
        };
        for record in &self.records {
            let value = (slot.slice)(record);
            let keys = slot.keys_for(&value);
            slot.values.push(value);
            slot.keys.push(keys);
        }

        let id = self.dimensions.len();
        self.dimensions.push(slot);
        log::debug!("crossfilter: dimension {id} created (one_to_many: {one_to_many})");
        Ok(id)
    }

    pub fn is_dimension_filtered(&self, dimension: DimensionId) -> CrossfilterResult<bool> {
        Ok(self.dimension_slot(dimension)?.filter.is_some())
    }

    /// Keeps only records whose slice value satisfies `predicate` on this dimension.
    pub fn filter(
        &mut self,
        dimension: DimensionId,
        predicate: impl Fn(&Value) -> bool + 'static,
    ) -> CrossfilterResult<()> {
        self.install_filter(dimension, Some(Box::new(predicate)))
    }

    /// Removes this dimension's filter.
    pub fn filter_all(&mut self, dimension: DimensionId) -> CrossfilterResult<()> {
        self.install_filter(dimension, None)
    }

    fn install_filter(
        &mut self,
        dimension: DimensionId,
        filter: Option<FilterFn>,
    ) -> CrossfilterResult<()> {
        let Self {
            records,
            rejections,
            dimensions,
            groups,
            ..
        } = self;

        let slot = dimensions
            .get_mut(dimension)
            .ok_or(CrossfilterError::UnknownDimension(dimension))?;
        slot.filter = filter;

        let changed: Vec<(usize, bool)> = slot
            .values
            .iter()
            .enumerate()
            .filter_map(|(row, value)| {
                let passes = slot.passes(value);
                (passes != slot.passes.get(row)).then_some((row, passes))
            })
            .collect();

        let mut entered = 0usize;
        for &(row, passes) in &changed {
            let before = rejections[row];
            let after = if passes { before - 1 } else { before + 1 };
            rejections[row] = after;

            for group in groups.iter_mut().flatten() {
                if group.dimension == dimension {
                    continue;
                }
                let own = &dimensions[group.dimension];
                let passes_own = own.passes.get(row);
                let was_visible = visible_with(before, passes_own);
                let is_visible = visible_with(after, passes_own);
                if was_visible != is_visible {
                    log::trace!(
                        "crossfilter: record {row} {} group on dimension {}",
                        if is_visible { "enters" } else { "leaves" },
                        group.dimension
                    );
                    group.reduce(&own.keys[row], &records[row], is_visible);
                }
            }

            dimensions[dimension].passes.set(row, passes);
            if passes {
                entered += 1;
            }
        }

        log::debug!(
            "crossfilter: dimension {dimension} filter updated, {} records changed ({entered} in, {} out), {} of {} pass",
            changed.len(),
            changed.len() - entered,
            dimensions[dimension].passes.count_ones(),
            records.len()
        );
        Ok(())
    }

    /// A keyed group: one entry per distinct key, in first-seen order.
    pub fn group(
        &mut self,
        dimension: DimensionId,
        reducer: impl Reducer<V> + 'static,
    ) -> CrossfilterResult<GroupId> {
        self.dimension_slot(dimension)?;
        self.build_group(
            dimension,
            Box::new(reducer),
            |_| GroupKind::Keyed {
                entries: Vec::new(),
                index: HashMap::new(),
            },
        )
    }

    /// A single reduction across every record visible to `dimension`.
    pub fn group_all(
        &mut self,
        dimension: DimensionId,
        reducer: impl Reducer<V> + 'static,
    ) -> CrossfilterResult<GroupId> {
        self.dimension_slot(dimension)?;
        self.build_group(dimension, Box::new(reducer), |reducer| {
            GroupKind::All(reducer.initial())
        })
    }

    fn build_group(
        &mut self,
        dimension: DimensionId,
        reducer: Box<dyn Reducer<V>>,
        kind: impl FnOnce(&dyn Reducer<V>) -> GroupKind<V>,
    ) -> CrossfilterResult<GroupId> {
        let kind = kind(reducer.as_ref());
        let mut slot = GroupSlot {
            dimension,
            reducer,
            kind,
        };

        let own = &self.dimensions[dimension];
        for (row, record) in self.records.iter().enumerate() {
            if visible_with(self.rejections[row], own.passes.get(row)) {
                slot.reduce(&own.keys[row], record, true);
            }
        }

        let id = self.groups.len();
        self.groups.push(Some(slot));
        log::debug!("crossfilter: group {id} created on dimension {dimension}");
        Ok(id)
    }

    /// Releases a group; its id is never reused.
    pub fn dispose(&mut self, group: GroupId) -> CrossfilterResult<()> {
        let slot = self
            .groups
            .get_mut(group)
            .ok_or(CrossfilterError::UnknownGroup(group))?;
        if slot.take().is_none() {
            return Err(CrossfilterError::DisposedGroup(group));
        }
        log::debug!("crossfilter: group {group} disposed");
        Ok(())
    }

    pub fn entries(&self, group: GroupId) -> CrossfilterResult<&[GroupEntry<V>]> {
        match &self.group_slot(group)?.kind {
            GroupKind::Keyed { entries, .. } => Ok(entries.as_slice()),
            GroupKind::All(_) => Err(CrossfilterError::NotKeyed(group)),
        }
    }

    pub fn entries_mut(&mut self, group: GroupId) -> CrossfilterResult<&mut [GroupEntry<V>]> {
        match &mut self.group_slot_mut(group)?.kind {
            GroupKind::Keyed { entries, .. } => Ok(entries.as_mut_slice()),
            GroupKind::All(_) => Err(CrossfilterError::NotKeyed(group)),
        }
    }

    pub fn value(&self, group: GroupId) -> CrossfilterResult<&V> {
        match &self.group_slot(group)?.kind {
            GroupKind::All(value) => Ok(value),
            GroupKind::Keyed { .. } => Err(CrossfilterError::NotGroupAll(group)),
        }
    }

    pub fn value_mut(&mut self, group: GroupId) -> CrossfilterResult<&mut V> {
        match &mut self.group_slot_mut(group)?.kind {
            GroupKind::All(value) => Ok(value),
            GroupKind::Keyed { .. } => Err(CrossfilterError::NotGroupAll(group)),
        }
    }

    /// Whether record `row` passes every active filter.
    pub fn passes_all(&self, row: usize) -> bool {
        self.rejections.get(row).is_some_and(|&r| r == 0)
    }

    /// Records passing every active filter, in insertion order.
    pub fn all_filtered(&self) -> impl Iterator<Item = &Record> + '_ {
        self.records
            .iter()
            .zip(&self.rejections)
            .filter_map(|(record, &rejected)| (rejected == 0).then_some(record))
    }

    pub fn filtered_count(&self) -> usize {
        self.rejections.iter().filter(|&&r| r == 0).count()
    }

    fn dimension_slot(&self, dimension: DimensionId) -> CrossfilterResult<&DimensionSlot> {
        self.dimensions
            .get(dimension)
            .ok_or(CrossfilterError::UnknownDimension(dimension))
    }

    fn group_slot(&self, group: GroupId) -> CrossfilterResult<&GroupSlot<V>> {
        self.groups
            .get(group)
            .ok_or(CrossfilterError::UnknownGroup(group))?
            .as_ref()
            .ok_or(CrossfilterError::DisposedGroup(group))
    }

    fn group_slot_mut(&mut self, group: GroupId) -> CrossfilterResult<&mut GroupSlot<V>> {
        self.groups
            .get_mut(group)
            .ok_or(CrossfilterError::UnknownGroup(group))?
            .as_mut()
            .ok_or(CrossfilterError::DisposedGroup(group))
    }
}
