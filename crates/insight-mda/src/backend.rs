use crate::dimension::{Dimension, DimensionHandle};
use crate::error::{MdaError, MdaResult};
use crate::grouping::{GroupValue, Grouping, GroupingHandle};
use insight_crossfilter::{
    Crossfilter, CrossfilterOptions, CrossfilterResult, DimensionId, GroupEntry, GroupId, Record,
    Reducer, Value,
};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub type SliceFn = Box<dyn Fn(&Record) -> Value>;
pub type PredicateFn = Box<dyn Fn(&Value) -> bool>;

/// Incremental indexing collaborator used by dimensions and groupings.
///
/// The aggregation layer relies on this trait to:
/// - slice records into dimensions and install/clear per-dimension filters
/// - build keyed and whole-dimension reductions that stay current as filters change
/// - read (and, for the derived statistics pass, annotate) reduced group entries
///
/// A group must never observe its own dimension's filter.
pub trait FilterEngine: fmt::Debug {
    fn size(&self) -> usize;
    fn add(&mut self, records: Vec<Record>);

    fn dimension(&mut self, slice: SliceFn, one_to_many: bool) -> CrossfilterResult<DimensionId>;
    fn filter(&mut self, dimension: DimensionId, predicate: PredicateFn) -> CrossfilterResult<()>;
    fn filter_all(&mut self, dimension: DimensionId) -> CrossfilterResult<()>;

    fn group(
        &mut self,
        dimension: DimensionId,
        reducer: Box<dyn Reducer<GroupValue>>,
    ) -> CrossfilterResult<GroupId>;
    fn group_all(
        &mut self,
        dimension: DimensionId,
        reducer: Box<dyn Reducer<GroupValue>>,
    ) -> CrossfilterResult<GroupId>;
    fn dispose(&mut self, group: GroupId) -> CrossfilterResult<()>;

    fn entries(&self, group: GroupId) -> CrossfilterResult<&[GroupEntry<GroupValue>]>;
    fn entries_mut(&mut self, group: GroupId)
        -> CrossfilterResult<&mut [GroupEntry<GroupValue>]>;
    fn value(&self, group: GroupId) -> CrossfilterResult<&GroupValue>;

    /// Records passing every active filter, in insertion order.
    fn filtered_records(&self) -> Vec<Record>;
}

impl FilterEngine for Crossfilter<GroupValue> {
    fn size(&self) -> usize {
        Crossfilter::size(self)
    }

    fn add(&mut self, records: Vec<Record>) {
        Crossfilter::add(self, records)
    }

    fn dimension(&mut self, slice: SliceFn, one_to_many: bool) -> CrossfilterResult<DimensionId> {
        Crossfilter::dimension(self, slice, one_to_many)
    }

    fn filter(&mut self, dimension: DimensionId, predicate: PredicateFn) -> CrossfilterResult<()> {
        Crossfilter::filter(self, dimension, predicate)
    }

    fn filter_all(&mut self, dimension: DimensionId) -> CrossfilterResult<()> {
        Crossfilter::filter_all(self, dimension)
    }

    fn group(
        &mut self,
        dimension: DimensionId,
        reducer: Box<dyn Reducer<GroupValue>>,
    ) -> CrossfilterResult<GroupId> {
        Crossfilter::group(self, dimension, reducer)
    }

    fn group_all(
        &mut self,
        dimension: DimensionId,
        reducer: Box<dyn Reducer<GroupValue>>,
    ) -> CrossfilterResult<GroupId> {
        Crossfilter::group_all(self, dimension, reducer)
    }

    fn dispose(&mut self, group: GroupId) -> CrossfilterResult<()> {
        Crossfilter::dispose(self, group)
    }

    fn entries(&self, group: GroupId) -> CrossfilterResult<&[GroupEntry<GroupValue>]> {
        Crossfilter::entries(self, group)
    }

    fn entries_mut(
        &mut self,
        group: GroupId,
    ) -> CrossfilterResult<&mut [GroupEntry<GroupValue>]> {
        Crossfilter::entries_mut(self, group)
    }

    fn value(&self, group: GroupId) -> CrossfilterResult<&GroupValue> {
        Crossfilter::value(self, group)
    }

    fn filtered_records(&self) -> Vec<Record> {
        self.all_filtered().cloned().collect()
    }
}

/// Single-threaded shared handle to a filter engine.
pub type SharedEngine = Rc<RefCell<dyn FilterEngine>>;

pub(crate) fn borrow_engine(
    engine: &SharedEngine,
) -> MdaResult<Ref<'_, dyn FilterEngine + 'static>> {
    engine.try_borrow().map_err(|_| MdaError::EngineBusy)
}

pub(crate) fn borrow_engine_mut(
    engine: &SharedEngine,
) -> MdaResult<RefMut<'_, dyn FilterEngine + 'static>> {
    engine.try_borrow_mut().map_err(|_| MdaError::EngineBusy)
}

/// A filterable dataset: one engine plus the dimensions sliced from it, keyed by name.
///
/// Cloning a `DataSet` yields another handle to the same engine and dimension cache.
#[derive(Clone)]
pub struct DataSet {
    engine: SharedEngine,
    dimensions: Rc<RefCell<HashMap<String, DimensionHandle>>>,
}

impl fmt::Debug for DataSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .dimensions
            .try_borrow()
            .map(|dims| dims.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("DataSet")
            .field("engine", &self.engine)
            .field("dimensions", &names)
            .finish()
    }
}

impl DataSet {
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self::with_options(records, CrossfilterOptions::default())
    }

    pub fn with_options(
        records: impl IntoIterator<Item = Record>,
        options: CrossfilterOptions,
    ) -> Self {
        let crossfilter: Crossfilter<GroupValue> = Crossfilter::with_records(records, options);
        Self::with_engine(Rc::new(RefCell::new(crossfilter)))
    }

    pub fn with_engine(engine: SharedEngine) -> Self {
        Self {
            engine,
            dimensions: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    pub fn len(&self) -> MdaResult<usize> {
        Ok(borrow_engine(&self.engine)?.size())
    }

    pub fn is_empty(&self) -> MdaResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Appends records. Existing groups pick them up immediately; call `recalculate` on
    /// groupings afterwards to refresh derived statistics.
    pub fn add(&self, records: impl IntoIterator<Item = Record>) -> MdaResult<()> {
        borrow_engine_mut(&self.engine)?.add(records.into_iter().collect());
        Ok(())
    }

    /// Returns the dimension called `name`, creating it from `slice` on first use.
    ///
    /// Later calls with the same name reuse the cached dimension and ignore `slice`. Asking for
    /// the cached name with a different `one_to_many` is `DimensionKindMismatch`.
    pub fn dimension(
        &self,
        name: &str,
        slice: impl Fn(&Record) -> Value + 'static,
        one_to_many: bool,
    ) -> MdaResult<DimensionHandle> {
        if let Some(existing) = self.cached_dimension(name) {
            let cached_kind = existing
                .try_borrow()
                .map_err(|_| MdaError::DimensionBusy {
                    dimension: name.to_string(),
                })?
                .one_to_many();
            if cached_kind != one_to_many {
                return Err(MdaError::DimensionKindMismatch {
                    dimension: name.to_string(),
                    existing: cached_kind,
                });
            }
            return Ok(existing);
        }

        let id = borrow_engine_mut(&self.engine)?.dimension(Box::new(slice), one_to_many)?;
        let dimension = Rc::new(RefCell::new(Dimension::new(
            name,
            one_to_many,
            self.engine.clone(),
            id,
        )));
        self.dimensions
            .borrow_mut()
            .insert(name.to_string(), dimension.clone());
        log::debug!("dataset: dimension {name:?} created (engine dimension {id})");
        Ok(dimension)
    }

    /// Dimension sliced by the record field of the same name.
    pub fn field_dimension(&self, field: &str, one_to_many: bool) -> MdaResult<DimensionHandle> {
        let owned = field.to_string();
        self.dimension(
            field,
            move |record| record.get(&owned).cloned().unwrap_or_default(),
            one_to_many,
        )
    }

    /// A fresh grouping over the (possibly cached) dimension called `name`.
    pub fn group(
        &self,
        name: &str,
        slice: impl Fn(&Record) -> Value + 'static,
        one_to_many: bool,
    ) -> MdaResult<GroupingHandle> {
        let dimension = self.dimension(name, slice, one_to_many)?;
        Ok(Grouping::new(&dimension)?.into_handle())
    }

    pub fn cached_dimension(&self, name: &str) -> Option<DimensionHandle> {
        self.dimensions.borrow().get(name).cloned()
    }

    pub fn filtered_records(&self) -> MdaResult<Vec<Record>> {
        Ok(borrow_engine(&self.engine)?.filtered_records())
    }
}
