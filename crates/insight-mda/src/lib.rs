#![forbid(unsafe_code)]

mod backend;
mod coordinator;
mod dimension;
mod error;
mod grouping;
mod selector;
mod widget;
mod widgets;

pub use crate::backend::{DataSet, FilterEngine, PredicateFn, SharedEngine, SliceFn};
pub use crate::coordinator::{CoordinatorOptions, FilterCoordinator};
pub use crate::dimension::{Dimension, DimensionHandle, FilterPredicate, FilterToggle, MatchMode};
pub use crate::error::{MdaError, MdaResult};
pub use crate::grouping::{
    by_count_descending, EntryFilter, FieldAggregate, GroupEntry, GroupReducer, GroupTotals,
    GroupValue, Grouping, GroupingHandle, Occurrences, OrderFn,
};
pub use crate::selector::DimensionSelector;
pub use crate::widget::{
    ClassName, Selection, SelectionSink, SelectionState, Widget, WidgetHandle,
};
pub use crate::widgets::{Chart, RenderedItem, Series, SeriesFrame, Table, TableRow};

pub use insight_crossfilter::{CrossfilterError, CrossfilterOptions, Key, Record, Value};
