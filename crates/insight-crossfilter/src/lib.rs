//! Crossfilter-style incremental indexing for Insight.
//!
//! This crate focuses on:
//! - Slicing a record set into dimensions (single-valued or multi-valued keys).
//! - Per-dimension filters backed by pass/fail bitmaps.
//! - Keyed and whole-dimension reductions maintained incrementally through add/remove/initial
//!   reducer callbacks as filters change. A group never sees its own dimension's filter.

#![forbid(unsafe_code)]

mod bitmap;
mod crossfilter;
mod record;
mod reduce;
mod value;

pub use crate::bitmap::BitVec;
pub use crate::crossfilter::{
    Crossfilter, CrossfilterError, CrossfilterOptions, CrossfilterResult, DimensionId, GroupId,
};
pub use crate::record::Record;
pub use crate::reduce::{CountReducer, FnReducer, GroupEntry, Reducer};
pub use crate::value::{Key, Value};
