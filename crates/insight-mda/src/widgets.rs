//! Headless chart and table widgets.
//!
//! They render into plain frames (one item per group entry, tagged with its selector and
//! selected/not-selected class) instead of drawing, which is all the coordination layer needs.

use crate::error::{MdaError, MdaResult};
use crate::grouping::{GroupEntry, GroupingHandle};
use crate::selector::DimensionSelector;
use crate::widget::{ClassName, SelectionSink, SelectionState, Widget};
use insight_crossfilter::{Key, Value};

#[derive(Clone, Debug, PartialEq)]
pub struct RenderedItem {
    pub key: Key,
    pub selector: DimensionSelector,
    pub value: Option<f64>,
    pub class: Option<ClassName>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SeriesFrame {
    pub series: String,
    pub items: Vec<RenderedItem>,
}

fn read_rows(
    data: &GroupingHandle,
    ordered: bool,
    top: Option<usize>,
) -> MdaResult<Vec<GroupEntry>> {
    let mut grouping = data.try_borrow_mut().map_err(|_| MdaError::GroupingBusy)?;
    if ordered {
        grouping.get_ordered_data(top)
    } else {
        grouping.get_data(None, top)
    }
}

/// One grouping plotted by a [`Chart`].
#[derive(Clone, Debug)]
pub struct Series {
    name: String,
    data: GroupingHandle,
    value_path: String,
    top: Option<usize>,
    ordered: bool,
}

impl Series {
    pub fn new(name: &str, data: &GroupingHandle) -> Self {
        Self {
            name: name.to_string(),
            data: data.clone(),
            value_path: "Count".to_string(),
            top: None,
            ordered: false,
        }
    }

    /// Path (as understood by `GroupValue::resolve`) of the plotted value.
    pub fn value_path(mut self, path: &str) -> Self {
        self.value_path = path.to_string();
        self
    }

    pub fn top(mut self, top: usize) -> Self {
        self.top = Some(top);
        self
    }

    pub fn ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &GroupingHandle {
        &self.data
    }

    pub fn slice_selector(entry: &GroupEntry) -> DimensionSelector {
        DimensionSelector::from_key(&entry.key)
    }

    fn render(&self, selection: &SelectionState) -> MdaResult<SeriesFrame> {
        let rows = read_rows(&self.data, self.ordered, self.top)?;
        let items = rows
            .iter()
            .map(|entry| {
                let selector = Self::slice_selector(entry);
                RenderedItem {
                    key: entry.key.clone(),
                    value: entry.value.resolve(&self.value_path),
                    class: selection.class_for(&selector),
                    selector,
                }
            })
            .collect();
        Ok(SeriesFrame {
            series: self.name.clone(),
            items,
        })
    }
}

fn restyle(items: &mut [RenderedItem], selection: &SelectionState) {
    for item in items {
        item.class = selection.class_for(&item.selector);
    }
}

#[derive(Debug, Default)]
pub struct Chart {
    name: String,
    series: Vec<Series>,
    selection: SelectionState,
    sink: Option<SelectionSink>,
    frames: Vec<SeriesFrame>,
    draw_count: usize,
}

impl Chart {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    pub fn add_series(&mut self, series: Series) -> &mut Self {
        self.series.push(series);
        self
    }

    pub fn series(&self) -> &[Series] {
        &self.series
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn frames(&self) -> &[SeriesFrame] {
        &self.frames
    }

    pub fn draw_count(&self) -> usize {
        self.draw_count
    }

    /// A user picking `value` in series `series`. Returns `false` when the chart is not wired to
    /// a coordinator (or the series does not exist) and nothing was emitted.
    pub fn click(&self, series: usize, value: impl Into<Value>) -> bool {
        match (&self.sink, self.series.get(series)) {
            (Some(sink), Some(series)) => {
                sink.emit(series.data(), value);
                true
            }
            _ => false,
        }
    }
}

impl Widget for Chart {
    fn name(&self) -> &str {
        &self.name
    }

    fn groupings(&self) -> Vec<GroupingHandle> {
        self.series.iter().map(|s| s.data.clone()).collect()
    }

    fn highlight(&mut self, selector: &DimensionSelector) {
        self.selection.toggle(selector);
        for frame in &mut self.frames {
            restyle(&mut frame.items, &self.selection);
        }
    }

    fn redraw(&mut self) -> MdaResult<()> {
        let frames = self
            .series
            .iter()
            .map(|series| series.render(&self.selection))
            .collect::<MdaResult<Vec<_>>>()?;
        self.frames = frames;
        self.draw_count += 1;
        log::trace!("chart {:?} drawn ({} series)", self.name, self.frames.len());
        Ok(())
    }

    fn bind_selection(&mut self, sink: SelectionSink) {
        self.sink = Some(sink);
    }

    fn unbind_selection(&mut self) {
        self.sink = None;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableRow {
    pub key: Key,
    pub selector: DimensionSelector,
    pub cells: Vec<Option<f64>>,
    pub class: Option<ClassName>,
}

/// A grouping rendered as rows, one column per value path.
#[derive(Debug)]
pub struct Table {
    name: String,
    data: GroupingHandle,
    columns: Vec<String>,
    top: Option<usize>,
    selection: SelectionState,
    sink: Option<SelectionSink>,
    rows: Vec<TableRow>,
    draw_count: usize,
}

impl Table {
    pub fn new(name: &str, data: &GroupingHandle) -> Self {
        Self {
            name: name.to_string(),
            data: data.clone(),
            columns: vec!["Count".to_string()],
            top: None,
            selection: SelectionState::default(),
            sink: None,
            rows: Vec::new(),
            draw_count: 0,
        }
    }

    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn top(mut self, top: usize) -> Self {
        self.top = Some(top);
        self
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn draw_count(&self) -> usize {
        self.draw_count
    }

    pub fn click(&self, value: impl Into<Value>) -> bool {
        match &self.sink {
            Some(sink) => {
                sink.emit(&self.data, value);
                true
            }
            None => false,
        }
    }
}

impl Widget for Table {
    fn name(&self) -> &str {
        &self.name
    }

    fn groupings(&self) -> Vec<GroupingHandle> {
        vec![self.data.clone()]
    }

    fn highlight(&mut self, selector: &DimensionSelector) {
        self.selection.toggle(selector);
        for row in &mut self.rows {
            row.class = self.selection.class_for(&row.selector);
        }
    }

    fn redraw(&mut self) -> MdaResult<()> {
        // Tables always list rows in the grouping's own order.
        let entries = read_rows(&self.data, true, self.top)?;
        self.rows = entries
            .iter()
            .map(|entry| {
                let selector = DimensionSelector::from_key(&entry.key);
                TableRow {
                    key: entry.key.clone(),
                    cells: self
                        .columns
                        .iter()
                        .map(|path| entry.value.resolve(path))
                        .collect(),
                    class: self.selection.class_for(&selector),
                    selector,
                }
            })
            .collect();
        self.draw_count += 1;
        log::trace!("table {:?} drawn ({} rows)", self.name, self.rows.len());
        Ok(())
    }

    fn bind_selection(&mut self, sink: SelectionSink) {
        self.sink = Some(sink);
    }

    fn unbind_selection(&mut self) {
        self.sink = None;
    }
}
