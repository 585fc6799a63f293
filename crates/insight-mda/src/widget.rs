use crate::error::MdaResult;
use crate::grouping::GroupingHandle;
use crate::selector::DimensionSelector;
use insight_crossfilter::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// Capability interface for anything a [`crate::FilterCoordinator`] can drive.
pub trait Widget {
    fn name(&self) -> &str;

    /// Groupings this widget renders. Each one subscribes the widget to its dimension's name.
    fn groupings(&self) -> Vec<GroupingHandle>;

    /// Toggles the selected state of elements matching `selector`. Unknown selectors are fine.
    fn highlight(&mut self, selector: &DimensionSelector);

    /// Pulls fresh rows from the groupings.
    fn redraw(&mut self) -> MdaResult<()>;

    /// Receives the sink user selections should be emitted into. Unregistered widgets never get
    /// one.
    fn bind_selection(&mut self, _sink: SelectionSink) {}

    /// Drops the sink installed by [`Widget::bind_selection`].
    fn unbind_selection(&mut self) {}
}

pub type WidgetHandle = Rc<RefCell<dyn Widget>>;

/// One user selection: the grouping whose element was picked and the picked value.
#[derive(Clone, Debug)]
pub struct Selection {
    pub source: GroupingHandle,
    pub value: Value,
}

/// Queue that widgets push selections into; the coordinator drains it.
#[derive(Clone, Default)]
pub struct SelectionSink {
    queue: Rc<RefCell<VecDeque<Selection>>>,
}

impl fmt::Debug for SelectionSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionSink")
            .field("pending", &self.len())
            .finish()
    }
}

impl SelectionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, source: &GroupingHandle, value: impl Into<Value>) {
        let value = value.into();
        log::trace!("selection queued: {value}");
        self.queue.borrow_mut().push_back(Selection {
            source: source.clone(),
            value,
        });
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn drain(&self) -> Vec<Selection> {
        self.queue.borrow_mut().drain(..).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassName {
    Selected,
    NotSelected,
}

impl ClassName {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassName::Selected => "selected",
            ClassName::NotSelected => "notselected",
        }
    }
}

/// The selected selectors of one widget, in selection order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionState {
    selected: Vec<DimensionSelector>,
}

impl SelectionState {
    /// Returns whether `selector` is selected afterwards.
    pub fn toggle(&mut self, selector: &DimensionSelector) -> bool {
        match self.selected.iter().position(|s| s == selector) {
            Some(idx) => {
                self.selected.remove(idx);
                false
            }
            None => {
                self.selected.push(selector.clone());
                true
            }
        }
    }

    pub fn is_selected(&self, selector: &DimensionSelector) -> bool {
        self.selected.contains(selector)
    }

    pub fn selected(&self) -> &[DimensionSelector] {
        &self.selected
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// `None` while nothing is selected; otherwise every element is either selected or dimmed.
    pub fn class_for(&self, selector: &DimensionSelector) -> Option<ClassName> {
        if self.selected.is_empty() {
            None
        } else if self.is_selected(selector) {
            Some(ClassName::Selected)
        } else {
            Some(ClassName::NotSelected)
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }
}
