//! Cross-widget filter coordination.
//!
//! Widgets never talk to each other. A selection made in one widget goes through
//! [`FilterCoordinator::on_selection`], which:
//! 1. toggles the selected state in every widget listening on the selection's dimension name,
//! 2. toggles the selection's filter predicate on every tracked dimension sharing that name,
//! 3. rebuilds the derived statistics of every tracked grouping, and
//! 4. redraws every registered widget.
//!
//! Dimensions are shared by name: two widgets reading two different datasets, each with a
//! dimension called `"Country"`, both filter when either one is clicked.

use crate::dimension::DimensionHandle;
use crate::error::{MdaError, MdaResult};
use crate::grouping::GroupingHandle;
use crate::selector::DimensionSelector;
use crate::widget::{SelectionSink, WidgetHandle};
use insight_crossfilter::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorOptions {
    /// Redraw every widget at the end of each selection pass.
    pub redraw_after_selection: bool,
    /// Upper bound on drain passes in [`FilterCoordinator::dispatch_pending`]. Selections
    /// emitted while a pass redraws are handled in the next pass.
    pub max_dispatch_passes: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            redraw_after_selection: true,
            max_dispatch_passes: 16,
        }
    }
}

#[derive(Clone)]
struct Registered {
    name: String,
    widget: WidgetHandle,
}

fn same_widget(a: &WidgetHandle, b: &WidgetHandle) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}

fn insert_unique<T>(items: &mut Vec<Rc<T>>, item: &Rc<T>) -> bool
where
    T: ?Sized,
{
    if items.iter().any(|existing| Rc::ptr_eq(existing, item)) {
        return false;
    }
    items.push(item.clone());
    true
}

#[derive(Default)]
pub struct FilterCoordinator {
    options: CoordinatorOptions,
    widgets: Vec<Registered>,
    dimension_listeners: BTreeMap<String, Vec<Registered>>,
    groupings: Vec<GroupingHandle>,
    dimensions: BTreeMap<String, Vec<DimensionHandle>>,
    filtered_dimensions: BTreeSet<String>,
    sink: SelectionSink,
}

impl fmt::Debug for FilterCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners: BTreeMap<&str, Vec<&str>> = self
            .dimension_listeners
            .iter()
            .map(|(dim, ws)| (dim.as_str(), ws.iter().map(|w| w.name.as_str()).collect()))
            .collect();
        f.debug_struct("FilterCoordinator")
            .field("options", &self.options)
            .field(
                "widgets",
                &self.widgets.iter().map(|w| &w.name).collect::<Vec<_>>(),
            )
            .field("dimension_listeners", &listeners)
            .field("groupings", &self.groupings.len())
            .field("filtered_dimensions", &self.filtered_dimensions)
            .field("pending", &self.sink.len())
            .finish()
    }
}

impl FilterCoordinator {
    pub fn new() -> Self {
        Self::with_options(CoordinatorOptions::default())
    }

    pub fn with_options(options: CoordinatorOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    /// Queue that registered widgets emit their selections into.
    pub fn sink(&self) -> &SelectionSink {
        &self.sink
    }

    /// Subscribes `widget` to the dimension name of every grouping it renders and starts
    /// tracking those groupings and dimensions.
    ///
    /// Registering a widget again re-reads its groupings and folds in any added since (a series
    /// added to a chart, say); groupings already tracked are left alone.
    pub fn register(&mut self, widget: WidgetHandle) -> MdaResult<&mut Self> {
        if let Some(existing) = self
            .widgets
            .iter()
            .find(|w| same_widget(&w.widget, &widget))
            .cloned()
        {
            let groupings = existing
                .widget
                .try_borrow()
                .map_err(|_| MdaError::WidgetBusy {
                    widget: existing.name.clone(),
                })?
                .groupings();
            let added = self.subscribe(&existing, &groupings)?;
            log::debug!(
                "coordinator: re-scanned widget {:?} ({} groupings, {added} newly tracked)",
                existing.name,
                groupings.len()
            );
            return Ok(self);
        }

        let (name, groupings) = {
            let mut w = widget.try_borrow_mut().map_err(|_| MdaError::WidgetBusy {
                widget: String::from("(unregistered)"),
            })?;
            w.bind_selection(self.sink.clone());
            (w.name().to_string(), w.groupings())
        };
        let registered = Registered { name, widget };
        self.subscribe(&registered, &groupings)?;

        log::debug!(
            "coordinator: registered widget {:?} ({} groupings)",
            registered.name,
            groupings.len()
        );
        self.widgets.push(registered);
        Ok(self)
    }

    /// Adds `registered` as a listener on each grouping's dimension name and tracks the groupings
    /// and dimensions. Returns how many groupings were not tracked before.
    fn subscribe(
        &mut self,
        registered: &Registered,
        groupings: &[GroupingHandle],
    ) -> MdaResult<usize> {
        let mut added = 0;
        for grouping in groupings {
            let (dimension_name, dimension) = {
                let g = grouping.try_borrow().map_err(|_| MdaError::GroupingBusy)?;
                (g.dimension_name().to_string(), g.dimension().clone())
            };

            let listeners = self
                .dimension_listeners
                .entry(dimension_name.clone())
                .or_default();
            if !listeners
                .iter()
                .any(|l| same_widget(&l.widget, &registered.widget))
            {
                listeners.push(registered.clone());
            }

            if insert_unique(&mut self.groupings, grouping) {
                added += 1;
            }
            insert_unique(
                self.dimensions.entry(dimension_name).or_default(),
                &dimension,
            );
        }
        Ok(added)
    }

    /// Handles one selection of `value` in a widget rendering `source`.
    pub fn on_selection(&mut self, source: &GroupingHandle, value: &Value) -> MdaResult<()> {
        let (dimension_name, predicate) = {
            let grouping = source.try_borrow().map_err(|_| MdaError::GroupingBusy)?;
            let dimension = grouping
                .dimension()
                .try_borrow()
                .map_err(|_| MdaError::DimensionBusy {
                    dimension: grouping.dimension_name().to_string(),
                })?;
            (
                grouping.dimension_name().to_string(),
                dimension.create_filter_predicate(value),
            )
        };
        let selector = DimensionSelector::from_value(value);
        log::debug!("coordinator: selection {selector} on dimension {dimension_name:?}");

        // Highlighting happens even if no tracked dimension carries this name.
        if let Some(listeners) = self.dimension_listeners.get(&dimension_name) {
            for listener in listeners {
                listener
                    .widget
                    .try_borrow_mut()
                    .map_err(|_| MdaError::WidgetBusy {
                        widget: listener.name.clone(),
                    })?
                    .highlight(&selector);
            }
        }

        let dimensions = self
            .dimensions
            .get(&dimension_name)
            .cloned()
            .unwrap_or_default();
        let mut any_filtered = false;
        for dimension in &dimensions {
            let mut dimension =
                dimension
                    .try_borrow_mut()
                    .map_err(|_| MdaError::DimensionBusy {
                        dimension: dimension_name.clone(),
                    })?;
            let outcome = dimension.toggle(predicate.clone())?;
            log::trace!(
                "coordinator: {:?} on a {dimension_name:?} dimension ({} active)",
                outcome,
                dimension.filters().len()
            );
            any_filtered |= dimension.is_filtered();
        }
        if any_filtered {
            self.filtered_dimensions.insert(dimension_name);
        } else {
            self.filtered_dimensions.remove(&dimension_name);
        }

        self.recalculate()?;

        if self.options.redraw_after_selection {
            self.draw()?;
        }
        Ok(())
    }

    /// Processes selections queued by widgets, one complete pass at a time. Returns how many
    /// selections were handled.
    pub fn dispatch_pending(&mut self) -> MdaResult<usize> {
        let mut handled = 0usize;
        let mut passes = 0usize;
        while !self.sink.is_empty() {
            if passes == self.options.max_dispatch_passes {
                return Err(MdaError::DispatchLimit {
                    limit: self.options.max_dispatch_passes,
                });
            }
            passes += 1;
            for selection in self.sink.drain() {
                self.on_selection(&selection.source, &selection.value)?;
                handled += 1;
            }
        }
        Ok(handled)
    }

    /// Rebuilds the derived statistics of every tracked grouping.
    pub fn recalculate(&self) -> MdaResult<()> {
        for grouping in &self.groupings {
            grouping
                .try_borrow_mut()
                .map_err(|_| MdaError::GroupingBusy)?
                .recalculate()?;
        }
        Ok(())
    }

    /// Redraws every registered widget, in registration order.
    pub fn draw(&self) -> MdaResult<()> {
        for registered in &self.widgets {
            registered
                .widget
                .try_borrow_mut()
                .map_err(|_| MdaError::WidgetBusy {
                    widget: registered.name.clone(),
                })?
                .redraw()?;
        }
        Ok(())
    }

    /// Unregisters `widget`. Groupings and dimensions no remaining widget renders are dropped;
    /// a dropped dimension's filters are cleared first so the data does not stay filtered by an
    /// axis nobody can click any more. Returns whether the widget was registered.
    pub fn remove(&mut self, widget: &WidgetHandle) -> MdaResult<bool> {
        let Some(idx) = self
            .widgets
            .iter()
            .position(|w| same_widget(&w.widget, widget))
        else {
            return Ok(false);
        };
        let removed = self.widgets.remove(idx);
        if let Ok(mut w) = removed.widget.try_borrow_mut() {
            w.unbind_selection();
        }

        for listeners in self.dimension_listeners.values_mut() {
            listeners.retain(|l| !same_widget(&l.widget, widget));
        }
        self.dimension_listeners.retain(|_, listeners| !listeners.is_empty());

        let mut still_rendered: Vec<GroupingHandle> = Vec::new();
        for registered in &self.widgets {
            let groupings = registered
                .widget
                .try_borrow()
                .map_err(|_| MdaError::WidgetBusy {
                    widget: registered.name.clone(),
                })?
                .groupings();
            for grouping in &groupings {
                insert_unique(&mut still_rendered, grouping);
            }
        }

        let mut dropped = Vec::new();
        self.groupings.retain(|g| {
            let keep = still_rendered.iter().any(|s| Rc::ptr_eq(s, g));
            if !keep {
                dropped.push(g.clone());
            }
            keep
        });
        for grouping in &dropped {
            grouping
                .try_borrow_mut()
                .map_err(|_| MdaError::GroupingBusy)?
                .dispose()?;
        }

        let mut live_dimensions: Vec<DimensionHandle> = Vec::new();
        for grouping in &self.groupings {
            let g = grouping.try_borrow().map_err(|_| MdaError::GroupingBusy)?;
            insert_unique(&mut live_dimensions, g.dimension());
        }

        let mut cleared_any = false;
        for (name, dimensions) in self.dimensions.iter_mut() {
            let mut kept = Vec::with_capacity(dimensions.len());
            for dimension in dimensions.drain(..) {
                if live_dimensions.iter().any(|d| Rc::ptr_eq(d, &dimension)) {
                    kept.push(dimension);
                    continue;
                }
                let mut dim = dimension
                    .try_borrow_mut()
                    .map_err(|_| MdaError::DimensionBusy {
                        dimension: name.clone(),
                    })?;
                if dim.is_filtered() {
                    dim.clear_filters()?;
                    cleared_any = true;
                }
            }
            *dimensions = kept;
        }
        self.dimensions.retain(|_, dimensions| !dimensions.is_empty());

        let still_filtered: BTreeSet<String> = self
            .dimensions
            .iter()
            .filter(|(_, dims)| {
                dims.iter()
                    .any(|d| d.try_borrow().map(|d| d.is_filtered()).unwrap_or(true))
            })
            .map(|(name, _)| name.clone())
            .collect();
        self.filtered_dimensions = still_filtered;

        if cleared_any {
            self.recalculate()?;
        }
        log::debug!(
            "coordinator: removed widget {:?} ({} groupings dropped)",
            removed.name,
            dropped.len()
        );
        Ok(true)
    }

    pub fn widget_count(&self) -> usize {
        self.widgets.len()
    }

    pub fn listener_count(&self, dimension: &str) -> usize {
        self.dimension_listeners
            .get(dimension)
            .map_or(0, |listeners| listeners.len())
    }

    pub fn is_dimension_filtered(&self, dimension: &str) -> bool {
        self.filtered_dimensions.contains(dimension)
    }

    pub fn filtered_dimension_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.filtered_dimensions.iter().map(String::as_str)
    }

    pub fn dimensions_named(&self, dimension: &str) -> &[DimensionHandle] {
        self.dimensions
            .get(dimension)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn grouping_count(&self) -> usize {
        self.groupings.len()
    }
}
