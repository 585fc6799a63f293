use crate::backend::{borrow_engine_mut, SharedEngine};
use crate::error::MdaResult;
use insight_crossfilter::{DimensionId, Key, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

pub type DimensionHandle = Rc<RefCell<Dimension>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchMode {
    /// Slice value and selected value have the same string form.
    Equality,
    /// The slice value (a list) contains the selected value.
    Membership,
}

/// Record-matching test built from a selected value.
///
/// Two predicates are the same predicate when their group keys are equal; that is what makes a
/// repeated selection toggle off instead of stacking.
#[derive(Clone, Debug)]
pub struct FilterPredicate {
    key: Value,
    mode: MatchMode,
    text: Arc<str>,
    member: Key,
}

impl FilterPredicate {
    pub fn new(key: Value, mode: MatchMode) -> Self {
        let text = Arc::from(key.to_string());
        let member = Key::from_value(&key);
        Self {
            key,
            mode,
            text,
            member,
        }
    }

    pub fn key(&self) -> &Value {
        &self.key
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self.mode {
            MatchMode::Equality => value.to_string() == *self.text,
            MatchMode::Membership => value.keys().contains(&self.member),
        }
    }

    /// Compares the hashable key form, so `NaN` matches `NaN`.
    pub fn same_key(&self, other: &FilterPredicate) -> bool {
        self.member == other.member
    }
}

impl PartialEq for FilterPredicate {
    fn eq(&self, other: &Self) -> bool {
        self.same_key(other) && self.mode == other.mode
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterToggle {
    Added,
    Removed,
}

/// A named slicing of one dataset together with its active filter predicates.
///
/// Active predicates combine with OR. An empty set means the dimension is unfiltered.
pub struct Dimension {
    name: String,
    one_to_many: bool,
    filters: Vec<FilterPredicate>,
    engine: SharedEngine,
    engine_dimension: DimensionId,
}

impl fmt::Debug for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dimension")
            .field("name", &self.name)
            .field("one_to_many", &self.one_to_many)
            .field("filters", &self.filters)
            .field("engine_dimension", &self.engine_dimension)
            .finish_non_exhaustive()
    }
}

impl Dimension {
    pub(crate) fn new(
        name: &str,
        one_to_many: bool,
        engine: SharedEngine,
        engine_dimension: DimensionId,
    ) -> Self {
        Self {
            name: name.to_string(),
            one_to_many,
            filters: Vec::new(),
            engine,
            engine_dimension,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn one_to_many(&self) -> bool {
        self.one_to_many
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    pub fn engine_dimension(&self) -> DimensionId {
        self.engine_dimension
    }

    pub fn filters(&self) -> &[FilterPredicate] {
        &self.filters
    }

    pub fn is_filtered(&self) -> bool {
        !self.filters.is_empty()
    }

    pub fn create_filter_predicate(&self, value: &Value) -> FilterPredicate {
        let mode = if self.one_to_many {
            MatchMode::Membership
        } else {
            MatchMode::Equality
        };
        FilterPredicate::new(value.clone(), mode)
    }

    /// Removes the active predicate with the same key, or appends `predicate` if there is none,
    /// then reinstalls the combined filter.
    pub fn toggle(&mut self, predicate: FilterPredicate) -> MdaResult<FilterToggle> {
        let outcome = match self.filters.iter().position(|p| p.same_key(&predicate)) {
            Some(idx) => {
                self.filters.remove(idx);
                FilterToggle::Removed
            }
            None => {
                self.filters.push(predicate);
                FilterToggle::Added
            }
        };
        self.install()?;
        Ok(outcome)
    }

    /// Replaces the active predicates wholesale.
    pub fn apply_filter_set(&mut self, predicates: Vec<FilterPredicate>) -> MdaResult<()> {
        self.filters.clear();
        for predicate in predicates {
            if !self.filters.iter().any(|p| p.same_key(&predicate)) {
                self.filters.push(predicate);
            }
        }
        self.install()
    }

    pub fn clear_filters(&mut self) -> MdaResult<()> {
        self.filters.clear();
        self.install()
    }

    fn install(&self) -> MdaResult<()> {
        let mut engine = borrow_engine_mut(&self.engine)?;
        if self.filters.is_empty() {
            log::debug!("dimension {:?}: filter cleared", self.name);
            engine.filter_all(self.engine_dimension)?;
            return Ok(());
        }

        log::debug!(
            "dimension {:?}: filtering on {} value(s)",
            self.name,
            self.filters.len()
        );
        let predicates = self.filters.clone();
        engine.filter(
            self.engine_dimension,
            Box::new(move |value: &Value| predicates.iter().any(|p| p.matches(value))),
        )?;
        Ok(())
    }
}
