//! # Change Tracking Module
//!
//! Every model instance owns a [`Changes`] snapshot: the storage values of its
//! fields as last read from or written to the data source. Diffing the current
//! storage values against the snapshot yields the columns an UPDATE has to set.
//!
//! The snapshot lives inside the instance, so it follows the instance through
//! moves and clones and is dropped with it.
//!
//! ```rust,ignore
//! let hydrator = manager.get_hydrator::<Book>()?;
//! hydrator.store_changes(&mut book)?;
//! book.title = "Other".into();
//! let changes = hydrator.get_changes(&book)?;
//! assert_eq!(changes[0].field.name(), "title");
//! ```

use std::sync::Arc;

use crate::{
    errors::Result,
    field::Field,
    value::Value,
};

/// One changed field.
#[derive(Debug, Clone)]
pub struct Change {
    pub field: Arc<Field>,
    pub current: Value,
    pub previous: Value,
}

/// Storage values of a model instance at its last synchronization.
#[derive(Debug, Clone, Default)]
pub struct Changes {
    snapshot: Option<Vec<(Arc<Field>, Value)>>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once a snapshot has been taken.
    pub fn is_tracked(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Value of a field in the snapshot.
    pub fn previous(&self, field_name: &str) -> Option<&Value> {
        self.snapshot
            .as_ref()?
            .iter()
            .find(|(f, _)| f.name().eq_ignore_ascii_case(field_name))
            .map(|(_, v)| v)
    }

    pub(crate) fn store(&mut self, snapshot: Vec<(Arc<Field>, Value)>) {
        self.snapshot = Some(snapshot);
    }

    pub(crate) fn clear(&mut self) {
        self.snapshot = None;
    }

    /// Compares the snapshot with the values returned by `current`.
    ///
    /// Values of different variants never compare equal, `1` and `1.0` included.
    /// An instance without snapshot has no changes.
    pub(crate) fn diff(&self, mut current: impl FnMut(&Field) -> Result<Value>) -> Result<Vec<Change>> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(Vec::new());
        };

        let mut changes = Vec::new();
        for (field, previous) in snapshot {
            let value = current(field)?;
            if value != *previous {
                changes.push(Change { field: field.clone(), current: value, previous: previous.clone() });
            }
        }
        Ok(changes)
    }
}
