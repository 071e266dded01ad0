//! Checklist-filter is a real-time fuzzy filtering engine for checkbox lists.
//!
//! Items are grouped by category, every group can be searched independently, and the scoring
//! itself always runs on a bounded pool of worker threads so that the interactive thread only
//! serializes queries and applies results. Paginated containers are merged into their group
//! in the background, and checked state survives searches, "load more" rebuilds and
//! reconciliation with an external tag filter.
//!
//! The UI is never touched directly: callers implement the small handle traits in this module
//! ([`ItemHandle`], [`SearchBoxHandle`], [`ClearButtonHandle`], [`pagination::ListContainer`])
//! and the engine only reads and writes through them.
//!
//! # Examples
//!
//! ```no_run
//! use checklist_filter::prelude::*;
//!
//! # async fn run(elements: Vec<Rc<dyn ItemHandle>>) -> Result<(), FilterError> {
//! let options = FilterOptionsBuilder::default().pool_size(2).build()?;
//! let controller = FilterController::new(options)?;
//! controller.register_group("city", elements)?;
//!
//! controller.filter("city", "spring").await?;
//! for entry in controller.results("city")? {
//!     println!("{}", entry.label);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

#[macro_use]
extern crate log;

pub mod controller;
mod debounce;
pub mod error;
pub mod group;
pub mod item;
pub mod label;
pub mod notify;
pub mod options;
pub mod pagination;
pub mod pool;
pub mod prelude;
pub mod scorer;
pub mod sync;

pub use crate::controller::{FilterController, FilterOutcome};
pub use crate::error::FilterError;
pub use crate::item::ItemId;
pub use crate::options::{FilterOptions, FilterOptionsBuilder};

//------------------------------------------------------------------------------
// UI handles

/// Text sources a list entry can offer for label extraction.
///
/// Each method backs one [`label::LabelStrategy`]. Entries only implement the ones that make
/// sense for their markup, everything else falls through to the next strategy.
pub trait LabelSource {
    /// Text of an explicit label-like child of the entry
    fn label_child_text(&self) -> Option<String> {
        None
    }

    /// Text of the label element associated with the entry's checkbox
    fn associated_label_text(&self) -> Option<String> {
        None
    }

    /// Text of the label sitting next to the entry's input
    fn sibling_label_text(&self) -> Option<String> {
        None
    }

    /// Whole text content of the entry
    fn element_text(&self) -> Option<String> {
        None
    }
}

/// A rendered, selectable list entry.
///
/// The engine keeps only weak references to handles: the caller owns the element and decides
/// when it goes away.
pub trait ItemHandle: LabelSource {
    /// Current checked state, as shown to the user
    fn is_checked(&self) -> bool;

    /// Set the checked state and its visual attributes
    fn set_checked(&self, checked: bool);

    /// Make the entry visible in its list
    fn show(&self);

    /// Hide the entry from its list
    fn hide(&self);

    /// Value identifying this entry for the external tag filter under `field`.
    ///
    /// Defaults to `None`, in which case the entry's label is used.
    fn field_value(&self, _field: &str) -> Option<String> {
        None
    }
}

/// The search box bound to a group
pub trait SearchBoxHandle {
    /// Current input value
    fn value(&self) -> String;
    /// Overwrite the input value
    fn set_value(&self, value: &str);
}

/// The clear button bound to a group
pub trait ClearButtonHandle {
    /// Shown only while the bound search box holds a term
    fn set_visible(&self, visible: bool);
}
