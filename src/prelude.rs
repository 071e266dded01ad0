//! Convenience re-exports of commonly used types.
//!
//! `use checklist_filter::prelude::*;` brings in the controller, its options and the handle
//! traits callers implement.

pub use crate::controller::{GroupEntry, SearchPhase};
pub use crate::label::LabelStrategy;
pub use crate::notify::Notification;
pub use crate::pagination::{
    ListContainer, PageContainer, PageDocument, PageFetchError, PageSource, PageToken, PaginationControl,
    SweepReport,
};
pub use crate::scorer::{LexicalScorer, ScoreRequest, ScoreResponse, ScoredItem, Scorer};
pub use crate::sync::ExternalTags;
pub use crate::*;
pub use std::rc::Rc;
pub use std::sync::Arc;
