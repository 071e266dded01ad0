//! Label extraction from list entries.
//!
//! Markup varies a lot between lists, so the label is looked up through an ordered list of
//! strategies and the first non-empty text wins.

use crate::LabelSource;

/// Where to look for an entry's display label
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[cfg_attr(feature = "cli", clap(rename_all = "kebab-case"))]
pub enum LabelStrategy {
    /// Explicit label-like child of the entry
    LabelChild,
    /// Label element associated with the entry's checkbox
    AssociatedLabel,
    /// Label next to the entry's input
    SiblingLabel,
    /// Whole text content of the entry
    ElementText,
}

impl LabelStrategy {
    /// Default lookup order, most specific first
    pub const DEFAULT_ORDER: [LabelStrategy; 4] = [
        LabelStrategy::LabelChild,
        LabelStrategy::AssociatedLabel,
        LabelStrategy::SiblingLabel,
        LabelStrategy::ElementText,
    ];

    fn read(self, source: &dyn LabelSource) -> Option<String> {
        match self {
            LabelStrategy::LabelChild => source.label_child_text(),
            LabelStrategy::AssociatedLabel => source.associated_label_text(),
            LabelStrategy::SiblingLabel => source.sibling_label_text(),
            LabelStrategy::ElementText => source.element_text(),
        }
    }
}

/// Extract the display label of `source`, trimmed.
///
/// Returns `None` when no strategy yields non-blank text; such entries are never registered.
pub fn extract_label(source: &dyn LabelSource, strategies: &[LabelStrategy]) -> Option<String> {
    strategies.iter().find_map(|strategy| {
        let text = strategy.read(source)?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            trace!("label strategy {strategy:?} yielded blank text");
            None
        } else {
            Some(trimmed.to_owned())
        }
    })
}
