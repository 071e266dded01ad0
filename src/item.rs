//! Item store: the canonical record of every filterable entry.
//!
//! What's special about an item?
//! The label is what the user sees, but matching never looks at it directly: every item
//! carries its lexical features (normalized text, tokens and character n-grams), computed once
//! at creation so that a scoring request is just a copy of plain data.
//!
//! The rendered element stays owned by the caller, the store only keeps a weak reference to
//! it in a side table keyed by item id.

use std::fmt::{Display, Formatter};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::ItemHandle;
use crate::scorer::SerializableItem;

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique item identifier, never reused
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(u64);

impl ItemId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw identifier
    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lowercase and trim `text`, optionally folding accents away first.
pub fn normalize_text(text: &str, fold_accents: bool) -> String {
    let trimmed = text.trim();
    if fold_accents {
        trimmed
            .nfd()
            .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
            .collect::<String>()
            .to_lowercase()
    } else {
        trimmed.to_lowercase()
    }
}

/// All distinct contiguous substrings of `n` chars, in order of first appearance
pub fn char_ngrams(text: &str, n: usize) -> impl Iterator<Item = String> + '_ {
    let chars: Vec<char> = text.chars().collect();
    let count = if n == 0 { 0 } else { chars.len().saturating_sub(n - 1) };
    (0..count).map(move |start| chars[start..start + n].iter().collect())
}

//------------------------------------------------------------------------------
/// Derived lexical data used by the scorer
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalFeatures {
    normalized_text: String,
    tokens: Vec<String>,
    ngrams: Vec<String>,
}

impl LexicalFeatures {
    /// Compute the features of `label`
    pub fn new(label: &str, fold_accents: bool) -> Self {
        let normalized_text = normalize_text(label, fold_accents);
        let tokens = normalized_text.split_whitespace().map(String::from).collect();
        let ngrams: IndexSet<String> = char_ngrams(&normalized_text, 2)
            .chain(char_ngrams(&normalized_text, 3))
            .collect();

        Self {
            normalized_text,
            tokens,
            ngrams: ngrams.into_iter().collect(),
        }
    }

    /// Lowercase, trimmed label
    pub fn normalized_text(&self) -> &str {
        &self.normalized_text
    }

    /// Whitespace-split words of the normalized label
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Distinct 2- and 3-char substrings of the normalized label
    pub fn ngrams(&self) -> &[String] {
        &self.ngrams
    }
}

//------------------------------------------------------------------------------
/// One filterable, selectable entry
#[derive(Debug, Clone)]
pub struct Item {
    id: ItemId,
    label_text: String,
    features: LexicalFeatures,
    pub(crate) is_checked: bool,
    pub(crate) is_visible: bool,
    is_paginated: bool,
}

impl Item {
    /// Create an item from the initial load
    pub fn new(label_text: impl Into<String>, features: LexicalFeatures) -> Self {
        Self {
            id: ItemId::next(),
            label_text: label_text.into(),
            features,
            is_checked: false,
            is_visible: true,
            is_paginated: false,
        }
    }

    /// Create an item that arrived through a later page
    pub fn paginated(label_text: impl Into<String>, features: LexicalFeatures) -> Self {
        Self {
            is_paginated: true,
            ..Self::new(label_text, features)
        }
    }

    /// Sets the mirrored checked state
    pub fn checked(mut self, checked: bool) -> Self {
        self.is_checked = checked;
        self
    }

    /// Unique id of the item
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Display string
    pub fn label_text(&self) -> &str {
        &self.label_text
    }

    /// Precomputed features of the label
    pub fn features(&self) -> &LexicalFeatures {
        &self.features
    }

    /// Mirrored checked state; the live element is the source of truth
    pub fn is_checked(&self) -> bool {
        self.is_checked
    }

    /// Whether the item is currently shown
    pub fn is_visible(&self) -> bool {
        self.is_visible
    }

    /// True if the item was merged from a later page
    pub fn is_paginated(&self) -> bool {
        self.is_paginated
    }

    /// The copy sent to a worker
    pub fn to_serializable(&self) -> SerializableItem {
        SerializableItem {
            id: self.id,
            normalized_text: self.features.normalized_text.clone(),
            tokens: self.features.tokens.clone(),
            ngrams: self.features.ngrams.clone(),
            is_checked: self.is_checked,
        }
    }
}

//------------------------------------------------------------------------------
/// Owner of every item, plus the side table of weak element references
#[derive(Default)]
pub struct ItemStore {
    items: IndexMap<ItemId, Item>,
    handles: IndexMap<ItemId, Weak<dyn ItemHandle>>,
}

impl ItemStore {
    /// Insert `item`, remembering a weak reference to its element
    pub fn insert(&mut self, item: Item, handle: &Rc<dyn ItemHandle>) -> ItemId {
        let id = item.id;
        self.handles.insert(id, Rc::downgrade(handle));
        self.items.insert(id, item);
        id
    }

    /// Remove an item and its element reference.
    ///
    /// Groups referencing the id must be updated by the caller.
    pub fn remove(&mut self, id: ItemId) -> Option<Item> {
        self.handles.shift_remove(&id);
        self.items.shift_remove(&id)
    }

    /// The item with `id`
    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    /// The item with `id`, mutably
    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.get_mut(&id)
    }

    /// Whether `id` is stored
    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The element behind `id`, if the caller still holds it
    pub fn handle(&self, id: ItemId) -> Option<Rc<dyn ItemHandle>> {
        let handle = self.handles.get(&id)?.upgrade();
        if handle.is_none() {
            trace!("element of item {id} is gone");
        }
        handle
    }

    /// Re-read the checked state from the element and mirror it.
    ///
    /// Keeps the mirrored value when the element is gone.
    pub fn refresh_checked(&mut self, id: ItemId) -> bool {
        let live = self.handle(id).map(|handle| handle.is_checked());
        match self.items.get_mut(&id) {
            Some(item) => {
                if let Some(checked) = live {
                    item.is_checked = checked;
                }
                item.is_checked
            }
            None => false,
        }
    }

    /// Write the checked state to both the element and the mirror
    pub fn set_checked(&mut self, id: ItemId, checked: bool) {
        if let Some(handle) = self.handle(id) {
            handle.set_checked(checked);
        }
        if let Some(item) = self.items.get_mut(&id) {
            item.is_checked = checked;
        }
    }

    /// Show or hide the element and mirror the visibility
    pub fn set_visible(&mut self, id: ItemId, visible: bool) {
        if let Some(handle) = self.handle(id) {
            if visible {
                handle.show();
            } else {
                handle.hide();
            }
        }
        if let Some(item) = self.items.get_mut(&id) {
            item.is_visible = visible;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn features_of_a_label() {
        let features = LexicalFeatures::new("  New York ", false);
        assert_eq!(features.normalized_text(), "new york");
        assert_eq!(features.tokens(), ["new", "york"]);
        assert_eq!(
            features.ngrams(),
            ["ne", "ew", "w ", " y", "yo", "or", "rk", "new", "ew ", "w y", " yo", "yor", "ork"]
        );
    }

    #[test]
    fn ngrams_are_distinct() {
        let features = LexicalFeatures::new("aaaa", false);
        assert_eq!(features.ngrams(), ["aa", "aaa"]);
    }

    #[test]
    fn short_labels_have_no_trigrams() {
        assert_eq!(LexicalFeatures::new("ab", false).ngrams(), ["ab"]);
        assert!(LexicalFeatures::new("a", false).ngrams().is_empty());
    }

    #[test]
    fn accents_are_folded_on_request() {
        assert_eq!(normalize_text("Évreux", true), "evreux");
        assert_eq!(normalize_text("Évreux", false), "évreux");
    }

    #[test]
    fn ids_are_unique() {
        let a = Item::new("a", LexicalFeatures::new("a", false));
        let b = Item::new("a", LexicalFeatures::new("a", false));
        assert_ne!(a.id(), b.id());
        assert!(b.id() > a.id());
    }

    #[test]
    fn paginated_items_are_flagged() {
        let item = Item::paginated("x", LexicalFeatures::new("x", false)).checked(true);
        assert!(item.is_paginated());
        assert!(item.is_checked());
        assert!(item.is_visible());
    }
}
