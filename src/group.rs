//! Group registry: named, independently searchable lists of items.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::item::ItemId;
use crate::{ClearButtonHandle, SearchBoxHandle};

/// A named list of items
///
/// `item_ids` keeps registration order, which is also the display order when no search is
/// active. Labels are unique within a group.
#[derive(derive_more::Debug)]
pub struct Group {
    name: String,
    field: String,
    item_ids: Vec<ItemId>,
    display_order: Vec<ItemId>,
    labels: HashMap<String, ItemId>,
    #[debug(skip)]
    search_box: Option<Weak<dyn SearchBoxHandle>>,
    #[debug(skip)]
    clear_button: Option<Weak<dyn ClearButtonHandle>>,
}

impl Group {
    /// Create an empty group, matched against external tags under `field`
    pub fn new(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            item_ids: Vec::new(),
            display_order: Vec::new(),
            labels: HashMap::new(),
            search_box: None,
            clear_button: None,
        }
    }

    /// Group name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field name used by the external tag filter
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Item ids in registration order
    pub fn item_ids(&self) -> &[ItemId] {
        &self.item_ids
    }

    /// Item ids in the order they are currently rendered
    pub fn display_order(&self) -> &[ItemId] {
        &self.display_order
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    /// Whether the group has no items
    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    /// The item carrying `label`, if any
    pub fn find_label(&self, label: &str) -> Option<ItemId> {
        self.labels.get(label).copied()
    }

    /// Append an item. Returns false, leaving the group untouched, if the label is taken.
    pub fn push(&mut self, id: ItemId, label: &str) -> bool {
        if self.labels.contains_key(label) {
            return false;
        }
        self.labels.insert(label.to_owned(), id);
        self.item_ids.push(id);
        self.display_order.push(id);
        true
    }

    /// Remove an item. Returns true if it belonged to the group.
    pub fn remove(&mut self, id: ItemId) -> bool {
        let before = self.item_ids.len();
        self.item_ids.retain(|own| *own != id);
        self.display_order.retain(|own| *own != id);
        self.labels.retain(|_, own| *own != id);
        before != self.item_ids.len()
    }

    /// Position of `id` in registration order
    pub fn position(&self, id: ItemId) -> Option<usize> {
        self.item_ids.iter().position(|own| *own == id)
    }

    pub(crate) fn set_field(&mut self, field: &str) {
        field.clone_into(&mut self.field);
    }

    pub(crate) fn set_display_order(&mut self, order: Vec<ItemId>) {
        self.display_order = order;
    }

    pub(crate) fn reset_display_order(&mut self) {
        self.display_order = self.item_ids.clone();
    }

    /// The bound search box, if still alive
    pub fn search_box(&self) -> Option<Rc<dyn SearchBoxHandle>> {
        self.search_box.as_ref()?.upgrade()
    }

    /// The bound clear button, if still alive
    pub fn clear_button(&self) -> Option<Rc<dyn ClearButtonHandle>> {
        self.clear_button.as_ref()?.upgrade()
    }

    pub(crate) fn bind_search_box(&mut self, search_box: &Rc<dyn SearchBoxHandle>) {
        self.search_box = Some(Rc::downgrade(search_box));
    }

    pub(crate) fn bind_clear_button(&mut self, clear_button: &Rc<dyn ClearButtonHandle>) {
        self.clear_button = Some(Rc::downgrade(clear_button));
    }

    /// Drop every item while keeping the name, field and bindings
    pub(crate) fn take_items(&mut self) -> Vec<ItemId> {
        self.labels.clear();
        self.display_order.clear();
        std::mem::take(&mut self.item_ids)
    }
}

/// Every registered group, in registration order
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: IndexMap<String, Group>,
}

impl GroupRegistry {
    /// The group called `name`, created with `field` if missing
    pub fn entry(&mut self, name: &str, field: &str) -> &mut Group {
        self.groups
            .entry(name.to_owned())
            .or_insert_with(|| Group::new(name, field))
    }

    /// The group called `name`
    pub fn get(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// The group called `name`, mutably
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Group> {
        self.groups.get_mut(name)
    }

    /// Whether a group called `name` exists
    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    /// Groups in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Remove `id` from every group referencing it
    pub fn remove_item(&mut self, id: ItemId) -> usize {
        self.groups
            .values_mut()
            .map(|group| group.remove(id))
            .filter(|removed| *removed)
            .count()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::item::{Item, LexicalFeatures};

    fn id() -> ItemId {
        Item::new("x", LexicalFeatures::new("x", false)).id()
    }

    #[test]
    fn labels_are_unique() {
        let mut group = Group::new("city", "city");
        let (a, b) = (id(), id());
        assert!(group.push(a, "Springfield"));
        assert!(!group.push(b, "Springfield"));
        assert_eq!(group.item_ids(), [a]);
        assert_eq!(group.find_label("Springfield"), Some(a));
    }

    #[test]
    fn removal_frees_the_label() {
        let mut group = Group::new("city", "city");
        let (a, b) = (id(), id());
        group.push(a, "Springfield");
        assert!(group.remove(a));
        assert!(!group.remove(a));
        assert!(group.push(b, "Springfield"));
        assert_eq!(group.display_order(), [b]);
    }

    #[test]
    fn registry_removes_everywhere() {
        let mut registry = GroupRegistry::default();
        let shared = id();
        registry.entry("a", "a").push(shared, "x");
        registry.entry("b", "b").push(shared, "x");
        registry.entry("c", "c").push(id(), "x");
        assert_eq!(registry.remove_item(shared), 2);
        assert!(registry.get("a").unwrap().is_empty());
        assert_eq!(registry.get("c").unwrap().len(), 1);
        assert_eq!(registry.remove_item(shared), 0);
    }
}
