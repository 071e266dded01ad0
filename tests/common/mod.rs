use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use checklist_filter::prelude::*;
use futures::future::LocalBoxFuture;

/// A rendered checkbox entry
#[derive(Debug)]
pub struct MockEntry {
    pub label: String,
    pub checked: Cell<bool>,
    pub visible: Cell<bool>,
    pub tag: Option<String>,
}

impl MockEntry {
    pub fn new(label: &str) -> Rc<Self> {
        Rc::new(Self {
            label: label.to_owned(),
            checked: Cell::new(false),
            visible: Cell::new(true),
            tag: None,
        })
    }

    pub fn checked(label: &str) -> Rc<Self> {
        let entry = Self::new(label);
        entry.checked.set(true);
        entry
    }

    /// An entry reporting `tag` to the external tag filter instead of its label
    pub fn tagged(label: &str, tag: &str) -> Rc<Self> {
        Rc::new(Self {
            label: label.to_owned(),
            checked: Cell::new(false),
            visible: Cell::new(true),
            tag: Some(tag.to_owned()),
        })
    }
}

impl LabelSource for MockEntry {
    fn label_child_text(&self) -> Option<String> {
        Some(self.label.clone())
    }
}

impl ItemHandle for MockEntry {
    fn is_checked(&self) -> bool {
        self.checked.get()
    }

    fn set_checked(&self, checked: bool) {
        self.checked.set(checked);
    }

    fn show(&self) {
        self.visible.set(true);
    }

    fn hide(&self) {
        self.visible.set(false);
    }

    fn field_value(&self, _field: &str) -> Option<String> {
        self.tag.clone()
    }
}

pub fn entries(labels: &[&str]) -> Vec<Rc<MockEntry>> {
    labels.iter().map(|label| MockEntry::new(label)).collect()
}

pub fn handles(entries: &[Rc<MockEntry>]) -> Vec<Rc<dyn ItemHandle>> {
    entries.iter().map(|entry| entry.clone() as Rc<dyn ItemHandle>).collect()
}

/// A raw entry of a fetched page
pub struct PageEntry(pub String);

impl LabelSource for PageEntry {
    fn element_text(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

//------------------------------------------------------------------------------
/// A rendered list owning the entries it materializes
#[derive(Default)]
pub struct MockContainer {
    pub position: usize,
    pub control: RefCell<Option<PaginationControl>>,
    pub rendered: RefCell<Vec<Rc<MockEntry>>>,
    pub order: RefCell<Vec<String>>,
}

impl MockContainer {
    pub fn new(control: PaginationControl) -> Rc<Self> {
        Rc::new(Self {
            control: RefCell::new(Some(control)),
            ..Default::default()
        })
    }

    pub fn at(position: usize, control: PaginationControl) -> Rc<Self> {
        Rc::new(Self {
            position,
            control: RefCell::new(Some(control)),
            ..Default::default()
        })
    }

    pub fn rendered_labels(&self) -> Vec<String> {
        self.rendered.borrow().iter().map(|entry| entry.label.clone()).collect()
    }
}

impl ListContainer for MockContainer {
    fn position(&self) -> usize {
        self.position
    }

    fn pagination(&self) -> PaginationControl {
        self.control.borrow().clone().unwrap_or(PaginationControl::None)
    }

    fn materialize(&self, template: &dyn LabelSource) -> Option<Rc<dyn ItemHandle>> {
        let entry = MockEntry::new(&template.element_text()?);
        self.rendered.borrow_mut().push(entry.clone());
        Some(entry as Rc<dyn ItemHandle>)
    }

    fn reorder(&self, order: &[Rc<dyn ItemHandle>]) {
        *self.order.borrow_mut() = order
            .iter()
            .filter_map(|handle| handle.label_child_text())
            .collect();
    }
}

//------------------------------------------------------------------------------
/// Containers of a page: labels and link to the next page, in document order
pub type PageSpec = Vec<(Vec<&'static str>, Option<&'static str>)>;

/// A transport serving canned pages
#[derive(Default)]
pub struct MockPageSource {
    pub pages: RefCell<HashMap<PageToken, PageSpec>>,
    /// Tokens failing on their next fetch
    pub failing: RefCell<HashSet<PageToken>>,
    pub fetched: RefCell<Vec<PageToken>>,
    pub in_flight: Cell<usize>,
    pub max_in_flight: Cell<usize>,
}

impl MockPageSource {
    pub fn new(pages: impl IntoIterator<Item = (&'static str, PageSpec)>) -> Rc<Self> {
        Rc::new(Self {
            pages: RefCell::new(
                pages
                    .into_iter()
                    .map(|(token, spec)| (PageToken::from(token), spec))
                    .collect(),
            ),
            ..Default::default()
        })
    }

    pub fn fail_once(&self, token: &str) {
        self.failing.borrow_mut().insert(PageToken::from(token));
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.borrow().len()
    }
}

impl PageSource for MockPageSource {
    fn fetch_page<'a>(&'a self, token: &'a PageToken) -> LocalBoxFuture<'a, Result<PageDocument, PageFetchError>> {
        Box::pin(async move {
            self.fetched.borrow_mut().push(token.clone());
            self.in_flight.set(self.in_flight.get() + 1);
            self.max_in_flight.set(self.max_in_flight.get().max(self.in_flight.get()));
            tokio::task::yield_now().await;
            self.in_flight.set(self.in_flight.get() - 1);

            if self.failing.borrow_mut().remove(token) {
                return Err(PageFetchError {
                    token: token.clone(),
                    message: String::from("connection reset"),
                });
            }
            let pages = self.pages.borrow();
            let spec = pages.get(token).ok_or_else(|| PageFetchError {
                token: token.clone(),
                message: String::from("not found"),
            })?;
            Ok(PageDocument {
                containers: spec
                    .iter()
                    .map(|(labels, next)| PageContainer {
                        entries: labels
                            .iter()
                            .map(|label| Rc::new(PageEntry(label.to_string())) as Rc<dyn LabelSource>)
                            .collect(),
                        next: next.map(PageToken::from),
                    })
                    .collect(),
            })
        })
    }
}

//------------------------------------------------------------------------------
#[derive(Default)]
pub struct MockSearchBox {
    pub value: RefCell<String>,
}

impl SearchBoxHandle for MockSearchBox {
    fn value(&self) -> String {
        self.value.borrow().clone()
    }

    fn set_value(&self, value: &str) {
        *self.value.borrow_mut() = value.to_owned();
    }
}

#[derive(Default)]
pub struct MockClearButton {
    pub visible: Cell<bool>,
}

impl ClearButtonHandle for MockClearButton {
    fn set_visible(&self, visible: bool) {
        self.visible.set(visible);
    }
}

//------------------------------------------------------------------------------
pub fn filter_controller() -> FilterController {
    let options = FilterOptionsBuilder::default()
        .pool_size(2)
        .debounce(std::time::Duration::from_millis(20))
        .build()
        .unwrap();
    FilterController::new(options).unwrap()
}

pub fn labels(controller: &FilterController, group: &str) -> Vec<String> {
    controller
        .results(group)
        .unwrap()
        .into_iter()
        .map(|entry| entry.label)
        .collect()
}

/// One line per visible entry: check mark, score and label
pub fn render(controller: &FilterController, group: &str) -> String {
    controller
        .results(group)
        .unwrap()
        .into_iter()
        .map(|entry| {
            let mark = if entry.checked { "[x]" } else { "[ ]" };
            let score = entry.score.map_or(String::from("-"), |score| format!("{score:.2}"));
            format!("{mark} {score} {}", entry.label)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
