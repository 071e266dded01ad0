//! Pagination merger.
//!
//! A paginated container only renders its first page. A sweep fetches the remaining pages,
//! picks the matching container out of each page document by position, and reduces its
//! entries to field records (label and lexical features). Elements are only materialized when
//! a record is merged into its group, and a record is merged only if the group has no item
//! with the same label yet.
//!
//! Sweeps run on the interactive thread: fetches suspend, but every state update happens
//! between them, so a plain `is_loading` flag is enough to keep one sweep per container.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::{StreamExt, stream};
use thiserror::Error;

use crate::controller::{FilterController, FilterState};
use crate::error::FilterError;
use crate::item::{Item, ItemId, LexicalFeatures};
use crate::label::extract_label;
use crate::{ItemHandle, LabelSource};

/// Opaque page identifier, built by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub struct PageToken(pub String);

impl From<&str> for PageToken {
    fn from(token: &str) -> Self {
        Self(token.to_owned())
    }
}

/// What a container's pagination control tells about the remaining pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationControl {
    /// Single page
    None,
    /// Every remaining page is known up front; they are fetched concurrently
    Pages(Vec<PageToken>),
    /// Only the next page is known; pages are followed one link at a time
    NextLink(PageToken),
}

/// One container instance found in a fetched page
#[derive(derive_more::Debug, Default)]
pub struct PageContainer {
    /// Raw entries, used as templates when materialized
    #[debug(skip)]
    pub entries: Vec<Rc<dyn LabelSource>>,
    /// Link to the following page, if any
    pub next: Option<PageToken>,
}

/// A fetched page, reduced to its paginated containers in document order
#[derive(Debug, Default)]
pub struct PageDocument {
    /// Every list container of the page, in document order
    pub containers: Vec<PageContainer>,
}

/// Failed page fetch
#[derive(Debug, Error)]
#[error("failed to fetch page `{token}`: {message}")]
pub struct PageFetchError {
    /// Page that failed
    pub token: PageToken,
    /// Transport error
    pub message: String,
}

/// Transport fetching page documents
pub trait PageSource {
    /// Fetch the page behind `token`
    fn fetch_page<'a>(&'a self, token: &'a PageToken) -> LocalBoxFuture<'a, Result<PageDocument, PageFetchError>>;
}

/// The rendered list of a group
pub trait ListContainer {
    /// Index of this container among the paginated containers of a page
    fn position(&self) -> usize {
        0
    }

    /// Current state of the pagination control
    fn pagination(&self) -> PaginationControl {
        PaginationControl::None
    }

    /// Render `template` as a new entry of the list. The container owns the element.
    fn materialize(&self, _template: &dyn LabelSource) -> Option<Rc<dyn ItemHandle>> {
        None
    }

    /// Reorder the rendered entries
    fn reorder(&self, _order: &[Rc<dyn ItemHandle>]) {}
}

//------------------------------------------------------------------------------
/// An entry discovered on a later page, not merged yet
#[derive(derive_more::Debug)]
pub struct FieldRecord {
    label: String,
    features: LexicalFeatures,
    #[debug(skip)]
    template: Rc<dyn LabelSource>,
}

impl FieldRecord {
    /// Extracted label
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Pagination state of one container
#[derive(Debug, Default)]
pub struct PaginatedContainerData {
    discovered: Vec<FieldRecord>,
    pages_loaded: HashSet<PageToken>,
    next_links: HashMap<PageToken, Option<PageToken>>,
    is_loading: bool,
}

impl PaginatedContainerData {
    /// Records waiting to be merged
    pub fn discovered(&self) -> &[FieldRecord] {
        &self.discovered
    }

    /// True once `token` was fetched and reduced
    pub fn is_loaded(&self, token: &PageToken) -> bool {
        self.pages_loaded.contains(token)
    }

    /// True while a sweep runs
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }
}

/// What a sweep did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Another sweep was already running, nothing was done
    pub skipped: bool,
    /// Pages fetched and reduced
    pub pages_fetched: usize,
    /// Pages that failed; they stay eligible for the next sweep
    pub pages_failed: usize,
    /// Items added to the group
    pub merged: usize,
    /// Records dropped because their label was already in the group
    pub duplicates: usize,
}

impl SweepReport {
    /// True when every page was fetched
    pub fn is_complete(&self) -> bool {
        !self.skipped && self.pages_failed == 0
    }
}

#[derive(Debug, Default)]
pub(crate) struct MergeOutcome {
    pub(crate) merged: Vec<ItemId>,
    pub(crate) duplicates: usize,
}

impl FilterState {
    /// Merge the discovered records of `group_name`'s container into the group.
    ///
    /// Records stay pending until both the group and its container are registered.
    pub(crate) fn merge_discovered(&mut self, group_name: &str) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let Some(container) = self.containers.get(group_name).cloned() else {
            return outcome;
        };
        let (Some(data), Some(group)) = (self.pagination.get_mut(group_name), self.groups.get_mut(group_name)) else {
            return outcome;
        };
        let searching = self.searches.get(group_name).is_some_and(|search| search.is_active());

        for record in data.discovered.drain(..) {
            if group.find_label(&record.label).is_some() {
                trace!("dropping duplicate {:?} in group {group_name}", record.label);
                outcome.duplicates += 1;
                continue;
            }
            let Some(handle) = container.materialize(record.template.as_ref()) else {
                debug!("container of group {group_name} refused to render {:?}", record.label);
                continue;
            };

            let checked = handle.is_checked() || self.sync.recorded(group_name, &record.label) == Some(true);
            if checked && !handle.is_checked() {
                handle.set_checked(true);
            }
            // under an active search, new entries stay hidden until they are scored
            if searching {
                handle.hide();
            } else {
                handle.show();
            }

            let label = record.label.clone();
            let mut item = Item::paginated(record.label, record.features).checked(checked);
            item.is_visible = !searching;
            let id = self.store.insert(item, &handle);
            group.push(id, &label);
            outcome.merged.push(id);
        }

        if !outcome.merged.is_empty() || outcome.duplicates > 0 {
            debug!(
                "merged {} item(s) into group {group_name}, {} duplicate(s) dropped",
                outcome.merged.len(),
                outcome.duplicates
            );
        }
        outcome
    }
}

//------------------------------------------------------------------------------
struct LoadingGuard<'a> {
    controller: &'a FilterController,
    group: &'a str,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.controller.inner.state.try_borrow_mut()
            && let Some(data) = state.pagination.get_mut(self.group)
        {
            data.is_loading = false;
        }
    }
}

impl FilterController {
    /// Fetch the pages of `group`'s container that are not loaded yet and merge their items.
    ///
    /// Idempotent: loaded pages are never fetched again, and a call made while a sweep is
    /// running returns immediately with [`SweepReport::skipped`] set. A failed page ends its
    /// branch (the rest of the chain when following links) and is retried on the next sweep.
    /// If the group is being searched, merged items are scored against the active term.
    pub async fn discover_and_merge(&self, group: &str) -> Result<SweepReport, FilterError> {
        let source = self.inner.page_source.borrow().clone().ok_or(FilterError::NoPageSource)?;
        let container = {
            let mut state = self.inner.state.borrow_mut();
            let container = state
                .containers
                .get(group)
                .cloned()
                .ok_or_else(|| FilterError::UnknownContainer(group.to_owned()))?;
            let data = state.pagination.entry(group.to_owned()).or_default();
            if data.is_loading {
                debug!("sweep of group {group} already running");
                return Ok(SweepReport {
                    skipped: true,
                    ..Default::default()
                });
            }
            data.is_loading = true;
            container
        };
        let _loading = LoadingGuard {
            controller: self,
            group,
        };

        let position = container.position();
        let mut report = SweepReport::default();
        debug!("sweep of group {group} started");
        match container.pagination() {
            PaginationControl::None => trace!("group {group} has a single page"),
            PaginationControl::Pages(tokens) => {
                let pending: Vec<PageToken> = {
                    let state = self.inner.state.borrow();
                    let data = state.pagination.get(group);
                    tokens
                        .into_iter()
                        .filter(|token| !data.is_some_and(|data| data.is_loaded(token)))
                        .collect()
                };
                let source = source.as_ref();
                let mut pages = stream::iter(pending)
                    .map(|token| async move {
                        let result = source.fetch_page(&token).await;
                        (token, result)
                    })
                    .buffered(self.inner.options.page_concurrency.max(1));
                while let Some((token, result)) = pages.next().await {
                    match result {
                        Ok(document) => {
                            self.absorb_page(group, position, &token, document, &mut report);
                        }
                        Err(err) => {
                            warn!("{err}");
                            report.pages_failed += 1;
                        }
                    }
                }
            }
            PaginationControl::NextLink(first) => {
                let mut visited = HashSet::new();
                let mut next = Some(first);
                while let Some(token) = next.take() {
                    if !visited.insert(token.clone()) {
                        warn!("pagination of group {group} loops back to page {token}");
                        break;
                    }
                    let known = {
                        let state = self.inner.state.borrow();
                        state
                            .pagination
                            .get(group)
                            .and_then(|data| data.next_links.get(&token).cloned())
                    };
                    if let Some(link) = known {
                        next = link;
                        continue;
                    }
                    match source.fetch_page(&token).await {
                        Ok(document) => next = self.absorb_page(group, position, &token, document, &mut report),
                        Err(err) => {
                            warn!("{err}");
                            report.pages_failed += 1;
                        }
                    }
                }
            }
        }

        let merged = {
            let mut state = self.inner.state.borrow_mut();
            state.merge_discovered(group)
        };
        report.merged = merged.merged.len();
        report.duplicates = merged.duplicates;
        debug!("sweep of group {group} finished: {report:?}");

        if !merged.merged.is_empty() {
            self.score_merged(group, merged.merged).await?;
        }
        Ok(report)
    }

    /// Reduce the container at `position` of a fetched page to field records.
    ///
    /// Returns the container's link to the next page.
    fn absorb_page(
        &self,
        group: &str,
        position: usize,
        token: &PageToken,
        document: PageDocument,
        report: &mut SweepReport,
    ) -> Option<PageToken> {
        let strategies = &self.inner.options.label_strategies;
        let fold_accents = self.inner.options.normalize;
        let mut state = self.inner.state.borrow_mut();
        let data = state.pagination.entry(group.to_owned()).or_default();
        if data.is_loaded(token) {
            return data.next_links.get(token).cloned().flatten();
        }

        let Some(container) = document.containers.into_iter().nth(position) else {
            warn!("page {token} has no paginated container at position {position}");
            report.pages_failed += 1;
            return None;
        };

        for entry in container.entries {
            match extract_label(entry.as_ref(), strategies) {
                Some(label) => {
                    let features = LexicalFeatures::new(&label, fold_accents);
                    data.discovered.push(FieldRecord {
                        label,
                        features,
                        template: entry,
                    });
                }
                None => debug!("skipping entry without label on page {token}"),
            }
        }
        data.pages_loaded.insert(token.clone());
        data.next_links.insert(token.clone(), container.next.clone());
        report.pages_fetched += 1;
        trace!("page {token} loaded for group {group}");
        container.next
    }
}
