//! Filter controller: the entry point used by the UI.
//!
//! The controller owns the item store, the group registry and the worker pool. It lives on
//! the interactive thread (it is neither `Send` nor `Sync`); every async operation must be
//! awaited there, usually inside a `tokio::task::LocalSet`. The state is never borrowed
//! across an await point, so operations on different groups, or newer searches on the same
//! group, can overlap freely.
//!
//! Each group moves between `Idle` and `Searching`. Every search bumps the group's sequence
//! number and only a response carrying the latest number is applied, so results never arrive
//! out of order.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::debounce::Debouncer;
use crate::error::FilterError;
use crate::group::GroupRegistry;
use crate::item::{Item, ItemId, ItemStore, LexicalFeatures, normalize_text};
use crate::label::extract_label;
use crate::notify::{Notification, Notifier};
use crate::options::FilterOptions;
use crate::pagination::{ListContainer, PageSource, PaginatedContainerData};
use crate::pool::WorkerPool;
use crate::scorer::{ScoreRequest, Scorer};
use crate::sync::{ExternalTags, FrameBatch, StateSynchronizer};
use crate::{ClearButtonHandle, ItemHandle, SearchBoxHandle};

/// Search state of a group
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SearchPhase {
    /// No scoring task in flight
    #[default]
    Idle,
    /// A scoring task is in flight
    Searching,
}

/// What happened to a search
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// The result was rendered
    Applied {
        /// Number of visible items
        visible: usize,
    },
    /// A newer search on the same group was issued before the result arrived; it was dropped
    Superseded,
}

/// A visible entry, as returned by [`FilterController::results`]
#[derive(Debug, Clone, PartialEq)]
pub struct GroupEntry {
    /// Item id
    pub id: ItemId,
    /// Display label
    pub label: String,
    /// Score of the active search, `None` when showing everything
    pub score: Option<f32>,
    /// Current checkbox state
    pub checked: bool,
}

#[derive(Debug, Default)]
pub(crate) struct SearchState {
    term: String,
    seq: u64,
    phase: SearchPhase,
    scores: HashMap<ItemId, f32>,
}

impl SearchState {
    pub(crate) fn is_active(&self) -> bool {
        !self.term.trim().is_empty()
    }
}

#[derive(Default)]
pub(crate) struct FilterState {
    pub(crate) store: ItemStore,
    pub(crate) groups: GroupRegistry,
    pub(crate) searches: HashMap<String, SearchState>,
    pub(crate) containers: HashMap<String, Rc<dyn ListContainer>>,
    pub(crate) pagination: HashMap<String, PaginatedContainerData>,
    pub(crate) sync: StateSynchronizer,
    debouncer: Debouncer,
    notifier: Notifier,
}

impl FilterState {
    fn group_exists(&self, name: &str) -> Result<(), FilterError> {
        if self.groups.contains(name) {
            Ok(())
        } else {
            Err(FilterError::UnknownGroup(name.to_owned()))
        }
    }

    /// Copy the given items of a group for a worker, re-reading their checked state first
    fn snapshot(&mut self, ids: &[ItemId], query: String, threshold: f32) -> ScoreRequest {
        let items = ids
            .iter()
            .filter_map(|&id| {
                self.store.refresh_checked(id);
                self.store.get(id).map(Item::to_serializable)
            })
            .collect();
        ScoreRequest {
            items,
            search_term: query,
            score_threshold: threshold,
        }
    }

    /// Render the scores of the group's search: scored items visible, best first, the rest hidden
    fn apply_scores(&mut self, name: &str) -> usize {
        let Some(group) = self.groups.get_mut(name) else {
            return 0;
        };
        let empty = HashMap::new();
        let scores = self.searches.get(name).map_or(&empty, |search| &search.scores);

        let mut visible: Vec<(usize, ItemId, f32)> = group
            .item_ids()
            .iter()
            .enumerate()
            .filter_map(|(position, id)| scores.get(id).map(|score| (position, *id, *score)))
            .collect();
        visible.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)));

        let mut order: Vec<ItemId> = visible.iter().map(|(_, id, _)| *id).collect();
        for &id in group.item_ids() {
            let shown = scores.contains_key(&id);
            self.store.set_visible(id, shown);
            if !shown {
                order.push(id);
            }
        }
        group.set_display_order(order);

        let count = visible.len();
        self.render_order(name);
        self.notifier.emit(Notification::GroupVisibilityChanged {
            group: name.to_owned(),
            visible: count,
        });
        count
    }

    /// Show every item of the group in registration order
    fn show_all(&mut self, name: &str) -> usize {
        let Some(group) = self.groups.get_mut(name) else {
            return 0;
        };
        group.reset_display_order();
        for &id in group.item_ids() {
            self.store.set_visible(id, true);
        }

        let count = group.len();
        self.render_order(name);
        self.notifier.emit(Notification::GroupVisibilityChanged {
            group: name.to_owned(),
            visible: count,
        });
        count
    }

    fn render_order(&self, name: &str) {
        let (Some(container), Some(group)) = (self.containers.get(name), self.groups.get(name)) else {
            return;
        };
        let handles: Vec<Rc<dyn ItemHandle>> = group
            .display_order()
            .iter()
            .filter_map(|&id| self.store.handle(id))
            .collect();
        container.reorder(&handles);
    }
}

pub(crate) struct Inner {
    pub(crate) options: FilterOptions,
    pub(crate) pool: WorkerPool,
    pub(crate) state: RefCell<FilterState>,
    pub(crate) page_source: RefCell<Option<Rc<dyn PageSource>>>,
}

//------------------------------------------------------------------------------
/// Orchestrates registration, searches, pagination and checked-state synchronization.
///
/// Cloning is cheap and every clone drives the same state. The worker pool stops when the
/// last clone is dropped.
///
/// Handles passed to the controller must not call back into it from their methods.
#[derive(Clone)]
pub struct FilterController {
    pub(crate) inner: Rc<Inner>,
}

impl FilterController {
    /// Create a controller running the default lexical scorer
    pub fn new(options: FilterOptions) -> Result<Self, FilterError> {
        let pool = WorkerPool::new(options.pool_size)?;
        Ok(Self::with_pool(options, pool))
    }

    /// Create a controller whose workers run `scorer`
    pub fn with_scorer(options: FilterOptions, scorer: Arc<dyn Scorer>) -> Result<Self, FilterError> {
        let pool = WorkerPool::with_scorer(options.pool_size, scorer)?;
        Ok(Self::with_pool(options, pool))
    }

    fn with_pool(options: FilterOptions, pool: WorkerPool) -> Self {
        Self {
            inner: Rc::new(Inner {
                options,
                pool,
                state: RefCell::new(FilterState::default()),
                page_source: RefCell::new(None),
            }),
        }
    }

    /// Options the controller was built with
    pub fn options(&self) -> &FilterOptions {
        &self.inner.options
    }

    /// The worker pool running the searches
    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Set the transport used by [`Self::discover_and_merge`]
    pub fn set_page_source(&self, source: Rc<dyn PageSource>) {
        *self.inner.page_source.borrow_mut() = Some(source);
    }

    /// Receive the notifications emitted from now on
    pub fn subscribe(&self) -> UnboundedReceiver<Notification> {
        self.inner.state.borrow_mut().notifier.subscribe()
    }

    //--------------------------------------------------------------------------
    // registration

    /// Seed group `name` from its rendered entries, replacing any previous content.
    ///
    /// The group is matched against external tags under the field of the same name.
    /// Returns the number of items registered.
    pub fn register_group<I>(&self, name: &str, elements: I) -> Result<usize, FilterError>
    where
        I: IntoIterator<Item = Rc<dyn ItemHandle>>,
    {
        self.register_group_with_field(name, name, elements)
    }

    /// Like [`Self::register_group`], matching external tags under `field`.
    ///
    /// Entries without a label are skipped, as are entries repeating a label already seen in
    /// the group. Records discovered by an earlier sweep are merged right away.
    pub fn register_group_with_field<I>(&self, name: &str, field: &str, elements: I) -> Result<usize, FilterError>
    where
        I: IntoIterator<Item = Rc<dyn ItemHandle>>,
    {
        let strategies = &self.inner.options.label_strategies;
        let fold_accents = self.inner.options.normalize;
        let mut state = self.inner.state.borrow_mut();
        let state = &mut *state;

        let group = state.groups.entry(name, field);
        group.set_field(field);
        for old in group.take_items() {
            state.store.remove(old);
        }
        if let Some(search) = state.searches.get_mut(name) {
            search.scores.clear();
        }

        let mut registered = 0;
        for element in elements {
            let Some(label) = extract_label(&*element, strategies) else {
                debug!("skipping entry without label in group {name}");
                continue;
            };
            if group.find_label(&label).is_some() {
                trace!("skipping duplicate {label:?} in group {name}");
                continue;
            }
            let features = LexicalFeatures::new(&label, fold_accents);
            let item = Item::new(label.as_str(), features).checked(element.is_checked());
            let id = state.store.insert(item, &element);
            group.push(id, &label);
            registered += 1;
        }

        let merged = state.merge_discovered(name).merged.len();
        debug!("registered group {name}: {registered} item(s), {merged} from earlier pages");
        Ok(registered + merged)
    }

    /// Bind the search box of a group, replacing the previous one
    pub fn bind_search_box(&self, group: &str, search_box: &Rc<dyn SearchBoxHandle>) -> Result<(), FilterError> {
        let mut state = self.inner.state.borrow_mut();
        let group = state
            .groups
            .get_mut(group)
            .ok_or_else(|| FilterError::UnknownGroup(group.to_owned()))?;
        group.bind_search_box(search_box);
        Ok(())
    }

    /// Bind the clear button of a group, replacing the previous one
    pub fn bind_clear_button(&self, group: &str, clear_button: &Rc<dyn ClearButtonHandle>) -> Result<(), FilterError> {
        let mut state = self.inner.state.borrow_mut();
        let group = state
            .groups
            .get_mut(group)
            .ok_or_else(|| FilterError::UnknownGroup(group.to_owned()))?;
        clear_button.set_visible(group.search_box().is_some_and(|b| !b.value().trim().is_empty()));
        group.bind_clear_button(clear_button);
        Ok(())
    }

    /// Bind the rendered list of a group. The group does not have to be registered yet.
    pub fn bind_container(&self, group: &str, container: Rc<dyn ListContainer>) {
        let mut state = self.inner.state.borrow_mut();
        state.containers.insert(group.to_owned(), container);
    }

    /// Remove an item from the store and from every group referencing it
    pub fn remove_item(&self, id: ItemId) -> bool {
        let mut state = self.inner.state.borrow_mut();
        state.groups.remove_item(id);
        for search in state.searches.values_mut() {
            search.scores.remove(&id);
        }
        state.store.remove(id).is_some()
    }

    //--------------------------------------------------------------------------
    // searching

    /// Search `group` for `term` and render the result.
    ///
    /// An empty term shows every item in registration order without involving the workers.
    /// Otherwise the items are scored by the pool; once the response arrives, exactly the
    /// returned items are visible, best first. If a newer search was issued meanwhile, the
    /// response is dropped and [`FilterOutcome::Superseded`] is returned. If the task fails,
    /// the error is returned and the visible set is left as it was.
    pub async fn filter(&self, group: &str, term: &str) -> Result<FilterOutcome, FilterError> {
        let query = normalize_text(term, self.inner.options.normalize);
        let (seq, request) = {
            let mut state = self.inner.state.borrow_mut();
            let state = &mut *state;
            state.group_exists(group)?;

            let search = state.searches.entry(group.to_owned()).or_default();
            search.seq += 1;
            search.term = term.trim().to_owned();
            if query.is_empty() {
                search.phase = SearchPhase::Idle;
                search.scores.clear();
                let visible = state.show_all(group);
                return Ok(FilterOutcome::Applied { visible });
            }
            search.phase = SearchPhase::Searching;
            let seq = search.seq;

            let ids = state.groups.get(group).map(|g| g.item_ids().to_vec()).unwrap_or_default();
            (seq, state.snapshot(&ids, query, self.inner.options.score_threshold))
        };
        let snapshot: HashSet<ItemId> = request.items.iter().map(|item| item.id).collect();
        debug!("search #{seq} on group {group}: {} item(s)", snapshot.len());

        let response = self.inner.pool.submit(request).await;

        let mut state = self.inner.state.borrow_mut();
        let Some(search) = state.searches.get_mut(group).filter(|search| search.seq == seq) else {
            trace!("search #{seq} on group {group} superseded");
            return Ok(FilterOutcome::Superseded);
        };
        search.phase = SearchPhase::Idle;
        let response = response?;

        // items merged while the task ran keep the scores they got on their own
        search.scores.retain(|id, _| !snapshot.contains(id));
        search
            .scores
            .extend(response.filtered_items.iter().map(|scored| (scored.id, scored.score)));
        let visible = state.apply_scores(group);
        Ok(FilterOutcome::Applied { visible })
    }

    /// Score items merged into `group` against its active term and render them
    pub(crate) async fn score_merged(&self, group: &str, ids: Vec<ItemId>) -> Result<(), FilterError> {
        let (seq, request) = {
            let mut state = self.inner.state.borrow_mut();
            let Some(search) = state.searches.get(group).filter(|search| search.is_active()) else {
                return Ok(());
            };
            let seq = search.seq;
            let query = normalize_text(&search.term, self.inner.options.normalize);
            (seq, state.snapshot(&ids, query, self.inner.options.score_threshold))
        };

        let response = self.inner.pool.submit(request).await?;

        let mut state = self.inner.state.borrow_mut();
        let Some(search) = state.searches.get_mut(group).filter(|search| search.seq == seq) else {
            trace!("scores of merged items in group {group} are stale");
            return Ok(());
        };
        search
            .scores
            .extend(response.filtered_items.iter().map(|scored| (scored.id, scored.score)));
        state.apply_scores(group);
        Ok(())
    }

    /// Debounced search: keystrokes within the coalescing window trigger a single search.
    ///
    /// The clear button follows the term immediately. Must be called within a
    /// `tokio::task::LocalSet`.
    pub fn input(&self, group: &str, term: &str) -> Result<(), FilterError> {
        let window = {
            let mut state = self.inner.state.borrow_mut();
            let state = &mut *state;
            let bound = state
                .groups
                .get(group)
                .ok_or_else(|| FilterError::UnknownGroup(group.to_owned()))?;
            if let Some(clear_button) = bound.clear_button() {
                clear_button.set_visible(!term.trim().is_empty());
            }
            state.debouncer.offer(group, term)
        };

        if let Some(window) = window {
            let controller = self.clone();
            let group = group.to_owned();
            let delay = self.inner.options.debounce;
            tokio::task::spawn_local(async move {
                tokio::time::sleep(delay).await;
                let term = controller.inner.state.borrow_mut().debouncer.take(&group, window);
                if let Some(term) = term
                    && let Err(err) = controller.filter(&group, &term).await
                {
                    debug!("debounced search on group {group} failed: {err}");
                }
            });
        }
        Ok(())
    }

    /// Read the bound search box of `group` and feed its value to [`Self::input`]
    pub fn search_box_changed(&self, group: &str) -> Result<(), FilterError> {
        let value = {
            let state = self.inner.state.borrow();
            let bound = state
                .groups
                .get(group)
                .ok_or_else(|| FilterError::UnknownGroup(group.to_owned()))?;
            bound.search_box().map(|search_box| search_box.value()).unwrap_or_default()
        };
        self.input(group, &value)
    }

    /// Reset the search box of `group` and show all its items
    pub async fn clear(&self, group: &str) -> Result<FilterOutcome, FilterError> {
        {
            let mut state = self.inner.state.borrow_mut();
            let bound = state
                .groups
                .get(group)
                .ok_or_else(|| FilterError::UnknownGroup(group.to_owned()))?;
            if let Some(search_box) = bound.search_box() {
                search_box.set_value("");
            }
            if let Some(clear_button) = bound.clear_button() {
                clear_button.set_visible(false);
            }
            state.debouncer.cancel(group);
        }
        self.filter(group, "").await
    }

    //--------------------------------------------------------------------------
    // checked state

    /// Record the checked state of every item of `group` before its elements are replaced
    pub fn capture_state(&self, group: &str) -> Result<usize, FilterError> {
        let mut state = self.inner.state.borrow_mut();
        let state = &mut *state;
        let bound = state
            .groups
            .get(group)
            .ok_or_else(|| FilterError::UnknownGroup(group.to_owned()))?;
        Ok(state.sync.capture(bound, &mut state.store))
    }

    /// Re-check the items of `group` captured as checked.
    ///
    /// Returns the number of elements written.
    pub fn restore_state(&self, group: &str) -> Result<usize, FilterError> {
        let mut state = self.inner.state.borrow_mut();
        let state = &mut *state;
        let bound = state
            .groups
            .get(group)
            .ok_or_else(|| FilterError::UnknownGroup(group.to_owned()))?;
        Ok(state.sync.restore(bound, &mut state.store))
    }

    /// Replace the rendered entries of `group`, e.g. after a "load more" click.
    ///
    /// Captures the checked state, registers the new entries, restores the state and runs
    /// the active search again.
    pub async fn replace_group<I>(&self, group: &str, elements: I) -> Result<usize, FilterError>
    where
        I: IntoIterator<Item = Rc<dyn ItemHandle>>,
    {
        let field = {
            let state = self.inner.state.borrow();
            state.groups.get(group).map(|bound| bound.field().to_owned())
        };
        if field.is_some() {
            self.capture_state(group)?;
        }
        let registered =
            self.register_group_with_field(group, field.as_deref().unwrap_or(group), elements)?;
        self.restore_state(group)?;

        if let Some(term) = self.active_term(group) {
            self.filter(group, &term).await?;
        }
        Ok(registered)
    }

    /// Align every item's checked state with the active external tags.
    ///
    /// All writes are planned first, then flushed together on the next turn of the event loop,
    /// followed by a single [`Notification::SynchronizationComplete`]. Groups with an active
    /// search are searched again so that newly checked items show up.
    pub async fn reconcile_with_external_tags(&self, active: &ExternalTags) -> usize {
        let batch = {
            let mut state = self.inner.state.borrow_mut();
            let state = &mut *state;
            FrameBatch::plan(&mut state.store, &state.groups, active)
        };
        trace!("{} checked-state write(s) planned", batch.len());
        let touched = batch.groups();

        // frame boundary
        tokio::task::yield_now().await;

        let updated = {
            let mut state = self.inner.state.borrow_mut();
            let state = &mut *state;
            let updated = batch.flush(&mut state.store, &mut state.sync);
            state.notifier.emit(Notification::SynchronizationComplete {
                timestamp: SystemTime::now(),
                updated,
            });
            updated
        };
        debug!("external tags reconciled, {updated} element(s) updated");

        for group in touched {
            if let Some(term) = self.active_term(&group)
                && let Err(err) = self.filter(&group, &term).await
            {
                debug!("search refresh of group {group} failed: {err}");
            }
        }
        updated
    }

    //--------------------------------------------------------------------------
    // queries

    /// Visible entries of `group`, in display order
    pub fn results(&self, group: &str) -> Result<Vec<GroupEntry>, FilterError> {
        let state = self.inner.state.borrow();
        let bound = state
            .groups
            .get(group)
            .ok_or_else(|| FilterError::UnknownGroup(group.to_owned()))?;
        let scores = state.searches.get(group).map(|search| &search.scores);

        Ok(bound
            .display_order()
            .iter()
            .filter_map(|&id| state.store.get(id))
            .filter(|item| item.is_visible())
            .map(|item| GroupEntry {
                id: item.id(),
                label: item.label_text().to_owned(),
                score: scores.and_then(|scores| scores.get(&item.id()).copied()),
                checked: item.is_checked(),
            })
            .collect())
    }

    /// Ids of the visible items of `group`, in display order
    pub fn visible_ids(&self, group: &str) -> Result<Vec<ItemId>, FilterError> {
        Ok(self.results(group)?.into_iter().map(|entry| entry.id).collect())
    }

    /// Labels of the checked items of `group`, hidden ones included, in registration order
    pub fn checked_labels(&self, group: &str) -> Result<Vec<String>, FilterError> {
        let mut state = self.inner.state.borrow_mut();
        let state = &mut *state;
        let bound = state
            .groups
            .get(group)
            .ok_or_else(|| FilterError::UnknownGroup(group.to_owned()))?;
        let mut labels = Vec::new();
        for &id in bound.item_ids() {
            if state.store.refresh_checked(id)
                && let Some(item) = state.store.get(id)
            {
                labels.push(item.label_text().to_owned());
            }
        }
        Ok(labels)
    }

    /// The active search term of `group`, if any
    pub fn active_term(&self, group: &str) -> Option<String> {
        let state = self.inner.state.borrow();
        state
            .searches
            .get(group)
            .filter(|search| search.is_active())
            .map(|search| search.term.clone())
    }

    /// Search phase of `group`
    pub fn group_state(&self, group: &str) -> Option<SearchPhase> {
        let state = self.inner.state.borrow();
        if !state.groups.contains(group) {
            return None;
        }
        Some(state.searches.get(group).map(|search| search.phase).unwrap_or_default())
    }

    /// Number of items of `group`
    pub fn group_len(&self, group: &str) -> Option<usize> {
        self.inner.state.borrow().groups.get(group).map(|bound| bound.len())
    }

    /// Run `f` on the pagination state of `group`'s container
    pub fn with_pagination<R>(&self, group: &str, f: impl FnOnce(Option<&PaginatedContainerData>) -> R) -> R {
        let state = self.inner.state.borrow();
        f(state.pagination.get(group))
    }
}
