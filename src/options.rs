//! Configuration options for the filter engine.
//!
//! This module provides the `FilterOptions` struct and its builder, covering the worker pool,
//! scoring, input coalescing, label extraction and pagination.

use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use derive_builder::Builder;

use crate::label::LabelStrategy;
use crate::scorer::DEFAULT_THRESHOLD;

/// Default input coalescing window
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);
/// Default number of page fetches in flight during a sweep
pub const DEFAULT_PAGE_CONCURRENCY: usize = 2;

fn default_pool_size() -> usize {
    thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1)
}

/// Options for the filter engine
///
/// All fields have defaults, so `FilterOptionsBuilder::default().build()` is always valid.
#[derive(Builder, Debug, Clone)]
#[builder(default, build_fn(validate = "Self::validate"))]
#[cfg_attr(feature = "cli", derive(clap::Args))]
pub struct FilterOptions {
    /// Number of scoring workers
    ///
    /// Defaults to the available hardware concurrency, with a minimum of 1.
    #[cfg_attr(feature = "cli", arg(long, default_value_t = default_pool_size(), help_heading = "Engine"))]
    pub pool_size: usize,

    /// Minimum score an item must exceed to stay visible while searching
    #[cfg_attr(feature = "cli", arg(long, default_value_t = DEFAULT_THRESHOLD, help_heading = "Search"))]
    pub score_threshold: f32,

    /// Input coalescing window
    ///
    /// Keystrokes arriving within this window trigger a single search.
    #[cfg_attr(feature = "cli", arg(skip = DEFAULT_DEBOUNCE))]
    pub debounce: Duration,

    /// Ordered label extraction strategies, first non-empty match wins
    #[cfg_attr(
        feature = "cli",
        arg(
            long,
            value_enum,
            value_delimiter = ',',
            default_values_t = LabelStrategy::DEFAULT_ORDER,
            help_heading = "Search"
        )
    )]
    pub label_strategies: Vec<LabelStrategy>,

    /// Fold accents before matching, so that `é` matches `e`
    #[cfg_attr(feature = "cli", arg(long, help_heading = "Search"))]
    pub normalize: bool,

    /// Number of page fetches kept in flight when the page count is known
    #[cfg_attr(feature = "cli", arg(skip = DEFAULT_PAGE_CONCURRENCY))]
    pub page_concurrency: usize,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            score_threshold: DEFAULT_THRESHOLD,
            debounce: DEFAULT_DEBOUNCE,
            label_strategies: LabelStrategy::DEFAULT_ORDER.to_vec(),
            normalize: false,
            page_concurrency: DEFAULT_PAGE_CONCURRENCY,
        }
    }
}

impl FilterOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.pool_size == Some(0) {
            return Err(String::from("pool_size must be at least 1"));
        }
        if self.page_concurrency == Some(0) {
            return Err(String::from("page_concurrency must be at least 1"));
        }
        if let Some(strategies) = &self.label_strategies
            && strategies.is_empty()
        {
            return Err(String::from("at least one label strategy is required"));
        }
        Ok(())
    }
}
