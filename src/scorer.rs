//! Lexical scorer run inside the workers, and the worker message protocol.
//!
//! Scoring is layered: exact, prefix and substring matches on the normalized text come
//! first, then token overlap for multi-word queries, and only when all of that stays weak,
//! a bigram overlap that tolerates typos. No edit distance is ever computed.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::item::{ItemId, char_ngrams, normalize_text};

/// Score forced on checked items, above any match
pub const CHECKED_SCORE: f32 = 1.1;
/// Normalized text equals the query
pub const EXACT_SCORE: f32 = 1.0;
/// Normalized text starts with the query
pub const PREFIX_SCORE: f32 = 0.9;
/// Normalized text contains the query
pub const SUBSTRING_SCORE: f32 = 0.7;
/// Weight of the token overlap fraction
pub const TOKEN_WEIGHT: f32 = 0.8;
/// Weight of the bigram overlap fraction
pub const NGRAM_WEIGHT: f32 = 0.6;
/// Below this score the bigram fallback is tried
pub const FUZZY_FLOOR: f32 = 0.5;
/// Default visibility threshold
pub const DEFAULT_THRESHOLD: f32 = 0.3;

//------------------------------------------------------------------------------
// Protocol

/// The copy of an item sent to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializableItem {
    /// Item id
    pub id: ItemId,
    /// Lowercased label, accents folded when enabled
    pub normalized_text: String,
    /// Whitespace-separated words of the label
    pub tokens: Vec<String>,
    /// Character 2- and 3-grams of the label
    pub ngrams: Vec<String>,
    /// Checked items always match
    pub is_checked: bool,
}

/// One scoring task payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRequest {
    /// Items to score, in display order
    pub items: Vec<SerializableItem>,
    /// Raw query
    pub search_term: String,
    /// Scores at or below this are dropped
    pub score_threshold: f32,
}

/// A kept item and its score
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    /// Item id
    pub id: ItemId,
    /// Relevance, higher is better
    pub score: f32,
}

/// Result of a scoring task
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResponse {
    /// Kept items, best first
    pub filtered_items: Vec<ScoredItem>,
}

//------------------------------------------------------------------------------
/// Scoring function executed by the workers
///
/// Implementations must be pure: they only see the request, never the item store.
pub trait Scorer: Send + Sync + 'static {
    /// Score every item of the request
    fn score(&self, request: &ScoreRequest) -> ScoreResponse;
}

/// The default layered lexical scorer
#[derive(Debug, Default, Copy, Clone)]
pub struct LexicalScorer;

impl Scorer for LexicalScorer {
    fn score(&self, request: &ScoreRequest) -> ScoreResponse {
        ScoreResponse {
            filtered_items: score(&request.items, &request.search_term, request.score_threshold),
        }
    }
}

struct Query {
    text: String,
    tokens: Vec<String>,
    bigrams: HashSet<String>,
}

impl Query {
    fn new(search_term: &str) -> Self {
        let text = normalize_text(search_term, false);
        let tokens = text.split_whitespace().map(String::from).collect();
        let bigrams = char_ngrams(&text, 2).collect();
        Self { text, tokens, bigrams }
    }
}

/// Score `items` against `search_term`.
///
/// Returns the items scoring strictly above `threshold`, plus every checked item, best
/// first; ties keep the input order. An empty term keeps every item with a score of 0, in
/// input order.
pub fn score(items: &[SerializableItem], search_term: &str, threshold: f32) -> Vec<ScoredItem> {
    let query = Query::new(search_term);
    if query.text.is_empty() {
        return items.iter().map(|item| ScoredItem { id: item.id, score: 0.0 }).collect();
    }

    // checked items are kept whatever the threshold
    let mut scored: Vec<ScoredItem> = items
        .iter()
        .map(|item| (item, score_item(item, &query)))
        .filter(|(item, score)| item.is_checked || *score > threshold)
        .map(|(item, score)| ScoredItem { id: item.id, score })
        .collect();

    // stable, so equal scores keep the input order
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

fn score_item(item: &SerializableItem, query: &Query) -> f32 {
    if item.is_checked {
        return CHECKED_SCORE;
    }

    let text = item.normalized_text.as_str();
    let mut score = if text == query.text {
        EXACT_SCORE
    } else if text.starts_with(&query.text) {
        PREFIX_SCORE
    } else if text.contains(&query.text) {
        SUBSTRING_SCORE
    } else {
        0.0
    };

    if query.tokens.len() > 1 {
        let matched = query
            .tokens
            .iter()
            .filter(|q| item.tokens.iter().any(|t| t.contains(q.as_str())))
            .count();
        let overlap = matched as f32 / query.tokens.len() as f32;
        score = score.max(overlap * TOKEN_WEIGHT);
    }

    if score < FUZZY_FLOOR {
        let matched = query
            .bigrams
            .iter()
            .filter(|gram| item.ngrams.iter().any(|own| own == *gram))
            .count();
        let overlap = matched as f32 / query.bigrams.len().max(1) as f32;
        score = score.max(overlap * NGRAM_WEIGHT);
    }

    trace!("score {score:.3} for {:?}", item.normalized_text);
    score
}
