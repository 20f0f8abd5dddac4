use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::BoxFuture;

pub const MESSAGES_INDEX: &str = "messages";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search index unavailable: {0}")]
    Unavailable(String),
    #[error("search operation failed: {0}")]
    Operation(String),
}

/// Projection of a message into the search index, keyed by message id so
/// repeated indexing of the same event is idempotent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchDoc {
    pub id: i64,
    pub number: i64,
    pub body: String,
    pub chat_id: i64,
    pub created_at_ms: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchMode {
    /// Case-insensitive whole-token match on `body`.
    Match,
    /// Substring match for partial tokens.
    Wildcard,
}

#[derive(Clone, Debug)]
pub struct SearchQuery {
    pub text: String,
    pub mode: SearchMode,
    pub chat_id: Option<i64>,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Clone, Debug, Default)]
pub struct SearchHits {
    pub hits: Vec<SearchDoc>,
    pub total: u64,
}

pub trait SearchIndex: Send + Sync {
    fn index(&self, doc: &SearchDoc) -> BoxFuture<'_, Result<(), SearchError>>;
    fn index_bulk(&self, docs: &[SearchDoc]) -> BoxFuture<'_, Result<(), SearchError>>;
    fn search(&self, query: &SearchQuery) -> BoxFuture<'_, Result<SearchHits, SearchError>>;
    /// Drops every document belonging to a chat; returns how many were
    /// removed.
    fn delete_by_chat(&self, chat_id: i64) -> BoxFuture<'_, Result<u64, SearchError>>;
}
