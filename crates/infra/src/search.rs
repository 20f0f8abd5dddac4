use std::collections::HashMap;
use std::sync::Arc;

use relay_domain::ports::BoxFuture;
use relay_domain::ports::search::{
    SearchDoc, SearchError, SearchHits, SearchIndex, SearchMode, SearchQuery,
};
use tokio::sync::RwLock;

/// In-process `messages` index. Documents are keyed by message id, so
/// re-indexing a redelivered event overwrites rather than duplicates.
#[derive(Clone, Default)]
pub struct MemorySearchIndex {
    docs: Arc<RwLock<HashMap<i64, SearchDoc>>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
}

fn matches(doc: &SearchDoc, query: &SearchQuery) -> bool {
    if let Some(chat_id) = query.chat_id {
        if doc.chat_id != chat_id {
            return false;
        }
    }
    match query.mode {
        SearchMode::Match => {
            let needles: Vec<String> = tokenize(&query.text).collect();
            if needles.is_empty() {
                return false;
            }
            tokenize(&doc.body).any(|token| needles.contains(&token))
        }
        SearchMode::Wildcard => doc.body.to_lowercase().contains(&query.text.to_lowercase()),
    }
}

impl SearchIndex for MemorySearchIndex {
    fn index(&self, doc: &SearchDoc) -> BoxFuture<'_, Result<(), SearchError>> {
        let doc = doc.clone();
        let docs = self.docs.clone();
        Box::pin(async move {
            docs.write().await.insert(doc.id, doc);
            Ok(())
        })
    }

    fn index_bulk(&self, batch: &[SearchDoc]) -> BoxFuture<'_, Result<(), SearchError>> {
        let batch = batch.to_vec();
        let docs = self.docs.clone();
        Box::pin(async move {
            let mut docs = docs.write().await;
            for doc in batch {
                docs.insert(doc.id, doc);
            }
            Ok(())
        })
    }

    fn search(&self, query: &SearchQuery) -> BoxFuture<'_, Result<SearchHits, SearchError>> {
        let query = query.clone();
        let docs = self.docs.clone();
        Box::pin(async move {
            let docs = docs.read().await;
            let mut hits: Vec<SearchDoc> = docs
                .values()
                .filter(|doc| matches(doc, &query))
                .cloned()
                .collect();
            hits.sort_by_key(|doc| (doc.created_at_ms, doc.id));
            let total = hits.len() as u64;
            let hits = hits
                .into_iter()
                .skip(query.offset as usize)
                .take(query.limit as usize)
                .collect();
            Ok(SearchHits { hits, total })
        })
    }

    fn delete_by_chat(&self, chat_id: i64) -> BoxFuture<'_, Result<u64, SearchError>> {
        let docs = self.docs.clone();
        Box::pin(async move {
            let mut docs = docs.write().await;
            let before = docs.len();
            docs.retain(|_, doc| doc.chat_id != chat_id);
            Ok((before - docs.len()) as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: i64, chat_id: i64, body: &str) -> SearchDoc {
        SearchDoc {
            id,
            number: id,
            body: body.to_string(),
            chat_id,
            created_at_ms: id * 1_000,
        }
    }

    fn query(text: &str, mode: SearchMode, chat_id: Option<i64>) -> SearchQuery {
        SearchQuery {
            text: text.to_string(),
            mode,
            chat_id,
            offset: 0,
            limit: 10,
        }
    }

    #[tokio::test]
    async fn match_mode_finds_whole_tokens_case_insensitively() {
        let index = MemorySearchIndex::new();
        index.index(&doc(5, 1, "Hello world")).await.unwrap();
        index.index(&doc(6, 1, "hellos around")).await.unwrap();

        let hits = index
            .search(&query("hello", SearchMode::Match, None))
            .await
            .unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.hits[0].id, 5);
    }

    #[tokio::test]
    async fn wildcard_mode_matches_partial_tokens() {
        let index = MemorySearchIndex::new();
        index.index(&doc(1, 1, "deployment finished")).await.unwrap();

        let miss = index
            .search(&query("ploy", SearchMode::Match, None))
            .await
            .unwrap();
        assert_eq!(miss.total, 0);

        let hit = index
            .search(&query("ploy", SearchMode::Wildcard, None))
            .await
            .unwrap();
        assert_eq!(hit.total, 1);
    }

    #[tokio::test]
    async fn chat_filter_restricts_hits() {
        let index = MemorySearchIndex::new();
        index.index(&doc(1, 1, "hello")).await.unwrap();
        index.index(&doc(2, 2, "hello")).await.unwrap();

        let hits = index
            .search(&query("hello", SearchMode::Match, Some(2)))
            .await
            .unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.hits[0].chat_id, 2);
    }

    #[tokio::test]
    async fn reindexing_the_same_id_is_idempotent() {
        let index = MemorySearchIndex::new();
        index.index(&doc(1, 1, "first")).await.unwrap();
        index.index_bulk(&[doc(1, 1, "first"), doc(1, 1, "first")]).await.unwrap();

        let hits = index
            .search(&query("first", SearchMode::Match, None))
            .await
            .unwrap();
        assert_eq!(hits.total, 1);
    }

    #[tokio::test]
    async fn pagination_reports_full_total() {
        let index = MemorySearchIndex::new();
        for id in 1..=5 {
            index.index(&doc(id, 1, "hello")).await.unwrap();
        }
        let mut paged = query("hello", SearchMode::Match, None);
        paged.offset = 2;
        paged.limit = 2;
        let hits = index.search(&paged).await.unwrap();
        assert_eq!(hits.total, 5);
        assert_eq!(
            hits.hits.iter().map(|doc| doc.id).collect::<Vec<_>>(),
            vec![3, 4]
        );
    }

    #[tokio::test]
    async fn delete_by_chat_drops_only_that_chat() {
        let index = MemorySearchIndex::new();
        index.index(&doc(1, 1, "hello")).await.unwrap();
        index.index(&doc(2, 2, "hello")).await.unwrap();

        assert_eq!(index.delete_by_chat(1).await.unwrap(), 1);
        let hits = index
            .search(&query("hello", SearchMode::Match, None))
            .await
            .unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.hits[0].chat_id, 2);
    }
}
