use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::DomainResult;
use crate::cache_keys::{self, CacheTtls};
use crate::caching;
use crate::error::DomainError;
use crate::events::{EventPublisher, MessageCreatedEvent};
use crate::pagination::{PageMeta, PageParams};
use crate::ports::cache::ResponseCache;
use crate::ports::search::{SearchDoc, SearchHits, SearchIndex, SearchMode, SearchQuery};
use crate::ports::store::{ApplicationRepository, ChatRepository, MessageRepository, NewMessage};
use crate::util::format_ms_rfc3339;
use crate::view::View;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub number: i64,
    pub body: String,
    pub chat_id: i64,
    pub application_id: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageSummary {
    pub number: i64,
    pub body: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MessageSort {
    #[default]
    Number,
    CreatedAt,
}

impl MessageSort {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageSort::Number => "number",
            MessageSort::CreatedAt => "created_at",
        }
    }

    pub fn parse(value: &str) -> Option<MessageSort> {
        match value {
            "number" => Some(MessageSort::Number),
            "created_at" => Some(MessageSort::CreatedAt),
            _ => None,
        }
    }
}

impl Message {
    pub fn summary(&self) -> MessageSummary {
        MessageSummary {
            number: self.number,
            body: self.body.clone(),
        }
    }

    pub fn render(&self, view: View) -> Value {
        match view {
            View::Summary => json!({
                "number": self.number,
                "body": self.body,
            }),
            View::Full => json!({
                "id": self.id,
                "number": self.number,
                "body": self.body,
                "chat_id": self.chat_id,
                "created_at": format_ms_rfc3339(self.created_at_ms),
                "updated_at": format_ms_rfc3339(self.updated_at_ms),
            }),
        }
    }
}

fn render_hit(doc: &SearchDoc) -> Value {
    json!({
        "id": doc.id,
        "number": doc.number,
        "body": doc.body,
        "chat_id": doc.chat_id,
        "created_at": format_ms_rfc3339(doc.created_at_ms),
    })
}

#[derive(Clone)]
pub struct MessageService {
    applications: Arc<dyn ApplicationRepository>,
    chats: Arc<dyn ChatRepository>,
    messages: Arc<dyn MessageRepository>,
    cache: Arc<dyn ResponseCache>,
    search: Arc<dyn SearchIndex>,
    publisher: EventPublisher,
    ttls: CacheTtls,
}

impl MessageService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        chats: Arc<dyn ChatRepository>,
        messages: Arc<dyn MessageRepository>,
        cache: Arc<dyn ResponseCache>,
        search: Arc<dyn SearchIndex>,
        publisher: EventPublisher,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            applications,
            chats,
            messages,
            cache,
            search,
            publisher,
            ttls,
        }
    }

    /// Persists the message with an atomically assigned number, then emits
    /// the creation event for counter aggregation and search projection.
    /// `messages_count` converges when the aggregator runs.
    pub async fn create(
        &self,
        token: &str,
        chat_number: i64,
        body: &str,
    ) -> DomainResult<MessageSummary> {
        let body = validate_body(body)?;
        let (application, chat) = self.chat_by_number(token, chat_number).await?;

        let message = self
            .messages
            .create(&NewMessage {
                chat_id: chat.id,
                application_id: application.id,
                body,
            })
            .await?;

        self.publisher
            .publish_message_created(&MessageCreatedEvent::from_message(
                &message,
                &application.token,
                chat.number,
            ))
            .await;

        caching::delete_prefix(
            self.cache.as_ref(),
            &cache_keys::messages_listing_prefix(token, chat_number),
        )
        .await;
        for view in [View::Summary, View::Full] {
            caching::delete(
                self.cache.as_ref(),
                &cache_keys::chat_key(token, chat_number, view),
            )
            .await;
        }
        caching::delete_prefix(self.cache.as_ref(), &cache_keys::chats_listing_prefix(token))
            .await;

        Ok(message.summary())
    }

    pub async fn list(
        &self,
        token: &str,
        chat_number: i64,
        params: PageParams,
        sort: MessageSort,
    ) -> DomainResult<Value> {
        let (_, chat) = self.chat_by_number(token, chat_number).await?;
        let key = cache_keys::messages_page_key(token, chat_number, params.page, params.limit, sort);
        if let Some(hit) = caching::get(self.cache.as_ref(), &key).await {
            return Ok(hit);
        }

        let (rows, total) = self
            .messages
            .list_by_chat(chat.id, sort, params.offset(), params.limit)
            .await?;
        let data: Vec<Value> = rows.iter().map(|message| message.render(View::Summary)).collect();
        let response = json!({
            "data": data,
            "meta": PageMeta::new(params, total),
        });
        caching::put(self.cache.as_ref(), &key, &response, self.ttls.listing).await;
        Ok(response)
    }

    /// Full-text lookup against the search index. Index trouble degrades to
    /// an empty result set rather than failing the request; freshly created
    /// messages become visible once the indexer has run.
    pub async fn search(
        &self,
        token: &str,
        chat_number: i64,
        text: &str,
        partial: bool,
        params: PageParams,
    ) -> DomainResult<Value> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DomainError::Validation("query is required".into()));
        }
        let (_, chat) = self.chat_by_number(token, chat_number).await?;

        let query = SearchQuery {
            text: text.to_string(),
            mode: if partial {
                SearchMode::Wildcard
            } else {
                SearchMode::Match
            },
            chat_id: Some(chat.id),
            offset: params.offset(),
            limit: params.limit,
        };
        let hits = match self.search.search(&query).await {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!(error = %err, "search index unavailable, returning empty result");
                SearchHits::default()
            }
        };

        let data: Vec<Value> = hits.hits.iter().map(render_hit).collect();
        Ok(json!({
            "data": data,
            "meta": PageMeta::new(params, hits.total),
        }))
    }

    async fn chat_by_number(
        &self,
        token: &str,
        chat_number: i64,
    ) -> DomainResult<(crate::application::Application, crate::chat::Chat)> {
        let application = self
            .applications
            .find_by_token(token)
            .await?
            .ok_or(DomainError::NotFound)?;
        let chat = self
            .chats
            .find_by_number(application.id, chat_number)
            .await?
            .ok_or(DomainError::NotFound)?;
        Ok((application, chat))
    }
}

pub fn validate_body(body: &str) -> DomainResult<String> {
    let body = body.trim().to_string();
    if body.is_empty() {
        return Err(DomainError::Validation("body is required".into()));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_validation_rejects_blank_input() {
        assert!(validate_body("").is_err());
        assert!(validate_body("  \n ").is_err());
        assert_eq!(validate_body(" hi ").expect("valid"), "hi");
    }

    #[test]
    fn sort_parses_known_values_only() {
        assert_eq!(MessageSort::parse("number"), Some(MessageSort::Number));
        assert_eq!(MessageSort::parse("created_at"), Some(MessageSort::CreatedAt));
        assert_eq!(MessageSort::parse("body"), None);
    }

    #[test]
    fn render_variants_differ_in_exposure() {
        let message = Message {
            id: 5,
            number: 1,
            body: "hello world".to_string(),
            chat_id: 9,
            application_id: 2,
            created_at_ms: 0,
            updated_at_ms: 0,
        };
        let summary = message.render(View::Summary);
        assert_eq!(summary, serde_json::json!({"number": 1, "body": "hello world"}));
        let full = message.render(View::Full);
        assert_eq!(full["id"], 5);
        assert_eq!(full["chat_id"], 9);
    }
}
