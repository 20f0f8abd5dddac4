use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::DomainResult;
use crate::application::Application;
use crate::cache_keys::{self, CacheTtls};
use crate::caching;
use crate::error::DomainError;
use crate::events::EventPublisher;
use crate::pagination::{PageMeta, PageParams};
use crate::ports::cache::{CounterStore, ResponseCache};
use crate::ports::search::SearchIndex;
use crate::ports::store::{ApplicationRepository, ChatRepository, MessageRepository, NewChat};
use crate::util::format_ms_rfc3339;
use crate::view::View;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: i64,
    pub number: i64,
    pub application_id: i64,
    pub messages_count: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatSummary {
    pub number: i64,
    pub messages_count: i64,
}

impl Chat {
    pub fn summary(&self) -> ChatSummary {
        ChatSummary {
            number: self.number,
            messages_count: self.messages_count,
        }
    }

    pub fn render(&self, view: View, messages_count: i64) -> Value {
        match view {
            View::Summary => json!({
                "number": self.number,
                "messages_count": messages_count,
            }),
            View::Full => json!({
                "id": self.id,
                "number": self.number,
                "messages_count": messages_count,
                "created_at": format_ms_rfc3339(self.created_at_ms),
                "updated_at": format_ms_rfc3339(self.updated_at_ms),
            }),
        }
    }
}

#[derive(Clone)]
pub struct ChatService {
    applications: Arc<dyn ApplicationRepository>,
    chats: Arc<dyn ChatRepository>,
    messages: Arc<dyn MessageRepository>,
    counters: Arc<dyn CounterStore>,
    cache: Arc<dyn ResponseCache>,
    search: Arc<dyn SearchIndex>,
    publisher: EventPublisher,
    ttls: CacheTtls,
}

impl ChatService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        chats: Arc<dyn ChatRepository>,
        messages: Arc<dyn MessageRepository>,
        counters: Arc<dyn CounterStore>,
        cache: Arc<dyn ResponseCache>,
        search: Arc<dyn SearchIndex>,
        publisher: EventPublisher,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            applications,
            chats,
            messages,
            counters,
            cache,
            search,
            publisher,
            ttls,
        }
    }

    /// Persists the chat with an atomically assigned number, then hands
    /// counter maintenance to the aggregation queue. `chats_count` stays
    /// stale until the aggregator commits a cycle.
    pub async fn create(&self, token: &str) -> DomainResult<ChatSummary> {
        let application = self.application_by_token(token).await?;
        let chat = self
            .chats
            .create(&NewChat {
                application_id: application.id,
            })
            .await?;

        self.publisher.publish_chat_created(&application.token).await;
        caching::counter_set(
            self.counters.as_ref(),
            &cache_keys::chat_messages_counter(chat.id),
            0,
        )
        .await;
        caching::delete_prefix(self.cache.as_ref(), &cache_keys::chats_listing_prefix(token))
            .await;

        Ok(chat.summary())
    }

    pub async fn list(&self, token: &str, params: PageParams) -> DomainResult<Value> {
        let application = self.application_by_token(token).await?;
        let key = cache_keys::chats_page_key(token, params.page, params.limit);
        if let Some(hit) = caching::get(self.cache.as_ref(), &key).await {
            return Ok(hit);
        }

        let (rows, total) = self
            .chats
            .list_by_application(application.id, params.offset(), params.limit)
            .await?;
        let data: Vec<Value> = rows
            .iter()
            .map(|chat| chat.render(View::Summary, chat.messages_count))
            .collect();
        let response = json!({
            "data": data,
            "meta": PageMeta::new(params, total),
        });
        caching::put(self.cache.as_ref(), &key, &response, self.ttls.listing).await;
        Ok(response)
    }

    pub async fn get(&self, token: &str, number: i64, view: View) -> DomainResult<Value> {
        let key = cache_keys::chat_key(token, number, view);
        if let Some(hit) = caching::get(self.cache.as_ref(), &key).await {
            return Ok(hit);
        }

        let application = self.application_by_token(token).await?;
        let chat = self
            .chats
            .find_by_number(application.id, number)
            .await?
            .ok_or(DomainError::NotFound)?;
        let messages_count = self.resolved_messages_count(&chat).await;
        let rendered = chat.render(view, messages_count);
        caching::put(self.cache.as_ref(), &key, &rendered, self.ttls.entity).await;
        Ok(rendered)
    }

    pub async fn delete(&self, token: &str, number: i64) -> DomainResult<()> {
        let application = self.application_by_token(token).await?;
        let chat = self.chats.delete_by_number(application.id, number).await?;

        let counter_key = cache_keys::application_chats_counter(&application.token);
        match self.counters.get(&counter_key).await {
            Ok(Some(_)) => {
                if let Err(err) = self.counters.decrement(&counter_key, 1).await {
                    tracing::warn!(error = %err, key = %counter_key, "counter decrement failed");
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, key = %counter_key, "counter cache read failed");
            }
        }
        caching::counter_delete(
            self.counters.as_ref(),
            &cache_keys::chat_messages_counter(chat.id),
        )
        .await;

        for view in [View::Summary, View::Full] {
            caching::delete(self.cache.as_ref(), &cache_keys::chat_key(token, number, view)).await;
            caching::delete(
                self.cache.as_ref(),
                &cache_keys::application_token_key(token, view),
            )
            .await;
        }
        caching::delete_prefix(self.cache.as_ref(), &cache_keys::chats_listing_prefix(token))
            .await;
        caching::delete_prefix(
            self.cache.as_ref(),
            &cache_keys::messages_listing_prefix(token, number),
        )
        .await;
        caching::delete_prefix(self.cache.as_ref(), cache_keys::applications_listing_prefix())
            .await;

        if let Err(err) = self.search.delete_by_chat(chat.id).await {
            tracing::warn!(error = %err, chat_id = chat.id, "search index purge failed");
        }

        Ok(())
    }

    pub(crate) async fn application_by_token(&self, token: &str) -> DomainResult<Application> {
        self.applications
            .find_by_token(token)
            .await?
            .ok_or(DomainError::NotFound)
    }

    /// Same lazy rehydration contract as the application counter: absent key
    /// means recount, heal the row, seed the cache.
    async fn resolved_messages_count(&self, chat: &Chat) -> i64 {
        let key = cache_keys::chat_messages_counter(chat.id);
        match self.counters.get(&key).await {
            Ok(Some(count)) => count,
            Ok(None) => match self.messages.count_by_chat(chat.id).await {
                Ok(count) => {
                    if count != chat.messages_count {
                        if let Err(err) = self.chats.set_messages_count(chat.id, count).await {
                            tracing::warn!(
                                error = %err,
                                chat_id = chat.id,
                                "failed to reconcile messages_count"
                            );
                        }
                    }
                    caching::counter_set(self.counters.as_ref(), &key, count).await;
                    count
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to count messages for rehydration");
                    chat.messages_count
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, key = %key, "counter cache read failed");
                chat.messages_count
            }
        }
    }
}
