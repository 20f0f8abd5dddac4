use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::DomainResult;
use crate::cache_keys::{self, CacheTtls};
use crate::caching;
use crate::error::DomainError;
use crate::pagination::{PageMeta, PageParams};
use crate::ports::cache::{CounterStore, ResponseCache};
use crate::ports::search::SearchIndex;
use crate::ports::store::{
    ApplicationRepository, ChatRepository, DeletedApplication, NewApplication,
};
use crate::util::{format_ms_rfc3339, new_token};
use crate::view::View;

const MIN_NAME_CHARS: usize = 3;
const MAX_NAME_CHARS: usize = 50;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Application {
    pub id: i64,
    pub name: String,
    pub token: String,
    pub chats_count: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationSummary {
    pub name: String,
    pub token: String,
    pub chats_count: i64,
}

impl Application {
    pub fn summary(&self) -> ApplicationSummary {
        ApplicationSummary {
            name: self.name.clone(),
            token: self.token.clone(),
            chats_count: self.chats_count,
        }
    }

    /// Renders the externally visible shape. `chats_count` is passed in so
    /// callers can substitute the counter-cache value for the row value.
    pub fn render(&self, view: View, chats_count: i64) -> Value {
        match view {
            View::Summary => json!({
                "name": self.name,
                "token": self.token,
                "chats_count": chats_count,
            }),
            View::Full => json!({
                "id": self.id,
                "name": self.name,
                "token": self.token,
                "chats_count": chats_count,
                "created_at": format_ms_rfc3339(self.created_at_ms),
                "updated_at": format_ms_rfc3339(self.updated_at_ms),
            }),
        }
    }
}

#[derive(Clone)]
pub struct ApplicationService {
    applications: Arc<dyn ApplicationRepository>,
    chats: Arc<dyn ChatRepository>,
    counters: Arc<dyn CounterStore>,
    cache: Arc<dyn ResponseCache>,
    search: Arc<dyn SearchIndex>,
    ttls: CacheTtls,
}

impl ApplicationService {
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        chats: Arc<dyn ChatRepository>,
        counters: Arc<dyn CounterStore>,
        cache: Arc<dyn ResponseCache>,
        search: Arc<dyn SearchIndex>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            applications,
            chats,
            counters,
            cache,
            search,
            ttls,
        }
    }

    pub async fn create(&self, name: &str) -> DomainResult<ApplicationSummary> {
        let name = validate_name(name)?;
        let application = self
            .applications
            .create(&NewApplication {
                name,
                token: new_token(),
            })
            .await?;

        let rendered = application.render(View::Summary, application.chats_count);
        self.cache_entity(&application, View::Summary, &rendered, self.ttls.seed)
            .await;
        caching::counter_set(
            self.counters.as_ref(),
            &cache_keys::application_chats_counter(&application.token),
            0,
        )
        .await;
        caching::delete_prefix(self.cache.as_ref(), cache_keys::applications_listing_prefix())
            .await;

        Ok(application.summary())
    }

    pub async fn get_by_token(&self, token: &str, view: View) -> DomainResult<Value> {
        let key = cache_keys::application_token_key(token, view);
        if let Some(hit) = caching::get(self.cache.as_ref(), &key).await {
            return Ok(hit);
        }

        let application = self
            .applications
            .find_by_token(token)
            .await?
            .ok_or(DomainError::NotFound)?;
        let chats_count = self.resolved_chats_count(&application).await;
        let rendered = application.render(view, chats_count);
        self.cache_entity(&application, view, &rendered, self.ttls.entity)
            .await;
        Ok(rendered)
    }

    pub async fn list(&self, params: PageParams) -> DomainResult<Value> {
        let key = cache_keys::applications_page_key(params.page, params.limit);
        if let Some(hit) = caching::get(self.cache.as_ref(), &key).await {
            return Ok(hit);
        }

        let (rows, total) = self.applications.list(params.offset(), params.limit).await?;
        let data: Vec<Value> = rows
            .iter()
            .map(|application| application.render(View::Summary, application.chats_count))
            .collect();
        let response = json!({
            "data": data,
            "meta": PageMeta::new(params, total),
        });
        caching::put(self.cache.as_ref(), &key, &response, self.ttls.listing).await;
        Ok(response)
    }

    pub async fn update_by_token(&self, token: &str, name: &str) -> DomainResult<ApplicationSummary> {
        let name = validate_name(name)?;
        let application = self.applications.update_name(token, &name).await?;

        let rendered = application.render(View::Summary, application.chats_count);
        self.cache_entity(&application, View::Summary, &rendered, self.ttls.entity)
            .await;
        caching::delete(
            self.cache.as_ref(),
            &cache_keys::application_token_key(token, View::Full),
        )
        .await;
        caching::delete_prefix(self.cache.as_ref(), cache_keys::applications_listing_prefix())
            .await;

        Ok(application.summary())
    }

    pub async fn delete_by_token(&self, token: &str) -> DomainResult<()> {
        let deleted = self.applications.delete_by_token(token).await?;
        self.purge_subtree(&deleted).await;
        Ok(())
    }

    /// Drops every cache entry and counter derived from the deleted
    /// application, its chats, and their messages.
    async fn purge_subtree(&self, deleted: &DeletedApplication) {
        let application = &deleted.application;
        for view in [View::Summary, View::Full] {
            caching::delete(
                self.cache.as_ref(),
                &cache_keys::application_token_key(&application.token, view),
            )
            .await;
            caching::delete(
                self.cache.as_ref(),
                &cache_keys::application_ref_key(application.id, view),
            )
            .await;
        }
        caching::delete_prefix(self.cache.as_ref(), cache_keys::applications_listing_prefix())
            .await;
        caching::delete_prefix(
            self.cache.as_ref(),
            &cache_keys::chats_listing_prefix(&application.token),
        )
        .await;
        caching::counter_delete(
            self.counters.as_ref(),
            &cache_keys::application_chats_counter(&application.token),
        )
        .await;

        for chat in &deleted.chats {
            for view in [View::Summary, View::Full] {
                caching::delete(
                    self.cache.as_ref(),
                    &cache_keys::chat_key(&application.token, chat.number, view),
                )
                .await;
            }
            caching::delete_prefix(
                self.cache.as_ref(),
                &cache_keys::messages_listing_prefix(&application.token, chat.number),
            )
            .await;
            caching::counter_delete(
                self.counters.as_ref(),
                &cache_keys::chat_messages_counter(chat.id),
            )
            .await;
            if let Err(err) = self.search.delete_by_chat(chat.id).await {
                tracing::warn!(error = %err, chat_id = chat.id, "search index purge failed");
            }
        }
    }

    async fn cache_entity(
        &self,
        application: &Application,
        view: View,
        rendered: &Value,
        ttl: std::time::Duration,
    ) {
        let token_key = cache_keys::application_token_key(&application.token, view);
        caching::put(self.cache.as_ref(), &token_key, rendered, ttl).await;
        caching::put_ref(
            self.cache.as_ref(),
            &cache_keys::application_ref_key(application.id, view),
            &token_key,
            ttl,
        )
        .await;
    }

    /// Counter-cache read with lazy rehydration: an absent key is recomputed
    /// from the child rows, written back onto the application row (healing
    /// accumulated drift), and seeded into the cache. A cache outage degrades
    /// to the row value.
    async fn resolved_chats_count(&self, application: &Application) -> i64 {
        let key = cache_keys::application_chats_counter(&application.token);
        match self.counters.get(&key).await {
            Ok(Some(count)) => count,
            Ok(None) => match self.chats.count_by_application(application.id).await {
                Ok(count) => {
                    if count != application.chats_count {
                        if let Err(err) =
                            self.applications.set_chats_count(&application.token, count).await
                        {
                            tracing::warn!(
                                error = %err,
                                token = %application.token,
                                "failed to reconcile chats_count"
                            );
                        }
                    }
                    caching::counter_set(self.counters.as_ref(), &key, count).await;
                    count
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to count chats for rehydration");
                    application.chats_count
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, key = %key, "counter cache read failed");
                application.chats_count
            }
        }
    }
}

pub fn validate_name(name: &str) -> DomainResult<String> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(DomainError::Validation("name is required".into()));
    }
    let chars = name.chars().count();
    if !(MIN_NAME_CHARS..=MAX_NAME_CHARS).contains(&chars) {
        return Err(DomainError::Validation(format!(
            "name must be between {MIN_NAME_CHARS} and {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation_trims_and_bounds() {
        assert_eq!(validate_name("  Bot  ").expect("valid"), "Bot");
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name("ab").is_err());
        assert!(validate_name(&"x".repeat(51)).is_err());
        assert!(validate_name(&"x".repeat(50)).is_ok());
    }

    #[test]
    fn summary_render_hides_internal_fields() {
        let application = Application {
            id: 7,
            name: "Bot".to_string(),
            token: "tok".to_string(),
            chats_count: 2,
            created_at_ms: 0,
            updated_at_ms: 0,
        };

        let summary = application.render(View::Summary, 3);
        assert_eq!(summary["chats_count"], 3);
        assert!(summary.get("id").is_none());

        let full = application.render(View::Full, 3);
        assert_eq!(full["id"], 7);
        assert_eq!(full["created_at"], "1970-01-01T00:00:00Z");
    }
}
