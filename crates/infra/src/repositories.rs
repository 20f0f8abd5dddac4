use std::collections::HashMap;
use std::sync::Arc;

use relay_domain::DomainResult;
use relay_domain::application::Application;
use relay_domain::chat::Chat;
use relay_domain::error::DomainError;
use relay_domain::message::{Message, MessageSort};
use relay_domain::ports::BoxFuture;
use relay_domain::ports::store::{
    ApplicationRepository, ChatRepository, DeletedApplication, MessageRepository, NewApplication,
    NewChat, NewMessage,
};
use relay_domain::util::now_ms;
use tokio::sync::RwLock;

/// System of record for all three entities. The whole state sits behind one
/// `RwLock`: a held write guard is the transaction boundary, so multi-step
/// mutations (cascade deletes, sequence issuance, counter adjustments)
/// commit atomically or not at all.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    next_application_id: i64,
    next_chat_id: i64,
    next_message_id: i64,
    applications: HashMap<i64, Application>,
    tokens: HashMap<String, i64>,
    chats: HashMap<i64, Chat>,
    chat_numbers: HashMap<(i64, i64), i64>,
    // per-application high-water marks; they never move backwards, so chat
    // numbers are not reused after deletions
    chat_sequences: HashMap<i64, i64>,
    messages: HashMap<i64, Message>,
    message_numbers: HashMap<(i64, i64), i64>,
    message_sequences: HashMap<i64, i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreState {
    fn application_id(&self, token: &str) -> Option<i64> {
        self.tokens.get(token).copied()
    }

    fn application_by_token(&mut self, token: &str) -> DomainResult<&mut Application> {
        let id = self.application_id(token).ok_or(DomainError::NotFound)?;
        self.applications.get_mut(&id).ok_or(DomainError::NotFound)
    }

    fn remove_chat_row(&mut self, chat_id: i64) -> Option<Chat> {
        let chat = self.chats.remove(&chat_id)?;
        self.chat_numbers.remove(&(chat.application_id, chat.number));
        self.message_sequences.remove(&chat_id);
        let message_ids: Vec<i64> = self
            .messages
            .values()
            .filter(|message| message.chat_id == chat_id)
            .map(|message| message.id)
            .collect();
        for message_id in message_ids {
            if let Some(message) = self.messages.remove(&message_id) {
                self.message_numbers.remove(&(chat_id, message.number));
            }
        }
        Some(chat)
    }
}

impl ApplicationRepository for MemoryStore {
    fn create(&self, input: &NewApplication) -> BoxFuture<'_, DomainResult<Application>> {
        let input = input.clone();
        let state = self.state.clone();
        Box::pin(async move {
            if input.name.trim().is_empty() {
                return Err(DomainError::Validation("name is required".into()));
            }
            let mut state = state.write().await;
            if state.tokens.contains_key(&input.token) {
                return Err(DomainError::Conflict);
            }
            state.next_application_id += 1;
            let now = now_ms();
            let application = Application {
                id: state.next_application_id,
                name: input.name,
                token: input.token,
                chats_count: 0,
                created_at_ms: now,
                updated_at_ms: now,
            };
            state
                .tokens
                .insert(application.token.clone(), application.id);
            state.applications.insert(application.id, application.clone());
            Ok(application)
        })
    }

    fn find_by_token(&self, token: &str) -> BoxFuture<'_, DomainResult<Option<Application>>> {
        let token = token.to_string();
        let state = self.state.clone();
        Box::pin(async move {
            let state = state.read().await;
            Ok(state
                .application_id(&token)
                .and_then(|id| state.applications.get(&id).cloned()))
        })
    }

    fn list(
        &self,
        offset: u64,
        limit: u64,
    ) -> BoxFuture<'_, DomainResult<(Vec<Application>, u64)>> {
        let state = self.state.clone();
        Box::pin(async move {
            let state = state.read().await;
            let mut rows: Vec<Application> = state.applications.values().cloned().collect();
            rows.sort_by_key(|application| application.id);
            let total = rows.len() as u64;
            let rows = rows
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
            Ok((rows, total))
        })
    }

    fn update_name(&self, token: &str, name: &str) -> BoxFuture<'_, DomainResult<Application>> {
        let token = token.to_string();
        let name = name.to_string();
        let state = self.state.clone();
        Box::pin(async move {
            if name.trim().is_empty() {
                return Err(DomainError::Validation("name is required".into()));
            }
            let mut state = state.write().await;
            let application = state.application_by_token(&token)?;
            application.name = name;
            application.updated_at_ms = now_ms();
            Ok(application.clone())
        })
    }

    fn delete_by_token(&self, token: &str) -> BoxFuture<'_, DomainResult<DeletedApplication>> {
        let token = token.to_string();
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let id = state.tokens.remove(&token).ok_or(DomainError::NotFound)?;
            let application = state
                .applications
                .remove(&id)
                .ok_or(DomainError::NotFound)?;
            let chat_ids: Vec<i64> = state
                .chats
                .values()
                .filter(|chat| chat.application_id == id)
                .map(|chat| chat.id)
                .collect();
            let mut chats = Vec::with_capacity(chat_ids.len());
            for chat_id in chat_ids {
                if let Some(chat) = state.remove_chat_row(chat_id) {
                    chats.push(chat);
                }
            }
            chats.sort_by_key(|chat| chat.number);
            state.chat_sequences.remove(&id);
            Ok(DeletedApplication { application, chats })
        })
    }

    fn adjust_chats_count(&self, token: &str, delta: i64) -> BoxFuture<'_, DomainResult<i64>> {
        let token = token.to_string();
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let application = state.application_by_token(&token)?;
            // floored at zero; lazy rehydration heals any residual drift
            application.chats_count = (application.chats_count + delta).max(0);
            application.updated_at_ms = now_ms();
            Ok(application.chats_count)
        })
    }

    fn set_chats_count(&self, token: &str, value: i64) -> BoxFuture<'_, DomainResult<()>> {
        let token = token.to_string();
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let application = state.application_by_token(&token)?;
            application.chats_count = value.max(0);
            application.updated_at_ms = now_ms();
            Ok(())
        })
    }
}

impl ChatRepository for MemoryStore {
    fn create(&self, input: &NewChat) -> BoxFuture<'_, DomainResult<Chat>> {
        let input = *input;
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            if !state.applications.contains_key(&input.application_id) {
                return Err(DomainError::NotFound);
            }
            let sequence = state
                .chat_sequences
                .entry(input.application_id)
                .or_insert(0);
            *sequence += 1;
            let number = *sequence;
            if state
                .chat_numbers
                .contains_key(&(input.application_id, number))
            {
                return Err(DomainError::Conflict);
            }
            state.next_chat_id += 1;
            let now = now_ms();
            let chat = Chat {
                id: state.next_chat_id,
                number,
                application_id: input.application_id,
                messages_count: 0,
                created_at_ms: now,
                updated_at_ms: now,
            };
            state
                .chat_numbers
                .insert((input.application_id, number), chat.id);
            state.chats.insert(chat.id, chat.clone());
            Ok(chat)
        })
    }

    fn find_by_number(
        &self,
        application_id: i64,
        number: i64,
    ) -> BoxFuture<'_, DomainResult<Option<Chat>>> {
        let state = self.state.clone();
        Box::pin(async move {
            let state = state.read().await;
            Ok(state
                .chat_numbers
                .get(&(application_id, number))
                .and_then(|id| state.chats.get(id).cloned()))
        })
    }

    fn list_by_application(
        &self,
        application_id: i64,
        offset: u64,
        limit: u64,
    ) -> BoxFuture<'_, DomainResult<(Vec<Chat>, u64)>> {
        let state = self.state.clone();
        Box::pin(async move {
            let state = state.read().await;
            let mut rows: Vec<Chat> = state
                .chats
                .values()
                .filter(|chat| chat.application_id == application_id)
                .cloned()
                .collect();
            rows.sort_by_key(|chat| chat.number);
            let total = rows.len() as u64;
            let rows = rows
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
            Ok((rows, total))
        })
    }

    fn delete_by_number(
        &self,
        application_id: i64,
        number: i64,
    ) -> BoxFuture<'_, DomainResult<Chat>> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let chat_id = state
                .chat_numbers
                .get(&(application_id, number))
                .copied()
                .ok_or(DomainError::NotFound)?;
            let chat = state.remove_chat_row(chat_id).ok_or(DomainError::NotFound)?;
            if let Some(application) = state.applications.get_mut(&application_id) {
                application.chats_count = (application.chats_count - 1).max(0);
                application.updated_at_ms = now_ms();
            }
            Ok(chat)
        })
    }

    fn count_by_application(&self, application_id: i64) -> BoxFuture<'_, DomainResult<i64>> {
        let state = self.state.clone();
        Box::pin(async move {
            let state = state.read().await;
            Ok(state
                .chats
                .values()
                .filter(|chat| chat.application_id == application_id)
                .count() as i64)
        })
    }

    fn adjust_messages_count(&self, chat_id: i64, delta: i64) -> BoxFuture<'_, DomainResult<i64>> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let chat = state.chats.get_mut(&chat_id).ok_or(DomainError::NotFound)?;
            chat.messages_count = (chat.messages_count + delta).max(0);
            chat.updated_at_ms = now_ms();
            Ok(chat.messages_count)
        })
    }

    fn set_messages_count(&self, chat_id: i64, value: i64) -> BoxFuture<'_, DomainResult<()>> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let chat = state.chats.get_mut(&chat_id).ok_or(DomainError::NotFound)?;
            chat.messages_count = value.max(0);
            chat.updated_at_ms = now_ms();
            Ok(())
        })
    }
}

impl MessageRepository for MemoryStore {
    fn create(&self, input: &NewMessage) -> BoxFuture<'_, DomainResult<Message>> {
        let input = input.clone();
        let state = self.state.clone();
        Box::pin(async move {
            if input.body.trim().is_empty() {
                return Err(DomainError::Validation("body is required".into()));
            }
            let mut state = state.write().await;
            if !state.chats.contains_key(&input.chat_id) {
                return Err(DomainError::NotFound);
            }
            let sequence = state.message_sequences.entry(input.chat_id).or_insert(0);
            *sequence += 1;
            let number = *sequence;
            if state.message_numbers.contains_key(&(input.chat_id, number)) {
                return Err(DomainError::Conflict);
            }
            state.next_message_id += 1;
            let now = now_ms();
            let message = Message {
                id: state.next_message_id,
                number,
                body: input.body,
                chat_id: input.chat_id,
                application_id: input.application_id,
                created_at_ms: now,
                updated_at_ms: now,
            };
            state
                .message_numbers
                .insert((input.chat_id, number), message.id);
            state.messages.insert(message.id, message.clone());
            Ok(message)
        })
    }

    fn list_by_chat(
        &self,
        chat_id: i64,
        sort: MessageSort,
        offset: u64,
        limit: u64,
    ) -> BoxFuture<'_, DomainResult<(Vec<Message>, u64)>> {
        let state = self.state.clone();
        Box::pin(async move {
            let state = state.read().await;
            let mut rows: Vec<Message> = state
                .messages
                .values()
                .filter(|message| message.chat_id == chat_id)
                .cloned()
                .collect();
            match sort {
                MessageSort::Number => rows.sort_by_key(|message| message.number),
                MessageSort::CreatedAt => {
                    rows.sort_by_key(|message| (message.created_at_ms, message.number));
                }
            }
            let total = rows.len() as u64;
            let rows = rows
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
            Ok((rows, total))
        })
    }

    fn count_by_chat(&self, chat_id: i64) -> BoxFuture<'_, DomainResult<i64>> {
        let state = self.state.clone();
        Box::pin(async move {
            let state = state.read().await;
            Ok(state
                .messages
                .values()
                .filter(|message| message.chat_id == chat_id)
                .count() as i64)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use relay_domain::util::new_token;

    async fn seed_application(store: &MemoryStore, name: &str) -> Application {
        ApplicationRepository::create(
            store,
            &NewApplication {
                name: name.to_string(),
                token: new_token(),
            },
        )
        .await
        .expect("application")
    }

    #[tokio::test]
    async fn application_round_trip_and_listing() {
        let store = MemoryStore::new();
        let first = seed_application(&store, "Bot One").await;
        let second = seed_application(&store, "Bot Two").await;
        assert_ne!(first.token, second.token);

        let found = store
            .find_by_token(&first.token)
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(found.name, "Bot One");
        assert_eq!(found.chats_count, 0);

        let (rows, total) = ApplicationRepository::list(&store, 0, 1).await.expect("page");
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, first.id);

        let updated = store
            .update_name(&second.token, "Renamed")
            .await
            .expect("update");
        assert_eq!(updated.name, "Renamed");

        let missing = store.find_by_token("absent").await.expect("lookup");
        assert!(missing.is_none());
        assert!(matches!(
            store.update_name("absent", "x").await.unwrap_err(),
            DomainError::NotFound
        ));
    }

    #[tokio::test]
    async fn concurrent_chat_creation_yields_gapless_numbers() {
        let store = MemoryStore::new();
        let application = seed_application(&store, "Racy").await;

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            let application_id = application.id;
            handles.push(tokio::spawn(async move {
                ChatRepository::create(&store, &NewChat { application_id })
                    .await
                    .expect("chat")
                    .number
            }));
        }

        let mut numbers = HashSet::new();
        for handle in handles {
            assert!(numbers.insert(handle.await.expect("join")));
        }
        let expected: HashSet<i64> = (1..=32).collect();
        assert_eq!(numbers, expected);
    }

    #[tokio::test]
    async fn chat_numbers_are_never_reused_after_delete() {
        let store = MemoryStore::new();
        let application = seed_application(&store, "Seq").await;

        for _ in 0..3 {
            ChatRepository::create(&store, &NewChat { application_id: application.id })
                .await
                .expect("chat");
        }
        store
            .delete_by_number(application.id, 3)
            .await
            .expect("delete");

        let next = ChatRepository::create(&store, &NewChat { application_id: application.id })
            .await
            .expect("chat");
        assert_eq!(next.number, 4);
    }

    #[tokio::test]
    async fn chat_delete_cascades_and_decrements_parent() {
        let store = MemoryStore::new();
        let application = seed_application(&store, "Cascade").await;
        let chat = ChatRepository::create(&store, &NewChat { application_id: application.id })
            .await
            .expect("chat");
        store
            .adjust_chats_count(&application.token, 1)
            .await
            .expect("count");
        MessageRepository::create(
            &store,
            &NewMessage {
                chat_id: chat.id,
                application_id: application.id,
                body: "hi".to_string(),
            },
        )
        .await
        .expect("message");

        store
            .delete_by_number(application.id, chat.number)
            .await
            .expect("delete");

        assert_eq!(store.count_by_chat(chat.id).await.expect("count"), 0);
        let row = store
            .find_by_token(&application.token)
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(row.chats_count, 0);
        assert!(matches!(
            store.delete_by_number(application.id, chat.number).await,
            Err(DomainError::NotFound)
        ));
    }

    #[tokio::test]
    async fn application_delete_returns_subtree() {
        let store = MemoryStore::new();
        let application = seed_application(&store, "Tree").await;
        for _ in 0..2 {
            let chat = ChatRepository::create(&store, &NewChat { application_id: application.id })
                .await
                .expect("chat");
            MessageRepository::create(
                &store,
                &NewMessage {
                    chat_id: chat.id,
                    application_id: application.id,
                    body: "hello".to_string(),
                },
            )
            .await
            .expect("message");
        }

        let deleted = store
            .delete_by_token(&application.token)
            .await
            .expect("delete");
        assert_eq!(deleted.application.id, application.id);
        assert_eq!(deleted.chats.len(), 2);
        assert_eq!(deleted.chats[0].number, 1);

        assert!(
            store
                .find_by_token(&application.token)
                .await
                .expect("lookup")
                .is_none()
        );
        for chat in &deleted.chats {
            assert_eq!(store.count_by_chat(chat.id).await.expect("count"), 0);
        }
    }

    #[tokio::test]
    async fn message_numbers_are_scoped_per_chat() {
        let store = MemoryStore::new();
        let application = seed_application(&store, "Scoped").await;
        let first = ChatRepository::create(&store, &NewChat { application_id: application.id })
            .await
            .expect("chat");
        let second = ChatRepository::create(&store, &NewChat { application_id: application.id })
            .await
            .expect("chat");

        for chat in [&first, &second] {
            for body in ["a", "b"] {
                MessageRepository::create(
                    &store,
                    &NewMessage {
                        chat_id: chat.id,
                        application_id: application.id,
                        body: body.to_string(),
                    },
                )
                .await
                .expect("message");
            }
        }

        let (rows, total) = store
            .list_by_chat(second.id, MessageSort::Number, 0, 10)
            .await
            .expect("page");
        assert_eq!(total, 2);
        assert_eq!(
            rows.iter().map(|message| message.number).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn count_adjustments_floor_at_zero() {
        let store = MemoryStore::new();
        let application = seed_application(&store, "Floor").await;
        let value = store
            .adjust_chats_count(&application.token, -5)
            .await
            .expect("adjust");
        assert_eq!(value, 0);
        let value = store
            .adjust_chats_count(&application.token, 3)
            .await
            .expect("adjust");
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn blank_fields_are_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(
            ApplicationRepository::create(
                &store,
                &NewApplication {
                    name: "   ".to_string(),
                    token: new_token(),
                },
            )
            .await,
            Err(DomainError::Validation(_))
        ));

        let application = seed_application(&store, "Valid").await;
        let chat = ChatRepository::create(&store, &NewChat { application_id: application.id })
            .await
            .expect("chat");
        assert!(matches!(
            MessageRepository::create(
                &store,
                &NewMessage {
                    chat_id: chat.id,
                    application_id: application.id,
                    body: " ".to_string(),
                },
            )
            .await,
            Err(DomainError::Validation(_))
        ));
    }
}
