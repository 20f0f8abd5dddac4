use crate::DomainResult;
use crate::application::Application;
use crate::chat::Chat;
use crate::message::{Message, MessageSort};

use super::BoxFuture;

#[derive(Clone, Debug)]
pub struct NewApplication {
    pub name: String,
    pub token: String,
}

#[derive(Clone, Copy, Debug)]
pub struct NewChat {
    pub application_id: i64,
}

#[derive(Clone, Debug)]
pub struct NewMessage {
    pub chat_id: i64,
    pub application_id: i64,
    pub body: String,
}

/// Result of a cascading application delete; callers need the removed chats
/// to invalidate the subtree's caches and counters.
#[derive(Clone, Debug)]
pub struct DeletedApplication {
    pub application: Application,
    pub chats: Vec<Chat>,
}

pub trait ApplicationRepository: Send + Sync {
    fn create(&self, input: &NewApplication) -> BoxFuture<'_, DomainResult<Application>>;
    fn find_by_token(&self, token: &str) -> BoxFuture<'_, DomainResult<Option<Application>>>;
    /// Returns one page of rows plus the total row count.
    fn list(&self, offset: u64, limit: u64)
    -> BoxFuture<'_, DomainResult<(Vec<Application>, u64)>>;
    fn update_name(&self, token: &str, name: &str) -> BoxFuture<'_, DomainResult<Application>>;
    /// Cascades to chats and messages inside the same transaction.
    fn delete_by_token(&self, token: &str) -> BoxFuture<'_, DomainResult<DeletedApplication>>;
    /// Transactional `chats_count += delta`; returns the new value.
    fn adjust_chats_count(&self, token: &str, delta: i64) -> BoxFuture<'_, DomainResult<i64>>;
    fn set_chats_count(&self, token: &str, value: i64) -> BoxFuture<'_, DomainResult<()>>;
}

pub trait ChatRepository: Send + Sync {
    /// Assigns the next per-application chat number inside the transaction.
    fn create(&self, input: &NewChat) -> BoxFuture<'_, DomainResult<Chat>>;
    fn find_by_number(
        &self,
        application_id: i64,
        number: i64,
    ) -> BoxFuture<'_, DomainResult<Option<Chat>>>;
    fn list_by_application(
        &self,
        application_id: i64,
        offset: u64,
        limit: u64,
    ) -> BoxFuture<'_, DomainResult<(Vec<Chat>, u64)>>;
    /// Cascades to messages and decrements the parent's `chats_count` inside
    /// the same transaction.
    fn delete_by_number(
        &self,
        application_id: i64,
        number: i64,
    ) -> BoxFuture<'_, DomainResult<Chat>>;
    fn count_by_application(&self, application_id: i64) -> BoxFuture<'_, DomainResult<i64>>;
    /// Transactional `messages_count += delta`; returns the new value.
    fn adjust_messages_count(&self, chat_id: i64, delta: i64) -> BoxFuture<'_, DomainResult<i64>>;
    fn set_messages_count(&self, chat_id: i64, value: i64) -> BoxFuture<'_, DomainResult<()>>;
}

pub trait MessageRepository: Send + Sync {
    /// Assigns the next per-chat message number inside the transaction.
    fn create(&self, input: &NewMessage) -> BoxFuture<'_, DomainResult<Message>>;
    fn list_by_chat(
        &self,
        chat_id: i64,
        sort: MessageSort,
        offset: u64,
        limit: u64,
    ) -> BoxFuture<'_, DomainResult<(Vec<Message>, u64)>>;
    fn count_by_chat(&self, chat_id: i64) -> BoxFuture<'_, DomainResult<i64>>;
}
