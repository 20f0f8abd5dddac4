use std::time::Duration;

use crate::message::MessageSort;
use crate::view::View;

/// TTL policy for the response cache. Freshly created entities are seeded for
/// longer than read-through entries because they cannot be stale yet.
#[derive(Clone, Copy, Debug)]
pub struct CacheTtls {
    pub seed: Duration,
    pub entity: Duration,
    pub listing: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            seed: Duration::from_secs(5 * 60),
            entity: Duration::from_secs(2 * 60),
            listing: Duration::from_secs(2 * 60),
        }
    }
}

/// Keys prefixed with `ref:` hold the name of the canonical key instead of a
/// value; `ResponseCache::get` follows one level of that indirection.
pub const REF_PREFIX: &str = "ref:";

pub fn application_token_key(token: &str, view: View) -> String {
    format!("application:token:{token}:{}", view.as_str())
}

pub fn application_ref_key(id: i64, view: View) -> String {
    format!("{REF_PREFIX}application:id:{id}:{}", view.as_str())
}

pub fn applications_listing_prefix() -> &'static str {
    "applications:page:"
}

pub fn applications_page_key(page: u64, limit: u64) -> String {
    format!("applications:page:{page}:limit:{limit}")
}

pub fn chat_key(token: &str, number: i64, view: View) -> String {
    format!("chat:{token}:{number}:{}", view.as_str())
}

pub fn chats_listing_prefix(token: &str) -> String {
    format!("chats:{token}:page:")
}

pub fn chats_page_key(token: &str, page: u64, limit: u64) -> String {
    format!("chats:{token}:page:{page}:limit:{limit}")
}

pub fn messages_listing_prefix(token: &str, chat_number: i64) -> String {
    format!("messages:{token}:{chat_number}:page:")
}

pub fn messages_page_key(
    token: &str,
    chat_number: i64,
    page: u64,
    limit: u64,
    sort: MessageSort,
) -> String {
    format!("messages:{token}:{chat_number}:page:{page}:limit:{limit}:sort:{}", sort.as_str())
}

pub fn application_chats_counter(token: &str) -> String {
    format!("counters:application:{token}:chats")
}

pub fn chat_messages_counter(chat_id: i64) -> String {
    format!("counters:chat:{chat_id}:messages")
}
