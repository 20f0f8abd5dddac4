pub mod aggregation;
pub mod application;
pub mod cache_keys;
pub(crate) mod caching;
pub mod chat;
pub mod error;
pub mod events;
pub mod indexing;
pub mod message;
pub mod pagination;
pub mod ports;
pub mod util;
pub mod view;

pub type DomainResult<T> = Result<T, error::DomainError>;
