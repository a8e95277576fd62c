//! Business logic, one module per domain
//!
//! Handlers stay thin: they extract and validate, then call into these
//! functions with the pool or the whole [`crate::api::AppState`] when an
//! integration (catalog, LLM, push) is involved.

pub mod ai;
pub mod analytics;
pub mod catalog;
pub mod friends;
pub mod llm;
pub mod moderation;
pub mod movie_nights;
pub mod movies;
pub mod notifications;
pub mod push;
pub mod social;
pub mod users;

#[cfg(test)]
pub(crate) mod test_support;
