//! Movie metadata catalog
//!
//! The service talks to OMDb through the [`MovieCatalog`] trait so handlers
//! and tests never depend on the concrete HTTP client.

use serde_json::Value;

use crate::error::AppResult;

pub mod omdb;

pub use omdb::OmdbCatalog;

/// External source of movie metadata
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MovieCatalog: Send + Sync {
    /// Raw search results for a title query
    ///
    /// The payload is passed through to clients unchanged, including the
    /// catalog's own `"Response": "False"` error objects.
    async fn search(&self, query: &str, page: u32) -> AppResult<Value>;

    /// Full details for one IMDb id, or `None` when the catalog does not know it
    async fn details(&self, imdb_id: &str) -> AppResult<Option<Value>>;

    /// Catalog name for logging
    fn name(&self) -> &'static str;
}

/// True when an OMDb payload reports a lookup failure
pub fn is_not_found(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Object(map) => {
            map.is_empty() || map.get("Response").and_then(Value::as_str) == Some("False")
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_not_found() {
        assert!(is_not_found(&json!({ "Response": "False", "Error": "Incorrect IMDb ID." })));
        assert!(is_not_found(&json!({})));
        assert!(is_not_found(&Value::Null));
        assert!(!is_not_found(&json!({ "Response": "True", "imdbID": "tt0133093" })));
        assert!(!is_not_found(&json!({ "imdbID": "tt0133093" })));
    }
}
