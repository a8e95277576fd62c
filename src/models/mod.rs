use serde::{Deserialize, Deserializer, Serialize};

pub mod analytics;
pub mod friend;
pub mod moderation;
pub mod movie;
pub mod movie_night;
pub mod notification;
pub mod social;
pub mod user;

pub use movie::{split_genres, Movie, MovieBrief, NewMovie};
pub use user::{AuthUser, UserProfile};

// ============================================================================
// Pagination
// ============================================================================

/// `?page=` query parameter shared by every list endpoint (1-based)
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub page: Option<u32>,
}

impl PageParams {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// SQL `(LIMIT, OFFSET)` for the given page size
    pub fn limit_offset(&self, page_size: i64) -> (i64, i64) {
        let page_size = page_size.max(1);
        (page_size, (self.page() as i64 - 1) * page_size)
    }
}

/// One page of a list endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub count: i64,
    pub page: u32,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(count: i64, params: PageParams, results: Vec<T>) -> Self {
        Self {
            count,
            page: params.page(),
            results,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            count: self.count,
            page: self.page,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

/// Distinguishes an absent field from an explicit `null` in PATCH bodies
pub fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}
