use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// A movie cached locally from the external catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Movie {
    pub id: i64,
    pub imdb_id: String,
    pub title: String,
    pub year: String,
    pub poster: String,
    pub plot: String,
    /// Comma-separated genre list as reported by the catalog
    pub genre: String,
    /// Raw catalog payload
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a movie fetched from the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct NewMovie {
    pub imdb_id: String,
    pub title: String,
    pub year: String,
    pub poster: String,
    pub plot: String,
    pub genre: String,
    pub data: Value,
}

impl NewMovie {
    /// Maps an OMDb detail payload onto movie columns
    pub fn from_catalog(payload: &Value) -> Self {
        let field = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            imdb_id: field("imdbID"),
            title: field("Title"),
            year: field("Year"),
            poster: field("Poster"),
            plot: field("Plot"),
            genre: field("Genre"),
            data: payload.clone(),
        }
    }
}

/// Compact movie description handed to LLM prompts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieBrief {
    pub imdb_id: String,
    pub title: String,
    pub genres: Vec<String>,
    pub year: String,
    pub plot: String,
}

impl From<&Movie> for MovieBrief {
    fn from(movie: &Movie) -> Self {
        Self {
            imdb_id: movie.imdb_id.clone(),
            title: movie.title.clone(),
            genres: split_genres(&movie.genre),
            year: movie.year.clone(),
            plot: movie.plot.clone(),
        }
    }
}

/// Splits a catalog genre string ("Action, Drama") into trimmed names
pub fn split_genres(genre: &str) -> Vec<String> {
    genre
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct MovieSearchQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
}

/// Review-summary output produced by the LLM
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewSummary {
    #[serde(default)]
    pub summary: String,
    #[serde(default = "neutral")]
    pub overall_sentiment: String,
    #[serde(default)]
    pub key_themes: Vec<String>,
}

fn neutral() -> String {
    "neutral".to_string()
}

impl Default for ReviewSummary {
    fn default() -> Self {
        Self {
            summary: String::new(),
            overall_sentiment: neutral(),
            key_themes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_genres() {
        assert_eq!(
            split_genres(" Action, Sci-Fi ,,Drama"),
            vec!["Action", "Sci-Fi", "Drama"]
        );
        assert!(split_genres("").is_empty());
    }

    #[test]
    fn test_new_movie_from_catalog_payload() {
        let payload = json!({
            "Title": "Inception",
            "Year": "2010",
            "Genre": "Action, Adventure, Sci-Fi",
            "Plot": "A thief who steals corporate secrets...",
            "Poster": "https://example.com/p.jpg",
            "imdbID": "tt1375666",
            "Response": "True"
        });

        let movie = NewMovie::from_catalog(&payload);
        assert_eq!(movie.imdb_id, "tt1375666");
        assert_eq!(movie.title, "Inception");
        assert_eq!(movie.year, "2010");
        assert_eq!(movie.genre, "Action, Adventure, Sci-Fi");
        assert_eq!(movie.data, payload);
    }

    #[test]
    fn test_new_movie_missing_fields_are_blank() {
        let movie = NewMovie::from_catalog(&json!({ "imdbID": "tt0000001" }));
        assert_eq!(movie.imdb_id, "tt0000001");
        assert_eq!(movie.title, "");
        assert_eq!(movie.poster, "");
    }

    #[test]
    fn test_review_summary_defaults_fill_missing_keys() {
        let summary: ReviewSummary = serde_json::from_value(json!({ "summary": "Loved it" })).unwrap();
        assert_eq!(summary.summary, "Loved it");
        assert_eq!(summary.overall_sentiment, "neutral");
        assert!(summary.key_themes.is_empty());
    }
}
