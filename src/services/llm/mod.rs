//! LLM-backed text tasks
//!
//! Every task degrades instead of failing: an unconfigured model, a transport
//! error or unparsable output all produce the task's neutral default, so
//! callers never surface LLM trouble to clients.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::models::movie::ReviewSummary;
use crate::models::notification::NotificationMessage;
use crate::models::social::{AdvancedSentiment, Sentiment, SocialPosts};
use crate::models::MovieBrief;

pub mod gemini;
pub mod parse;

pub use gemini::GeminiClient;
pub use parse::{json_from_text, parse_json};

/// Review texts sent along with a summary prompt, at most
pub const MAX_SUMMARY_REVIEWS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Fast model for short generations
    Flash,
    /// Larger model for analysis and summaries
    Pro,
}

impl ModelTier {
    pub fn model(&self) -> &'static str {
        match self {
            ModelTier::Flash => "gemini-1.5-flash",
            ModelTier::Pro => "gemini-1.5-pro",
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Whether credentials are present; tasks skip the call when false
    fn is_configured(&self) -> bool;

    /// Runs one prompt and returns the raw reply text
    async fn generate(&self, tier: ModelTier, prompt: &str) -> AppResult<String>;
}

async fn ask(llm: &dyn LanguageModel, tier: ModelTier, task: &'static str, prompt: &str) -> Option<String> {
    if !llm.is_configured() {
        tracing::debug!(task, "LLM not configured, using fallback");
        return None;
    }
    match llm.generate(tier, prompt).await {
        Ok(text) => {
            tracing::debug!(task, text_len = text.len(), "LLM replied");
            Some(text)
        }
        Err(e) => {
            tracing::warn!(task, error = %e, "LLM call failed, using fallback");
            None
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// One-word polarity of a text; neutral when unsure
pub async fn classify_sentiment(llm: &dyn LanguageModel, text: &str) -> Sentiment {
    if text.trim().is_empty() {
        return Sentiment::Neutral;
    }
    let prompt = format!(
        "Classify the sentiment of the following review as strictly one of: \
         positive, neutral, negative.\nRespond with only the single word.\n\n{}",
        text
    );
    let Some(out) = ask(llm, ModelTier::Flash, "sentiment", &prompt).await else {
        return Sentiment::Neutral;
    };

    let out = out.to_lowercase();
    if out.contains("positive") {
        Sentiment::Positive
    } else if out.contains("negative") {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

/// Polarity, confidence, emotion scores and pros/cons/themes of a review
pub async fn advanced_sentiment(llm: &dyn LanguageModel, text: &str) -> AdvancedSentiment {
    if text.trim().is_empty() {
        return AdvancedSentiment::default();
    }
    let prompt = format!(
        "Analyze the movie review below. Return strict JSON with keys: \
         overall, confidence, emotions, breakdown.\n\
         overall must be one of: positive, neutral, negative.\n\
         confidence is 0..1.\n\
         emotions is an object with scores 0..1 for keys: excited, \
         disappointed, nostalgic, joyful, sad, angry, fearful, surprised.\n\
         breakdown contains arrays pros, cons, themes (short phrases).\n\n\
         Review text:\n{}",
        text
    );
    ask(llm, ModelTier::Pro, "advanced_sentiment", &prompt)
        .await
        .and_then(|out| parse_json(&out))
        .unwrap_or_default()
}

/// Sentiment stored on a new review: the detailed analysis when it names a
/// polarity, else the one-word classifier
pub async fn review_sentiment(
    llm: &dyn LanguageModel,
    text: &str,
) -> (Sentiment, AdvancedSentiment) {
    let advanced = advanced_sentiment(llm, text).await;
    let overall = match advanced.overall {
        Some(sentiment) => sentiment,
        None => classify_sentiment(llm, text).await,
    };
    (overall, advanced)
}

/// Five recommendations as a JSON array, or `None` when the model gave nothing usable
pub async fn recommendations(llm: &dyn LanguageModel, context: &Value) -> Option<Vec<Value>> {
    let prompt = format!(
        "You are a movie recommender. Given user's favorites, liked genres, \
         and review sentiments, propose 5 diverse movie recommendations.\n\
         Return strict JSON array where each item has: \
         imdb_id (if unknown, empty string), title, genres (array), \
         reason (short explanation tailored to user), confidence (0..1).\n\n\
         User context (JSON):\n{}",
        context
    );
    let out = ask(llm, ModelTier::Flash, "recommendations", &prompt).await?;
    match json_from_text(&out)? {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

pub async fn social_posts(
    llm: &dyn LanguageModel,
    movie: &MovieBrief,
    user: &Value,
    preferences: &Value,
) -> SocialPosts {
    let prompt = format!(
        "Create engaging social posts about the movie for Twitter, \
         Instagram, and Facebook.\n\
         Include relevant hashtags, keep tone friendly, and reflect \
         user's preferences if provided.\n\
         Return strict JSON with keys 'twitter', 'instagram', 'facebook'.\n\n\
         Movie (JSON): {}\nUser (JSON): {}\nPreferences (JSON): {}",
        to_json(movie),
        user,
        preferences
    );
    ask(llm, ModelTier::Flash, "social_posts", &prompt)
        .await
        .and_then(|out| parse_json(&out))
        .unwrap_or_default()
}

pub async fn notification_message(
    llm: &dyn LanguageModel,
    user: &Value,
    context: &Value,
) -> NotificationMessage {
    let prompt = format!(
        "Write a concise, personalized push notification for a movie app \
         user given the context (trending movies, friend activities, etc).\n\
         Return strict JSON with keys: title, body. 110 characters max for body.\n\n\
         User (JSON): {}\nContext (JSON): {}",
        user, context
    );
    ask(llm, ModelTier::Flash, "notification_message", &prompt)
        .await
        .and_then(|out| parse_json(&out))
        .unwrap_or_default()
}

/// Summary of review texts, or `None` when there is nothing to summarize or
/// the model gave nothing usable
pub async fn summarize_reviews(
    llm: &dyn LanguageModel,
    movie: &MovieBrief,
    reviews: &[String],
) -> Option<ReviewSummary> {
    if reviews.is_empty() {
        return None;
    }
    let sample = &reviews[..reviews.len().min(MAX_SUMMARY_REVIEWS)];
    let prompt = format!(
        "Summarize the following user reviews for the movie.\n\
         Return strict JSON with keys: summary (<=120 words), \
         overall_sentiment (positive|neutral|negative), key_themes (array \
         of short phrases).\n\n\
         Movie (JSON): {}\nReviews (JSON array): {}",
        to_json(movie),
        to_json(&sample)
    );
    let out = ask(llm, ModelTier::Pro, "review_summary", &prompt).await?;
    parse_json(&out)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LlmHealth {
    pub configured: bool,
    pub success: bool,
    pub model: &'static str,
    pub text_len: usize,
    pub error: Option<String>,
}

/// Sends a one-word prompt to the flash model
pub async fn healthcheck(llm: &dyn LanguageModel) -> LlmHealth {
    let mut info = LlmHealth {
        configured: llm.is_configured(),
        success: false,
        model: ModelTier::Flash.model(),
        text_len: 0,
        error: None,
    };
    if !info.configured {
        return info;
    }

    match llm.generate(ModelTier::Flash, "ping").await {
        Ok(text) => {
            info.text_len = text.len();
            info.success = !text.is_empty();
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM healthcheck failed");
            info.error = Some(e.to_string());
        }
    }
    info
}

/// The `user` object embedded in generation prompts
pub fn prompt_user(id: i64, username: Option<&str>) -> Value {
    match username {
        Some(username) => json!({ "id": id, "username": username }),
        None => json!({ "id": id }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use mockall::predicate::*;

    fn unconfigured() -> MockLanguageModel {
        let mut llm = MockLanguageModel::new();
        llm.expect_is_configured().return_const(false);
        llm.expect_generate().never();
        llm
    }

    fn replying(tier: ModelTier, reply: &'static str) -> MockLanguageModel {
        let mut llm = MockLanguageModel::new();
        llm.expect_is_configured().return_const(true);
        llm.expect_generate()
            .with(eq(tier), always())
            .returning(move |_, _| Ok(reply.to_string()));
        llm
    }

    fn failing() -> MockLanguageModel {
        let mut llm = MockLanguageModel::new();
        llm.expect_is_configured().return_const(true);
        llm.expect_generate()
            .returning(|_, _| Err(AppError::ExternalApi("boom".to_string())));
        llm
    }

    fn brief() -> MovieBrief {
        MovieBrief {
            imdb_id: "tt0133093".into(),
            title: "The Matrix".into(),
            genres: vec!["Action".into(), "Sci-Fi".into()],
            year: "1999".into(),
            plot: "A hacker learns the truth.".into(),
        }
    }

    #[tokio::test]
    async fn test_classify_sentiment_reads_word() {
        let llm = replying(ModelTier::Flash, "Positive.");
        assert_eq!(classify_sentiment(&llm, "Loved it").await, Sentiment::Positive);

        let llm = replying(ModelTier::Flash, "NEGATIVE");
        assert_eq!(classify_sentiment(&llm, "Awful").await, Sentiment::Negative);

        let llm = replying(ModelTier::Flash, "mixed feelings");
        assert_eq!(classify_sentiment(&llm, "Hmm").await, Sentiment::Neutral);
    }

    #[tokio::test]
    async fn test_classify_sentiment_fallbacks() {
        assert_eq!(classify_sentiment(&unconfigured(), "text").await, Sentiment::Neutral);
        assert_eq!(classify_sentiment(&failing(), "text").await, Sentiment::Neutral);
        assert_eq!(classify_sentiment(&unconfigured(), "  ").await, Sentiment::Neutral);
    }

    #[tokio::test]
    async fn test_advanced_sentiment_parses_fenced_json() {
        let llm = replying(
            ModelTier::Pro,
            "```json\n{\"overall\": \"positive\", \"confidence\": 0.92, \
             \"emotions\": {\"joyful\": 0.8}, \
             \"breakdown\": {\"pros\": [\"visuals\"], \"cons\": [], \"themes\": [\"reality\"]}}\n```",
        );
        let result = advanced_sentiment(&llm, "Stunning").await;
        assert_eq!(result.overall, Some(Sentiment::Positive));
        assert_eq!(result.confidence, Some(0.92));
        assert_eq!(result.breakdown.pros, vec!["visuals"]);
    }

    #[tokio::test]
    async fn test_advanced_sentiment_fallback_is_neutral() {
        let result = advanced_sentiment(&failing(), "Stunning").await;
        assert_eq!(result, AdvancedSentiment::default());

        let llm = replying(ModelTier::Pro, "I cannot help with that.");
        assert_eq!(advanced_sentiment(&llm, "x").await, AdvancedSentiment::default());
    }

    #[tokio::test]
    async fn test_review_sentiment_falls_back_to_classifier() {
        let mut llm = MockLanguageModel::new();
        llm.expect_is_configured().return_const(true);
        llm.expect_generate()
            .with(eq(ModelTier::Pro), always())
            .returning(|_, _| Ok("{\"confidence\": 0.4}".to_string()));
        llm.expect_generate()
            .with(eq(ModelTier::Flash), always())
            .returning(|_, _| Ok("negative".to_string()));

        let (overall, advanced) = review_sentiment(&llm, "Dull").await;
        assert_eq!(overall, Sentiment::Negative);
        assert_eq!(advanced.confidence, Some(0.4));
    }

    #[tokio::test]
    async fn test_recommendations_requires_array() {
        let llm = replying(ModelTier::Flash, "[{\"title\": \"Heat\"}]");
        let items = recommendations(&llm, &json!({})).await.unwrap();
        assert_eq!(items[0]["title"], "Heat");

        let llm = replying(ModelTier::Flash, "{\"title\": \"Heat\"}");
        assert_eq!(recommendations(&llm, &json!({})).await, None);
        assert_eq!(recommendations(&unconfigured(), &json!({})).await, None);
    }

    #[tokio::test]
    async fn test_social_posts_fill_missing_platforms() {
        let llm = replying(ModelTier::Flash, "{\"twitter\": \"Red pill? #Matrix\"}");
        let posts = social_posts(&llm, &brief(), &json!({ "id": 1 }), &json!({})).await;
        assert_eq!(posts.twitter, "Red pill? #Matrix");
        assert_eq!(posts.instagram, "");

        let posts = social_posts(&unconfigured(), &brief(), &json!({}), &json!({})).await;
        assert_eq!(posts, SocialPosts::default());
    }

    #[tokio::test]
    async fn test_notification_message_fallback() {
        let message = notification_message(&failing(), &json!({ "id": 1 }), &json!({})).await;
        assert_eq!(message, NotificationMessage::default());

        let llm = replying(ModelTier::Flash, "{\"title\": \"New drop\", \"body\": \"Dune is out\"}");
        let message = notification_message(&llm, &json!({ "id": 1 }), &json!({})).await;
        assert_eq!(message.title, "New drop");
        assert_eq!(message.body, "Dune is out");
    }

    #[tokio::test]
    async fn test_summarize_reviews_skips_without_reviews() {
        assert_eq!(summarize_reviews(&unconfigured(), &brief(), &[]).await, None);
    }

    #[tokio::test]
    async fn test_summarize_reviews_caps_sample() {
        let mut llm = MockLanguageModel::new();
        llm.expect_is_configured().return_const(true);
        llm.expect_generate()
            .withf(|tier, prompt| {
                *tier == ModelTier::Pro
                    && prompt.contains("\"review 49\"")
                    && !prompt.contains("\"review 50\"")
            })
            .returning(|_, _| {
                Ok("{\"summary\": \"Loved\", \"overall_sentiment\": \"positive\", \"key_themes\": [\"action\"]}".to_string())
            });

        let reviews: Vec<String> = (0..60).map(|i| format!("review {}", i)).collect();
        let summary = summarize_reviews(&llm, &brief(), &reviews).await.unwrap();
        assert_eq!(summary.overall_sentiment, "positive");
        assert_eq!(summary.key_themes, vec!["action"]);
    }

    #[tokio::test]
    async fn test_healthcheck_reports_state() {
        let info = healthcheck(&unconfigured()).await;
        assert!(!info.configured);
        assert!(!info.success);
        assert_eq!(info.model, "gemini-1.5-flash");

        let info = healthcheck(&replying(ModelTier::Flash, "pong")).await;
        assert!(info.success);
        assert_eq!(info.text_len, 4);

        let info = healthcheck(&failing()).await;
        assert!(!info.success);
        assert!(info.error.is_some());
    }

    #[test]
    fn test_prompt_user() {
        assert_eq!(prompt_user(3, Some("ana")), json!({ "id": 3, "username": "ana" }));
        assert_eq!(prompt_user(3, None), json!({ "id": 3 }));
    }
}
