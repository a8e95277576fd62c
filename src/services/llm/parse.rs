use serde_json::Value;

/// Best-effort extraction of JSON from model output
///
/// Models wrap JSON in markdown fences or surround it with prose. This strips
/// a fence (and its language tag), then parses from the first `{` or `[`.
/// If that fails it falls back to the outermost pair of braces.
pub fn json_from_text(text: &str) -> Option<Value> {
    let mut s = text.trim();
    if s.is_empty() {
        return None;
    }

    if s.len() >= 6 && s.starts_with("```") && s.ends_with("```") {
        s = s.trim_matches(|c| c == '`' || c == '\n' || c == ' ');
        if !s.starts_with(['{', '[']) {
            if let Some((_, rest)) = s.split_once('\n') {
                s = rest;
            }
        }
    }

    let start = [s.find('{'), s.find('[')].into_iter().flatten().min().unwrap_or(0);
    if let Ok(value) = serde_json::from_str(s[start..].trim_end()) {
        return Some(value);
    }

    let first = s.find('{')?;
    let last = s.rfind('}')?;
    if last <= first {
        return None;
    }
    serde_json::from_str(&s[first..=last]).ok()
}

/// Like [`json_from_text`], then deserializes into `T`
pub fn parse_json<T: serde::de::DeserializeOwned>(text: &str) -> Option<T> {
    json_from_text(text).and_then(|value| serde_json::from_value(value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        assert_eq!(json_from_text(r#"{"a": 1}"#), Some(json!({ "a": 1 })));
    }

    #[test]
    fn test_fenced_json_with_language_tag() {
        let text = "```json\n{\"title\": \"Tonight\", \"body\": \"Watch it\"}\n```";
        assert_eq!(
            json_from_text(text),
            Some(json!({ "title": "Tonight", "body": "Watch it" }))
        );
    }

    #[test]
    fn test_array_after_prose() {
        let text = "Here are your picks: [{\"title\": \"Heat\"}]";
        assert_eq!(json_from_text(text), Some(json!([{ "title": "Heat" }])));
    }

    #[test]
    fn test_object_with_trailing_prose_uses_outer_braces() {
        let text = "Sure! {\"summary\": \"Fun\"} Hope this helps.";
        assert_eq!(json_from_text(text), Some(json!({ "summary": "Fun" })));
    }

    #[test]
    fn test_garbage_is_none() {
        assert_eq!(json_from_text(""), None);
        assert_eq!(json_from_text("no json here"), None);
        assert_eq!(json_from_text("{ broken"), None);
    }

    #[test]
    fn test_parse_json_typed() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Msg {
            title: String,
        }
        assert_eq!(
            parse_json::<Msg>("```\n{\"title\": \"Hi\"}\n```"),
            Some(Msg {
                title: "Hi".to_string()
            })
        );
        assert_eq!(parse_json::<Msg>("[1, 2]"), None);
    }
}
