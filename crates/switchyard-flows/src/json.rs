use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

fn object_pattern() -> Option<&'static Regex> {
    static OBJECT: OnceLock<Option<Regex>> = OnceLock::new();
    OBJECT
        .get_or_init(|| Regex::new(r"(?s)\{.*\}").ok())
        .as_ref()
}

/// Pull the outermost `{...}` out of free-form model output and parse it.
pub fn extract_json(text: &str) -> Option<Value> {
    let found = object_pattern()?.find(text)?;
    serde_json::from_str(found.as_str()).ok()
}

/// [`extract_json`], then deserialize into `T`.
pub fn extract_as<T: DeserializeOwned>(text: &str) -> Option<T> {
    serde_json::from_value(extract_json(text)?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_object_in_prose() {
        let text = "Sure!\n```json\n{\"category\": \"Food\", \"amount\": 4.5}\n```\nAnything else?";
        assert_eq!(
            extract_json(text),
            Some(json!({"category": "Food", "amount": 4.5}))
        );
    }

    #[test]
    fn nested_objects_survive() {
        let text = r#"{"a": {"b": 1}}"#;
        assert_eq!(extract_json(text), Some(json!({"a": {"b": 1}})));
    }

    #[test]
    fn no_object_or_bad_json() {
        assert_eq!(extract_json("I cannot help with that."), None);
        assert_eq!(extract_json("{category: Food}"), None);
    }
}
