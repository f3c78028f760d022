//! Cleanup applied to log content and settings on their way in and out of a
//! backup bundle.

use serde_json::Value;

/// Keys a serialized local record can carry.
const STORAGE_WRAPPER_KEYS: [&str; 4] = ["content", "contentHash", "parentHash", "localUpdatedAt"];
const MAX_UNWRAP_DEPTH: usize = 10;

/// Peel serialized storage records that ended up inside log content.
///
/// Some older exports stored the whole `{content, contentHash, ...}` record
/// as the log text, sometimes several times over. At most ten layers are
/// removed; anything that is not a wrapper is returned unchanged.
#[must_use]
pub fn unwrap_storage_wrapper(raw: &str) -> String {
    let mut current = raw.to_string();
    for _ in 0..MAX_UNWRAP_DEPTH {
        match unwrap_once(&current) {
            Some(inner) if inner != current => current = inner,
            _ => break,
        }
    }
    current
}

fn unwrap_once(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return None;
    }
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) else {
        return None;
    };
    let Some(Value::String(content)) = map.get("content") else {
        return None;
    };
    if !map
        .keys()
        .all(|key| STORAGE_WRAPPER_KEYS.contains(&key.as_str()))
    {
        return None;
    }
    Some(content.clone())
}

/// Strip the custom sound payload from persisted sound settings.
///
/// A `custom` selection falls back to `beep` since the audio itself is not
/// carried over. Values that are not a JSON object pass through untouched.
#[must_use]
pub fn sanitize_sound_settings(raw: &str) -> String {
    let Ok(Value::Object(mut settings)) = serde_json::from_str::<Value>(raw) else {
        return raw.to_string();
    };
    settings.insert("customSoundData".to_string(), Value::Null);
    settings.insert("customSoundName".to_string(), Value::Null);
    if settings.get("selectedSound").and_then(Value::as_str) == Some("custom") {
        settings.insert("selectedSound".to_string(), Value::from("beep"));
    }
    Value::Object(settings).to_string()
}

/// Render any JSON value the way a string-valued store would hold it.
pub(super) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
