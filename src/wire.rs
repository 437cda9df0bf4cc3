use serde_json::Value as JsonValue;

/// Text fields checked first, in order, on an error object.
const TEXT_FIELDS: [&str; 3] = ["detail", "title", "message"];

/// Extracts human-readable detail from an error response body.
///
/// The body is walked as loose JSON so one oddly shaped field cannot hide
/// the others. Checked in order: `detail`, `title`, `message` (strings
/// only), then `error` (string or nested object), then `errors` (first
/// array entry, or the first message of a field-to-messages map).
pub(crate) fn error_detail(status: u16, body: &str) -> String {
    serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|parsed| detail_from(&parsed))
        .unwrap_or_else(|| format!("request failed with status {status}"))
}

fn detail_from(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(text) => non_empty(text),
        JsonValue::Object(fields) => TEXT_FIELDS
            .iter()
            .filter_map(|name| fields.get(*name))
            .find_map(|field| field.as_str().and_then(non_empty))
            .or_else(|| fields.get("error").and_then(detail_from))
            .or_else(|| fields.get("errors").and_then(first_error)),
        _ => None,
    }
}

fn first_error(errors: &JsonValue) -> Option<String> {
    match errors {
        JsonValue::Array(entries) => entries.first().and_then(detail_from),
        // `{"Name": ["The Name field is required."]}`
        JsonValue::Object(fields) => fields.values().find_map(|messages| match messages {
            JsonValue::Array(list) => list.iter().find_map(detail_from),
            other => detail_from(other),
        }),
        _ => None,
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
