use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

pub const DEFAULT_CONVERSATION_ID: &str = "default_convo";

/// Path segment that precedes a thread id, never an id itself.
const THREAD_MARKER: &str = "t";

static ID_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w@.-]+$").expect("valid conversation id regex"));

/// Derives a conversation key from the page location.
///
/// Tries `/t/<id>`, then a `phone` query parameter, then the last path segment that looks like
/// an identifier. This is a heuristic: distinct chats on the same route share a key.
pub fn conversation_id(location: &str) -> String {
    let Ok(url) = Url::parse(location) else {
        return DEFAULT_CONVERSATION_ID.to_string();
    };

    let segments: Vec<&str> = url
        .path_segments()
        .map(|parts| parts.filter(|part| !part.is_empty()).collect())
        .unwrap_or_default();

    if let Some(id) = segments
        .iter()
        .position(|segment| *segment == THREAD_MARKER)
        .and_then(|pos| segments.get(pos + 1))
        .filter(|id| ID_SEGMENT.is_match(id))
    {
        return id.to_string();
    }

    if let Some((_, phone)) = url.query_pairs().find(|(key, _)| key == "phone") {
        if ID_SEGMENT.is_match(&phone) {
            return phone.into_owned();
        }
    }

    segments
        .iter()
        .rev()
        .find(|segment| **segment != THREAD_MARKER && ID_SEGMENT.is_match(segment))
        .map(|segment| segment.to_string())
        .unwrap_or_else(|| DEFAULT_CONVERSATION_ID.to_string())
}
