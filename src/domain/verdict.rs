use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// The classifier's judgment on one piece of text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_toxic: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub matches: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Suggestions>,
    /// Older servers send a single rewrite instead of the full set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind_suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Verdict {
    pub fn safe() -> Self {
        Self::default()
    }

    /// Fail-open verdict: never toxic, carries the reason.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn toxic(matches: Vec<String>) -> Self {
        Self {
            is_toxic: true,
            matches,
            ..Self::default()
        }
    }

    /// Server rewrites where present, the built-in phrasing for every blank style.
    pub fn suggestions_or_default(&self) -> Suggestions {
        let mut merged = Suggestions::fallback();
        if let Some(kind) = non_blank(self.kind_suggestion.as_deref()) {
            merged.kind = kind.to_string();
        }
        if let Some(server) = &self.suggestions {
            for kind in SuggestionKind::ALL {
                if let Some(text) = non_blank(Some(server.get(kind))) {
                    merged.set(kind, text);
                }
            }
        }
        merged
    }
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.filter(|text| !text.trim().is_empty())
}

/// Model output is passed through verbatim, so `null` shows up where a value was expected.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestions {
    #[serde(default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub funny: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub professional: String,
}

impl Suggestions {
    pub fn fallback() -> Self {
        Self {
            kind: "Let's be polite. / कृपया विनम्र रहें। / தயவுசெய்து பணிவாக இருங்கள்.".to_string(),
            funny: "Let's add some humor! / थोड़ा मज़ाक हो जाए! / கொஞ்சம் நகைச்சுவையாக இருக்கலாம்!"
                .to_string(),
            professional:
                "Let's keep it formal. / इसे औपचारिक रखें। / இதை முறைப்படி வைத்திருங்கள்."
                    .to_string(),
        }
    }

    pub fn get(&self, kind: SuggestionKind) -> &str {
        match kind {
            SuggestionKind::Kind => &self.kind,
            SuggestionKind::Funny => &self.funny,
            SuggestionKind::Professional => &self.professional,
        }
    }

    fn set(&mut self, kind: SuggestionKind, text: &str) {
        let slot = match kind {
            SuggestionKind::Kind => &mut self.kind,
            SuggestionKind::Funny => &mut self.funny,
            SuggestionKind::Professional => &mut self.professional,
        };
        *slot = text.to_string();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Kind,
    Funny,
    Professional,
}

impl SuggestionKind {
    pub const ALL: [SuggestionKind; 3] = [
        SuggestionKind::Kind,
        SuggestionKind::Funny,
        SuggestionKind::Professional,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionKind::Kind => "kind",
            SuggestionKind::Funny => "funny",
            SuggestionKind::Professional => "professional",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SuggestionKind::Kind => "Kind",
            SuggestionKind::Funny => "Funny",
            SuggestionKind::Professional => "Formal",
        }
    }
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationToxicity {
    pub count: u32,
    pub last_seen: DateTime<Utc>,
}
