//! The HCP interaction record and the draft the tools pass around.
//!
//! Dates are accepted in the handful of shapes models tend to produce and are
//! always written back out as `YYYY-MM-DD`.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionType {
    #[default]
    #[serde(alias = "meeting", alias = "MEETING")]
    Meeting,
    #[serde(alias = "call", alias = "CALL")]
    Call,
    #[serde(alias = "email", alias = "EMAIL")]
    Email,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    #[serde(alias = "positive", alias = "POSITIVE")]
    Positive,
    #[default]
    #[serde(alias = "neutral", alias = "NEUTRAL")]
    Neutral,
    #[serde(alias = "negative", alias = "NEGATIVE")]
    Negative,
}

/// A structured interaction before it has been persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionDraft {
    #[serde(default)]
    pub hcp_name: String,
    #[serde(default)]
    pub interaction_type: InteractionType,
    #[serde(default = "today", deserialize_with = "flexible_date")]
    pub interaction_date: NaiveDate,
    #[serde(default, deserialize_with = "string_or_list")]
    pub attendees: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub topics_discussed: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub materials_shared: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub samples_distributed: Vec<String>,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub outcomes: String,
}

impl Default for InteractionDraft {
    fn default() -> Self {
        Self {
            hcp_name: String::new(),
            interaction_type: InteractionType::default(),
            interaction_date: today(),
            attendees: Vec::new(),
            topics_discussed: Vec::new(),
            materials_shared: Vec::new(),
            samples_distributed: Vec::new(),
            sentiment: Sentiment::default(),
            outcomes: String::new(),
        }
    }
}

impl InteractionDraft {
    /// Check the fields the CRM cannot store without.
    pub fn validate(&self) -> Result<(), String> {
        if self.hcp_name.trim().is_empty() {
            return Err("hcp_name must not be empty".into());
        }
        Ok(())
    }
}

/// Body of a logging request: a draft plus the extras the CRM keeps with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogForm {
    #[serde(flatten)]
    pub draft: InteractionDraft,
    #[serde(default)]
    pub follow_up_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_transcript: Option<String>,
}

impl From<InteractionDraft> for LogForm {
    fn from(draft: InteractionDraft) -> Self {
        Self {
            draft,
            follow_up_actions: Vec::new(),
            raw_transcript: None,
        }
    }
}

impl LogForm {
    /// Assign an id and timestamp.
    pub fn into_record(self) -> InteractionRecord {
        InteractionRecord::new(self.draft, self.follow_up_actions, self.raw_transcript)
    }
}

/// A persisted interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub interaction_id: Uuid,
    #[serde(flatten)]
    pub draft: InteractionDraft,
    #[serde(default)]
    pub follow_up_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_transcript: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InteractionRecord {
    pub fn new(
        draft: InteractionDraft,
        follow_up_actions: Vec<String>,
        raw_transcript: Option<String>,
    ) -> Self {
        Self {
            interaction_id: Uuid::new_v4(),
            draft,
            follow_up_actions,
            raw_transcript,
            created_at: Utc::now(),
        }
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse a date in any of the accepted shapes.
pub fn parse_interaction_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    ["%Y/%m/%d", "%m/%d/%Y", "%B %d, %Y", "%d %B %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn flexible_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(today()),
        Some(s) => parse_interaction_date(s)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognised date '{}'", s))),
    }
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) if s.trim().is_empty() => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}
