use crm_core::error::AgentError;
use crm_core::interaction::{today, InteractionDraft, InteractionType, Sentiment};
use crm_core::tool_registry::Tool;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::LazyLock;

static HCP_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[Dd]r|[Dd]octor)\.?\s+(\p{Lu}[\p{L}'\-]+(?:\s+\p{Lu}[\p{L}'\-]+)?)").unwrap()
});
static CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:call|called|calling|phone|phoned)\b").unwrap());
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:e-?mail|e-?mailed|e-?mailing)\b").unwrap());
static TOPICS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:discussed|talked about|covered)\s+([^,.;]+)").unwrap());
static MATERIALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:shared|gave|left|provided|handed out)\s+([^,.;]+)").unwrap()
});
static SAMPLES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsamples?\s+of\s+([^,.;]+)").unwrap());
/// "and" followed by a verb that starts a new clause.
static CLAUSE_JOIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\band\s+(discussed|talked about|covered|shared|gave|left|provided|handed out)\b")
        .unwrap()
});
static POSITIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:positive|great|good|interested|enthusiastic|receptive|agreed|keen|excellent|happy)\b")
        .unwrap()
});
static NEGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:negative|concerns?|concerned|skeptical|sceptical|unhappy|uninterested|declined|rejected|poor|bad)\b")
        .unwrap()
});

/// Turn free text into a best-effort interaction draft. Pure: no I/O.
pub struct ExtractInteractionTool;

#[derive(Debug, Deserialize)]
struct ExtractArgs {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl Tool for ExtractInteractionTool {
    fn name(&self) -> &str {
        "extract_interaction_from_text"
    }

    fn description(&self) -> &str {
        "Extract the interaction values (HCP name, type, date, topics, materials, \
         samples, sentiment, outcomes) from the user's free-text description. \
         Returns the values only, never a schema."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The user's description of the interaction"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, AgentError> {
        let args: ExtractArgs =
            serde_json::from_value(args).map_err(|e| AgentError::InvalidArguments {
                tool_name: self.name().into(),
                message: e.to_string(),
            })?;
        let draft = extract_interaction(&args.text);
        Ok(serde_json::to_string(&draft)?)
    }
}

/// Missing fields fall back to empty values; never fails.
pub fn extract_interaction(text: &str) -> InteractionDraft {
    let hcp_name = HCP_NAME
        .captures(text)
        .map(|c| format!("Dr. {}", &c[1]))
        .unwrap_or_default();

    let interaction_type = if CALL.is_match(text) {
        InteractionType::Call
    } else if EMAIL.is_match(text) {
        InteractionType::Email
    } else {
        InteractionType::Meeting
    };

    let segments = segments(text);
    let topics_discussed = collect(&TOPICS, &segments, false);
    let materials_shared = collect(&MATERIALS, &segments, true)
        .into_iter()
        .filter(|m| !m.to_lowercase().starts_with("sample"))
        .collect();
    let samples_distributed = collect(&SAMPLES, &segments, true);

    let positive = POSITIVE.find_iter(text).count();
    let negative = NEGATIVE.find_iter(text).count();
    let sentiment = match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    };

    InteractionDraft {
        attendees: if hcp_name.is_empty() {
            Vec::new()
        } else {
            vec![hcp_name.clone()]
        },
        hcp_name,
        interaction_type,
        interaction_date: today(),
        topics_discussed,
        materials_shared,
        samples_distributed,
        sentiment,
        outcomes: text.trim().to_string(),
    }
}

/// Split text into clauses on punctuation and on "and <verb>".
fn segments(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    for piece in text.split([',', '.', ';']) {
        let mut start = 0;
        for caps in CLAUSE_JOIN.captures_iter(piece) {
            let verb_start = caps.get(1).map_or(start, |m| m.start());
            let whole_start = caps.get(0).map_or(start, |m| m.start());
            out.push(&piece[start..whole_start]);
            start = verb_start;
        }
        out.push(&piece[start..]);
    }
    out.into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// The first capture of `pattern` in each clause, optionally split on "and".
fn collect(pattern: &Regex, segments: &[&str], split_and: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for segment in segments {
        let Some(caps) = pattern.captures(segment) else {
            continue;
        };
        let clause = caps[1].trim();
        let parts: Vec<&str> = if split_and {
            clause.split(" and ").collect()
        } else {
            vec![clause]
        };
        for part in parts {
            let item = strip_article(part.trim());
            if !item.is_empty() && !out.iter().any(|o| o == item) {
                out.push(item.to_string());
            }
        }
    }
    out
}

fn strip_article(s: &str) -> &str {
    for article in ["the ", "some ", "a ", "an "] {
        let matched = s.len() > article.len()
            && s.get(..article.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(article));
        if matched {
            return s[article.len()..].trim_start();
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_meeting_note() {
        let draft = extract_interaction(
            "Met Dr. Smith, discussed product X efficiency, shared brochures, positive outcome",
        );
        assert_eq!(draft.hcp_name, "Dr. Smith");
        assert_eq!(draft.interaction_type, InteractionType::Meeting);
        assert_eq!(draft.attendees, vec!["Dr. Smith"]);
        assert_eq!(draft.topics_discussed, vec!["product X efficiency"]);
        assert_eq!(draft.materials_shared, vec!["brochures"]);
        assert!(draft.samples_distributed.is_empty());
        assert_eq!(draft.sentiment, Sentiment::Positive);
        assert_eq!(draft.interaction_date, today());
        assert!(draft.outcomes.starts_with("Met Dr. Smith"));
    }

    #[test]
    fn test_call_with_samples_and_concerns() {
        let draft = extract_interaction(
            "Called Dr. Jane Patel; she raised concerns about dosing. \
             Gave samples of Cardiozen and left the trial summary and a leaflet.",
        );
        assert_eq!(draft.hcp_name, "Dr. Jane Patel");
        assert_eq!(draft.interaction_type, InteractionType::Call);
        assert_eq!(draft.samples_distributed, vec!["Cardiozen"]);
        assert_eq!(draft.materials_shared, vec!["trial summary", "leaflet"]);
        assert_eq!(draft.sentiment, Sentiment::Negative);
    }

    #[test]
    fn test_segments_split_on_joined_verbs() {
        assert_eq!(
            segments("Gave samples of A and left the summary, then left"),
            vec!["Gave samples of A", "left the summary", "then left"]
        );
    }

    #[test]
    fn test_email_type() {
        let draft = extract_interaction("Sent an email to Doctor Lee about the new study");
        assert_eq!(draft.interaction_type, InteractionType::Email);
        assert_eq!(draft.hcp_name, "Dr. Lee");
    }

    #[test]
    fn test_empty_text_yields_empty_draft() {
        let draft = extract_interaction("");
        assert!(draft.hcp_name.is_empty());
        assert!(draft.attendees.is_empty());
        assert!(draft.topics_discussed.is_empty());
        assert_eq!(draft.sentiment, Sentiment::Neutral);
        assert_eq!(draft.interaction_type, InteractionType::Meeting);
    }

    #[tokio::test]
    async fn test_tool_returns_draft_json() {
        let out = ExtractInteractionTool
            .execute(json!({"text": "Met Dr. Smith, positive"}))
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["hcp_name"], "Dr. Smith");
        assert_eq!(value["sentiment"], "Positive");
        assert_eq!(value["interaction_date"], today().format("%Y-%m-%d").to_string());
    }

    #[test]
    fn test_strip_article_on_multibyte_text() {
        assert_eq!(strip_article("café pricing"), "café pricing");
        assert_eq!(strip_article("中文资料"), "中文资料");
        assert_eq!(strip_article("the café menu"), "café menu");
    }

    #[tokio::test]
    async fn test_non_ascii_note() {
        let note = "Met Dr. Müller, discussed café pricing, shared 中文资料, positive";
        let draft = extract_interaction(note);
        assert_eq!(draft.hcp_name, "Dr. Müller");
        assert_eq!(draft.topics_discussed, vec!["café pricing"]);
        assert_eq!(draft.materials_shared, vec!["中文资料"]);

        let out = ExtractInteractionTool
            .execute(json!({ "text": note }))
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["topics_discussed"], json!(["café pricing"]));
    }

    #[tokio::test]
    async fn test_missing_text_is_not_an_error() {
        let out = ExtractInteractionTool.execute(json!({})).await.unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["hcp_name"], "");
    }

    #[tokio::test]
    async fn test_wrong_argument_type_is_invalid_arguments() {
        let err = ExtractInteractionTool
            .execute(json!({"text": 42}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments { .. }));
    }
}
