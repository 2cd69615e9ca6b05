//! Diary analysis pipeline: emotion classification, keyword extraction, and
//! companion-quote generation over a chat-completion API, with a
//! deterministic fallback when the API is unconfigured or unavailable.

use serde::Deserialize;

use crate::config::Config;
use crate::models::diary::Emotion;

pub const DEFAULT_CONFIDENCE: f64 = 0.5;
const MATCH_CONFIDENCE: f64 = 0.9;
const MAX_KEYWORDS: usize = 5;

pub struct AiClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug)]
pub struct DiaryAnalysis {
    pub emotion: Emotion,
    pub confidence: f64,
    pub keywords: Vec<String>,
    pub generated_text: String,
    /// "model" when produced by the API, "fallback" otherwise.
    pub source: &'static str,
    pub tokens_used: i32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: i32,
}

impl AiClient {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_url: config.ai_api_url.clone(),
            api_key: config.ai_api_key.clone(),
            model: config.ai_model.clone(),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<(String, i32), anyhow::Error> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "temperature": temperature,
                "max_tokens": max_tokens,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user },
                ],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Chat API error {}: {}", status, body);
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat API returned no choices"))?;
        let tokens = parsed.usage.map(|u| u.total_tokens).unwrap_or(0);

        Ok((content, tokens))
    }

    /// Run the full three-step analysis, falling back to the deterministic
    /// path on any error.
    pub async fn analyze(&self, content: &str) -> DiaryAnalysis {
        if !self.enabled() {
            return fallback_analysis(content);
        }

        match self.analyze_with_model(content).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(error = %e, "AI analysis unavailable, using deterministic fallback");
                fallback_analysis(content)
            }
        }
    }

    async fn analyze_with_model(&self, content: &str) -> Result<DiaryAnalysis, anyhow::Error> {
        let mut tokens_used = 0;

        let (emotion_reply, tokens) = self
            .chat(
                "You are a counselor classifying the dominant emotion of a diary entry. \
                 Answer with exactly one word from: happy, sad, angry, peaceful, unrest.",
                content,
                0.3,
                50,
            )
            .await?;
        tokens_used += tokens;

        let (emotion, confidence) =
            parse_emotion(&emotion_reply).unwrap_or((Emotion::Peaceful, DEFAULT_CONFIDENCE));

        let (keywords_reply, tokens) = self
            .chat(
                &format!(
                    "Extract at most {MAX_KEYWORDS} short keywords from the diary entry, \
                     excluding the emotion itself. Reply with a JSON array of strings only."
                ),
                content,
                0.5,
                100,
            )
            .await?;
        tokens_used += tokens;
        let keywords = parse_keywords(&keywords_reply);

        let (quote, tokens) = self
            .chat(
                &format!(
                    "Write one short, warm sentence for someone whose diary entry feels {}. \
                     Do not quote the entry back.",
                    emotion.as_str()
                ),
                content,
                0.7,
                200,
            )
            .await?;
        tokens_used += tokens;

        Ok(DiaryAnalysis {
            emotion,
            confidence,
            keywords,
            generated_text: quote.trim().to_string(),
            source: "model",
            tokens_used,
        })
    }
}

/// Map a free-form model reply onto the fixed emotion set.
pub fn parse_emotion(reply: &str) -> Option<(Emotion, f64)> {
    let normalized = reply.trim().to_lowercase();

    for emotion in Emotion::ALL {
        if normalized == emotion.as_str() {
            return Some((emotion, MATCH_CONFIDENCE));
        }
    }

    // Loose match for replies like "The emotion is: happiness."
    let aliases: [(&str, Emotion); 10] = [
        ("happi", Emotion::Happy),
        ("joy", Emotion::Happy),
        ("sad", Emotion::Sad),
        ("grief", Emotion::Sad),
        ("angr", Emotion::Angry),
        ("rage", Emotion::Angry),
        ("peace", Emotion::Peaceful),
        ("calm", Emotion::Peaceful),
        ("unrest", Emotion::Unrest),
        ("anxi", Emotion::Unrest),
    ];
    for (needle, emotion) in aliases {
        if normalized.contains(needle) {
            return Some((emotion, DEFAULT_CONFIDENCE));
        }
    }

    None
}

/// Parse a keyword reply: JSON array preferred, comma-separated fallback.
pub fn parse_keywords(reply: &str) -> Vec<String> {
    let trimmed = reply.trim();

    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(trimmed) {
        return items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty())
            .take(MAX_KEYWORDS)
            .collect();
    }

    trimmed
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .take(MAX_KEYWORDS)
        .collect()
}

/// Deterministic analysis used when the model is unavailable.
fn fallback_analysis(content: &str) -> DiaryAnalysis {
    let lowered = content.to_lowercase();

    let scores: [(Emotion, usize); 5] = [
        (Emotion::Happy, count_hits(&lowered, &["happy", "glad", "great", "fun", "love"])),
        (Emotion::Sad, count_hits(&lowered, &["sad", "cry", "miss", "lonely", "tears"])),
        (Emotion::Angry, count_hits(&lowered, &["angry", "mad", "furious", "annoyed", "hate"])),
        (Emotion::Unrest, count_hits(&lowered, &["worried", "anxious", "nervous", "afraid", "stress"])),
        (Emotion::Peaceful, count_hits(&lowered, &["calm", "quiet", "peaceful", "relaxed", "rest"])),
    ];

    let (emotion, hits) = scores
        .iter()
        .max_by_key(|(_, hits)| *hits)
        .copied()
        .unwrap_or((Emotion::Peaceful, 0));
    let emotion = if hits == 0 { Emotion::Peaceful } else { emotion };

    let mut keywords: Vec<String> = Vec::new();
    for word in content.split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if cleaned.len() > 4 && !keywords.contains(&cleaned) {
            keywords.push(cleaned);
            if keywords.len() == MAX_KEYWORDS {
                break;
            }
        }
    }

    DiaryAnalysis {
        emotion,
        confidence: DEFAULT_CONFIDENCE,
        keywords,
        generated_text: "Every day you write something down, you get a little closer to yourself."
            .to_string(),
        source: "fallback",
        tokens_used: 0,
    }
}

fn count_hits(text: &str, needles: &[&str]) -> usize {
    needles.iter().filter(|n| text.contains(*n)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_emotion_exact() {
        assert_eq!(parse_emotion("happy"), Some((Emotion::Happy, MATCH_CONFIDENCE)));
        assert_eq!(parse_emotion(" Unrest \n"), Some((Emotion::Unrest, MATCH_CONFIDENCE)));
    }

    #[test]
    fn test_parse_emotion_loose_match() {
        let (emotion, confidence) = parse_emotion("The emotion is happiness.").unwrap();
        assert_eq!(emotion, Emotion::Happy);
        assert_eq!(confidence, DEFAULT_CONFIDENCE);

        let (emotion, _) = parse_emotion("feels quite anxious overall").unwrap();
        assert_eq!(emotion, Emotion::Unrest);
    }

    #[test]
    fn test_parse_emotion_unknown() {
        assert_eq!(parse_emotion("bewildered"), None);
    }

    #[test]
    fn test_parse_keywords_json_array() {
        let keywords = parse_keywords(r#"["work", "coffee", "deadline"]"#);
        assert_eq!(keywords, vec!["work", "coffee", "deadline"]);
    }

    #[test]
    fn test_parse_keywords_caps_at_five() {
        let keywords = parse_keywords(r#"["a","b","c","d","e","f","g"]"#);
        assert_eq!(keywords.len(), 5);
    }

    #[test]
    fn test_parse_keywords_comma_fallback() {
        let keywords = parse_keywords("work, coffee , deadline");
        assert_eq!(keywords, vec!["work", "coffee", "deadline"]);
    }

    #[test]
    fn test_fallback_classifies_by_wordlist() {
        let analysis = fallback_analysis("I was so angry and mad at the traffic today");
        assert_eq!(analysis.emotion, Emotion::Angry);
        assert_eq!(analysis.source, "fallback");
        assert_eq!(analysis.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_fallback_defaults_to_peaceful() {
        let analysis = fallback_analysis("wrote some code shipped a release");
        assert_eq!(analysis.emotion, Emotion::Peaceful);
    }

    #[test]
    fn test_fallback_keywords_are_capped_and_distinct() {
        let analysis =
            fallback_analysis("morning morning coffee coffee deadline meeting review standup retro planning");
        assert!(analysis.keywords.len() <= 5);
        let mut deduped = analysis.keywords.clone();
        deduped.dedup();
        assert_eq!(deduped, analysis.keywords);
    }
}
