use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::content::SpeechSynthesizer;
use crate::error::{GenerationErrorKind, QuizcastError, Result};

/// ElevenLabs API base URL (overridable for tests).
const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";

/// The show's fixed narrator voice.
const DEFAULT_VOICE_ID: &str = "NOpBlnGInO9m6vDvFkFC";

const MODEL_ID: &str = "eleven_multilingual_v2";

/// Narration reads slightly fast to keep the show under a minute.
const VOICE_SPEED: f32 = 1.20;

/// Delay before every TTS request to stay under burst limits.
const PACING_DELAY_MS: u64 = 500;

/// How long to wait after a 429 before retrying.
const RATE_LIMIT_WAIT_SECS: u64 = 5;

/// How many 429 responses we tolerate per line before giving up.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// ElevenLabs text-to-speech client.
pub struct ElevenLabsClient {
    client: reqwest::Client,
    api_key: String,
    voice_id: String,
    base_url: String,
}

impl ElevenLabsClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            voice_id: DEFAULT_VOICE_ID.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_voice(mut self, voice_id: String) -> Self {
        self.voice_id = voice_id;
        self
    }

    /// Override the API base URL (used by mock-server tests).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn build_payload(text: &str) -> TtsRequest {
        TtsRequest {
            text: text.to_string(),
            model_id: MODEL_ID.to_string(),
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
                speed: VOICE_SPEED,
            },
        }
    }

    async fn request_speech(&self, text: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/v1/text-to-speech/{}/stream",
            self.base_url, self.voice_id
        );
        let payload = Self::build_payload(text);

        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let response = self
                .client
                .post(&url)
                .header("xi-api-key", &self.api_key)
                .header("Accept", "audio/mpeg")
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    QuizcastError::generation(
                        GenerationErrorKind::Network,
                        format!("ElevenLabs request failed: {e}"),
                    )
                })?;

            let status = response.status();

            if status.is_success() {
                let bytes = response.bytes().await.map_err(|e| {
                    QuizcastError::generation(
                        GenerationErrorKind::Network,
                        format!("ElevenLabs audio stream interrupted: {e}"),
                    )
                })?;
                if bytes.is_empty() {
                    return Err(QuizcastError::generation(
                        GenerationErrorKind::MalformedResponse,
                        "ElevenLabs returned an empty audio body",
                    ));
                }
                return Ok(bytes.to_vec());
            }

            match status.as_u16() {
                429 if attempt < MAX_RATE_LIMIT_RETRIES => {
                    warn!(
                        "ElevenLabs rate limit hit, waiting {}s before retry {}/{}",
                        RATE_LIMIT_WAIT_SECS,
                        attempt + 1,
                        MAX_RATE_LIMIT_RETRIES
                    );
                    tokio::time::sleep(Duration::from_secs(RATE_LIMIT_WAIT_SECS)).await;
                }
                429 => {
                    return Err(QuizcastError::generation(
                        GenerationErrorKind::RateLimited,
                        "ElevenLabs rate limit persisted through retries",
                    ));
                }
                401 => {
                    return Err(QuizcastError::generation(
                        GenerationErrorKind::Auth,
                        "ElevenLabs rejected the API key (401). Check ELEVENLABS_API_KEY.",
                    ));
                }
                404 => {
                    return Err(QuizcastError::generation(
                        GenerationErrorKind::Auth,
                        format!("ElevenLabs voice '{}' not found (404)", self.voice_id),
                    ));
                }
                _ => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(QuizcastError::generation(
                        GenerationErrorKind::Network,
                        format!("ElevenLabs TTS error ({status}): {body}"),
                    ));
                }
            }
        }

        unreachable!("retry loop always returns")
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        // Pacing before every line, not only on retry.
        tokio::time::sleep(Duration::from_millis(PACING_DELAY_MS)).await;
        let bytes = self.request_speech(text).await?;
        debug!("Synthesized {} bytes for \"{}\"", bytes.len(), text);
        Ok(bytes)
    }

    async fn remaining_credits(&self) -> String {
        let url = format!("{}/v1/user", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .send()
            .await;

        let user: UserResponse = match response {
            Ok(resp) if resp.status().is_success() => match resp.json().await {
                Ok(user) => user,
                Err(e) => {
                    warn!("Could not parse ElevenLabs user response: {}", e);
                    return "Créditos não puderam ser verificados.".to_string();
                }
            },
            Ok(resp) => {
                warn!("ElevenLabs user endpoint returned {}", resp.status());
                return "Créditos não puderam ser verificados.".to_string();
            }
            Err(e) => {
                warn!("Could not fetch ElevenLabs credits: {}", e);
                return "Créditos não puderam ser verificados.".to_string();
            }
        };

        let remaining = user
            .subscription
            .character_limit
            .saturating_sub(user.subscription.character_count);
        format!("{} caracteres restantes", format_thousands(remaining))
    }

    fn name(&self) -> &'static str {
        "ElevenLabs"
    }
}

/// pt-BR thousands grouping (1.234.567).
fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

// Request/Response types

#[derive(Serialize)]
struct TtsRequest {
    text: String,
    model_id: String,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    speed: f32,
}

#[derive(Deserialize)]
struct UserResponse {
    subscription: Subscription,
}

#[derive(Deserialize)]
struct Subscription {
    character_count: u64,
    character_limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let payload = ElevenLabsClient::build_payload("Olá!");
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["text"], "Olá!");
        assert_eq!(json["model_id"], "eleven_multilingual_v2");
        assert_eq!(json["voice_settings"]["stability"], 0.5);
        assert_eq!(json["voice_settings"]["similarity_boost"], 0.75);
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1_000), "1.000");
        assert_eq!(format_thousands(1_234_567), "1.234.567");
    }

    #[test]
    fn test_subscription_parsing() {
        let json = r#"{"subscription":{"character_count":3500,"character_limit":10000}}"#;
        let user: UserResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            user.subscription.character_limit - user.subscription.character_count,
            6500
        );
    }

    #[test]
    fn test_default_voice() {
        let client = ElevenLabsClient::new("xi-test".to_string());
        assert_eq!(client.voice_id, DEFAULT_VOICE_ID);

        let client = client.with_voice("custom".to_string());
        assert_eq!(client.voice_id, "custom");
    }
}
