use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::content::{Quiz, QuizGenerator, QuizItem};
use crate::error::{GenerationErrorKind, QuizcastError, Result};

/// Gemini API base URL (overridable for tests).
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used for quiz generation.
const GEMINI_MODEL: &str = "gemini-2.5-flash-preview-09-2025";

/// Maximum retries for server-side failures.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 1000;

/// Google Gemini quiz generation client.
///
/// Asks for a strict JSON array of quiz items via `responseSchema`, so the
/// model cannot drift into markdown or prose.
pub struct GeminiQuizClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiQuizClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (used by mock-server tests).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn system_prompt() -> &'static str {
        "Você é o \"Tio do Quiz\", um especialista em criar quizzes divertidos e \
         desafiadores em português do Brasil. Responda estritamente no formato JSON \
         especificado. Não inclua markdown ou qualquer texto fora do objeto JSON."
    }

    fn user_query(config: &GenerationConfig) -> String {
        format!(
            "Crie um quiz de nível de dificuldade \"{}\" sobre o tema \"{}\" com \
             exatamente {} perguntas. As perguntas devem ser curtas e objetivas. \
             Cada pergunta deve ter exatamente {} alternativas.",
            config.difficulty.label(),
            config.theme,
            config.num_questions,
            config.num_answers
        )
    }

    /// JSON response schema: an array of {question, answers[], correctIndex}.
    fn response_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "ARRAY",
            "items": {
                "type": "OBJECT",
                "properties": {
                    "question": { "type": "STRING" },
                    "answers": {
                        "type": "ARRAY",
                        "items": {
                            "type": "OBJECT",
                            "properties": { "text": { "type": "STRING" } }
                        }
                    },
                    "correctIndex": { "type": "NUMBER" }
                },
                "required": ["question", "answers", "correctIndex"]
            }
        })
    }

    fn build_request(config: &GenerationConfig) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: Content {
                parts: vec![Part {
                    text: Self::system_prompt().to_string(),
                }],
            },
            contents: vec![Content {
                parts: vec![Part {
                    text: Self::user_query(config),
                }],
            }],
            generation_config: RequestGenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: Self::response_schema(),
            },
        }
    }

    async fn call_generate_content(&self, request: &GenerateContentRequest) -> Result<Quiz> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, GEMINI_MODEL, self.api_key
        );

        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("Retry attempt {} after {}ms delay", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let response = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(request)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    debug!("Gemini API response status: {}", status);

                    if status.is_success() {
                        let body: GenerateContentResponse = resp.json().await.map_err(|e| {
                            QuizcastError::generation(
                                GenerationErrorKind::MalformedResponse,
                                format!("Gemini response was not valid JSON: {e}"),
                            )
                        })?;
                        return Self::parse_response(body);
                    }

                    let error_body = resp.text().await.unwrap_or_default();

                    // Client errors are not retried: 429 means quota, the
                    // rest means a bad key or a rejected request.
                    if status.as_u16() == 429 {
                        return Err(QuizcastError::generation(
                            GenerationErrorKind::RateLimited,
                            format!("Gemini API rate limit: {error_body}"),
                        ));
                    }
                    if status.is_client_error() {
                        return Err(QuizcastError::generation(
                            GenerationErrorKind::Auth,
                            format!(
                                "Gemini API rejected the request ({status}). \
                                 Check your GEMINI_API_KEY. {error_body}"
                            ),
                        ));
                    }

                    warn!("Gemini API server error ({}): {}", status, error_body);
                    last_error = Some(QuizcastError::generation(
                        GenerationErrorKind::Network,
                        format!("Gemini API server error: {status}"),
                    ));
                }
                Err(e) => {
                    warn!("Gemini API request failed: {}", e);
                    last_error = Some(QuizcastError::generation(
                        GenerationErrorKind::Network,
                        format!("Gemini API request failed: {e}"),
                    ));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            QuizcastError::generation(GenerationErrorKind::Network, "Gemini API unreachable")
        }))
    }

    fn parse_response(response: GenerateContentResponse) -> Result<Quiz> {
        let text = response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| {
                QuizcastError::generation(
                    GenerationErrorKind::MalformedResponse,
                    "Gemini response contained no candidates",
                )
            })?;

        debug!("Gemini raw response text: {}", &text[..text.len().min(500)]);

        let items: Vec<QuizItem> = serde_json::from_str(text).map_err(|e| {
            QuizcastError::generation(
                GenerationErrorKind::MalformedResponse,
                format!("Gemini quiz payload did not match the schema: {e}"),
            )
        })?;

        Ok(Quiz { items })
    }
}

#[async_trait]
impl QuizGenerator for GeminiQuizClient {
    async fn generate(&self, config: &GenerationConfig) -> Result<Quiz> {
        let request = Self::build_request(config);
        let quiz = self.call_generate_content(&request).await?;
        debug!("Gemini returned {} quiz items", quiz.len());
        Ok(quiz)
    }

    fn name(&self) -> &'static str {
        "Google Gemini"
    }
}

// Request/Response types

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: RequestGenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestGenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Difficulty;

    fn test_config() -> GenerationConfig {
        GenerationConfig {
            theme: "Anos 80".to_string(),
            num_questions: 3,
            num_answers: 4,
            difficulty: Difficulty::Medium,
        }
    }

    fn wrap_in_candidate(text: &str) -> GenerateContentResponse {
        serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }] }
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_user_query_names_all_parameters() {
        let query = GeminiQuizClient::user_query(&test_config());
        assert!(query.contains("Anos 80"));
        assert!(query.contains("Médio"));
        assert!(query.contains("3 perguntas"));
        assert!(query.contains("4 alternativas"));
    }

    #[test]
    fn test_request_serializes_schema() {
        let request = GeminiQuizClient::build_request(&test_config());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(
            json["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(json["generationConfig"]["responseSchema"]["type"], "ARRAY");
        assert!(json["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Tio do Quiz"));
    }

    #[test]
    fn test_parse_response_valid() {
        let payload = r#"[{"question":"Capital do Brasil?","answers":[{"text":"Rio"},{"text":"Brasília"}],"correctIndex":1}]"#;
        let quiz = GeminiQuizClient::parse_response(wrap_in_candidate(payload)).unwrap();

        assert_eq!(quiz.len(), 1);
        assert_eq!(quiz.items[0].correct_index, 1);
        assert_eq!(quiz.items[0].answers[1].text, "Brasília");
    }

    #[test]
    fn test_parse_response_no_candidates() {
        let response: GenerateContentResponse =
            serde_json::from_value(serde_json::json!({ "candidates": [] })).unwrap();

        let err = GeminiQuizClient::parse_response(response).unwrap_err();
        match err {
            QuizcastError::ContentGeneration { kind, .. } => {
                assert_eq!(kind, GenerationErrorKind::MalformedResponse);
            }
            other => panic!("Expected ContentGeneration, got: {other}"),
        }
    }

    #[test]
    fn test_parse_response_not_schema_shaped() {
        let err =
            GeminiQuizClient::parse_response(wrap_in_candidate("Here is your quiz!")).unwrap_err();
        match err {
            QuizcastError::ContentGeneration { kind, .. } => {
                assert_eq!(kind, GenerationErrorKind::MalformedResponse);
            }
            other => panic!("Expected ContentGeneration, got: {other}"),
        }
    }
}
