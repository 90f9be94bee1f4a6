use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use stratus_core::config::{LlmConfig, ReasonerProvider};
use stratus_core::{Capability, ConversationContext};
use tracing::{debug, info};

use crate::reasoning::{Classification, Intent, ReasoningEngine, ReasoningError};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const HISTORY_TURNS_IN_PROMPT: usize = 6;

const ROUTING_INSTRUCTIONS: &str = "\
You route messages for the Multi-Agent Weather Bot, a friendly weather assistant.
Classify the user's latest message into exactly one intent:
- \"greet\": the user says hi, hello or similar and asks nothing else.
- \"current_weather\": the user asks about weather right now (e.g. \"What's the weather in London?\").
- \"forecast\": the user asks about future weather (e.g. \"Forecast for Paris\", \"Will it rain tomorrow?\").
- \"unclear\": anything else, or a request you cannot map to a listed capability.
Resolve follow-ups such as \"what about Berlin?\" using the conversation so far.
When the message names no city, use the last city discussed if one is given.
Set \"city\" to the city the user means, or null when no city can be determined.
Answer with a single JSON object: {\"intent\": \"...\", \"city\": \"...\" or null}.";

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ReasoningError>;
}

/// Client for any `/v1/chat/completions` endpoint (OpenAI, Ollama).
pub struct OpenAiCompatibleClient {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ReasoningError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ReasoningError::Request(error.to_string()))?;
        let endpoint = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));

        Ok(Self { http, endpoint, api_key, model: model.into() })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ReasoningError> {
        let base_url = match (config.provider, config.base_url.as_deref()) {
            (_, Some(base_url)) => base_url,
            (ReasonerProvider::OpenAi, None) => OPENAI_BASE_URL,
            (provider, None) => {
                return Err(ReasoningError::Request(format!(
                    "no base url configured for llm provider {provider:?}"
                )))
            }
        };

        Self::new(
            base_url,
            config.api_key.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ReasoningError> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
        });

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReasoningError::Request(format!("llm endpoint returned status {status}")));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|error| ReasoningError::InvalidResponse(error.without_url().to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ReasoningError::InvalidResponse("completion has no content".to_string()))
    }
}

fn map_transport_error(error: reqwest::Error) -> ReasoningError {
    if error.is_timeout() {
        ReasoningError::Timeout
    } else {
        ReasoningError::Request(error.without_url().to_string())
    }
}

/// Reasoning engine backed by a chat-completion model answering in JSON mode.
pub struct LlmReasoner<C = OpenAiCompatibleClient> {
    client: C,
}

impl<C> LlmReasoner<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> ReasoningEngine for LlmReasoner<C>
where
    C: LlmClient,
{
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn classify(
        &self,
        context: ConversationContext<'_>,
        message: &str,
        capabilities: &[Capability],
    ) -> Result<Classification, ReasoningError> {
        let prompt = build_prompt(context, message, capabilities);

        info!(
            event_name = "agent.llm.request",
            history_turns = context.history.len(),
            "calling model"
        );
        let raw = self.client.complete(ROUTING_INSTRUCTIONS, &prompt).await?;
        info!(event_name = "agent.llm.response", response_len = raw.len(), "model responded");

        let mut classification = parse_classification(&raw, capabilities)?;
        if classification.city.is_none() && classification.intent.capability().is_some() {
            classification.city = context.last_city.map(str::to_string);
        }
        Ok(classification)
    }
}

fn build_prompt(
    context: ConversationContext<'_>,
    message: &str,
    capabilities: &[Capability],
) -> String {
    let history = context.history;
    let mut prompt = String::from("Capabilities:\n");
    for capability in capabilities {
        prompt.push_str(&format!("- {}: {}\n", capability.as_str(), capability.description()));
    }

    let recent = &history[history.len().saturating_sub(HISTORY_TURNS_IN_PROMPT)..];
    if !recent.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        for turn in recent {
            prompt.push_str(&format!("User: {}\nAssistant: {}\n", turn.user, turn.reply));
        }
    }

    if let Some(city) = context.last_city {
        prompt.push_str(&format!("\nLast city discussed: {city}\n"));
    }
    if let Some(capability) = context.last_capability {
        prompt.push_str(&format!("Last capability used: {}\n", capability.as_str()));
    }

    prompt.push_str(&format!("\nLatest message: {message}\n"));
    prompt
}

#[derive(Deserialize)]
struct RawClassification {
    intent: String,
    #[serde(default)]
    city: Option<String>,
}

pub(crate) fn parse_classification(
    raw: &str,
    capabilities: &[Capability],
) -> Result<Classification, ReasoningError> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let json_text = match (start, end) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => return Err(ReasoningError::InvalidResponse("no json object in answer".to_string())),
    };

    let parsed: RawClassification = serde_json::from_str(json_text)
        .map_err(|error| ReasoningError::InvalidResponse(error.to_string()))?;

    let intent = match parsed.intent.trim().to_ascii_lowercase().as_str() {
        "greet" | "greeting" => Intent::Greet,
        "current_weather" | "weather" | "current" => Intent::CurrentWeather,
        "forecast" => Intent::Forecast,
        "unclear" | "clarify" => Intent::Unclear,
        other => {
            return Err(ReasoningError::InvalidResponse(format!("unknown intent `{other}`")));
        }
    };

    if let Some(capability) = intent.capability() {
        if !capabilities.contains(&capability) {
            debug!(
                event_name = "agent.llm.unavailable_capability",
                capability = %capability,
                "model chose a capability that is not offered"
            );
            return Ok(Classification::unclear());
        }
    }

    let city = parsed.city.map(|city| city.trim().to_string()).filter(|city| !city.is_empty());
    Ok(Classification::new(intent, city))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use stratus_core::{Capability, ConversationContext, Turn};

    use super::{build_prompt, parse_classification, LlmClient, LlmReasoner};
    use crate::reasoning::{Classification, Intent, ReasoningEngine, ReasoningError};

    struct CannedClient {
        answer: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String, ReasoningError> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            Ok(self.answer.clone())
        }
    }

    #[test]
    fn parses_plain_and_fenced_json() {
        let plain = parse_classification(r#"{"intent":"forecast","city":"Paris"}"#, &Capability::ALL);
        assert_eq!(plain, Ok(Classification::new(Intent::Forecast, Some("Paris".to_string()))));

        let fenced = parse_classification(
            "```json\n{\"intent\": \"current_weather\", \"city\": \" London \"}\n```",
            &Capability::ALL,
        );
        assert_eq!(fenced, Ok(Classification::new(Intent::CurrentWeather, Some("London".to_string()))));
    }

    #[test]
    fn null_or_blank_city_becomes_none() {
        let parsed = parse_classification(r#"{"intent":"forecast","city":null}"#, &Capability::ALL);
        assert_eq!(parsed, Ok(Classification::new(Intent::Forecast, None)));

        let blank = parse_classification(r#"{"intent":"greet","city":""}"#, &Capability::ALL);
        assert_eq!(blank, Ok(Classification::new(Intent::Greet, None)));
    }

    #[test]
    fn unknown_intent_or_prose_is_invalid() {
        assert!(matches!(
            parse_classification(r#"{"intent":"book_flight"}"#, &Capability::ALL),
            Err(ReasoningError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_classification("It looks like weather in London.", &Capability::ALL),
            Err(ReasoningError::InvalidResponse(_))
        ));
    }

    #[test]
    fn capability_outside_offer_is_unclear() {
        let parsed =
            parse_classification(r#"{"intent":"forecast","city":"Oslo"}"#, &[Capability::CurrentWeather]);
        assert_eq!(parsed, Ok(Classification::unclear()));
    }

    #[test]
    fn prompt_lists_capabilities_and_recent_history() {
        let history: Vec<Turn> = (0..10)
            .map(|index| Turn {
                user: format!("question {index}"),
                reply: format!("answer {index}"),
                capability: None,
            })
            .collect();

        let context = ConversationContext { history: &history, ..ConversationContext::default() };
        let prompt = build_prompt(context, "what about Rome?", &Capability::ALL);

        assert!(prompt.contains("- current_weather:"));
        assert!(prompt.contains("- forecast:"));
        assert!(!prompt.contains("question 3"));
        assert!(prompt.contains("question 4"));
        assert!(!prompt.contains("Last city discussed"));
        assert!(prompt.ends_with("Latest message: what about Rome?\n"));
    }

    fn reasoner_answering(answer: &str) -> LlmReasoner<CannedClient> {
        LlmReasoner::new(CannedClient { answer: answer.to_string(), prompts: Mutex::new(Vec::new()) })
    }

    #[tokio::test]
    async fn reasoner_parses_client_answer() {
        let reasoner = reasoner_answering(r#"{"intent":"current_weather","city":"Tokyo"}"#);

        let classification = reasoner
            .classify(ConversationContext::default(), "how warm is Tokyo", &Capability::ALL)
            .await
            .expect("classification");

        assert_eq!(classification, Classification::new(Intent::CurrentWeather, Some("Tokyo".to_string())));
        let prompts = reasoner.client.prompts.lock().map(|prompts| prompts.len()).unwrap_or(0);
        assert_eq!(prompts, 1);
    }

    #[tokio::test]
    async fn last_city_is_offered_to_the_model_and_fills_a_missing_city() {
        let reasoner = reasoner_answering(r#"{"intent":"current_weather","city":null}"#);
        let history = vec![
            Turn {
                user: "Will it rain tomorrow?".to_string(),
                reply: "Which city?".to_string(),
                capability: None,
            },
            Turn {
                user: "Paris".to_string(),
                reply: "Light rain expected.".to_string(),
                capability: Some(Capability::Forecast),
            },
        ];
        let context = ConversationContext {
            history: &history,
            last_capability: Some(Capability::Forecast),
            last_city: Some("Paris"),
        };

        let classification = reasoner
            .classify(context, "and the current weather?", &Capability::ALL)
            .await
            .expect("classification");

        assert_eq!(
            classification,
            Classification::new(Intent::CurrentWeather, Some("Paris".to_string()))
        );
        let prompts = reasoner.client.prompts.lock().map(|prompts| prompts.clone()).unwrap_or_default();
        assert!(prompts[0].contains("Last city discussed: Paris"));
        assert!(prompts[0].contains("Last capability used: forecast"));
    }

    #[tokio::test]
    async fn greeting_never_inherits_last_city() {
        let reasoner = reasoner_answering(r#"{"intent":"greet","city":null}"#);
        let context = ConversationContext { last_city: Some("Oslo"), ..ConversationContext::default() };

        let classification =
            reasoner.classify(context, "hello again", &Capability::ALL).await.expect("classification");

        assert_eq!(classification, Classification::new(Intent::Greet, None));
    }
}
