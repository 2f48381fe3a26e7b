//! Adapter for OpenAI-compatible chat completion endpoints.
//!
//! One adapter covers every backend speaking the `/chat/completions` wire
//! shape: OpenAI itself, Ollama, and the various relay proxies. Pool
//! entries are separate instances of this adapter pointed at different
//! base URLs and models.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{
    ChatProvider, Completion, CompletionRequest, Message, ProviderError, ProviderFuture, Role,
    SecretString, TokenUsage,
};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

pub struct OpenAiCompatProvider {
    label: String,
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

impl OpenAiCompatProvider {
    pub fn new(
        client: Client,
        label: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
        }
    }

    pub fn openai(client: Client, model: impl Into<String>, api_key: SecretString) -> Self {
        let model = model.into();
        Self::new(client, format!("openai:{model}"), OPENAI_BASE_URL, model)
            .with_api_key(api_key)
    }

    pub fn ollama(client: Client, model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(client, format!("ollama:{model}"), OLLAMA_BASE_URL, model)
    }

    pub fn with_api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: &CompletionRequest) -> WireRequest {
        WireRequest {
            model: self.model.clone(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        }
    }
}

impl ChatProvider for OpenAiCompatProvider {
    fn label(&self) -> &str {
        &self.label
    }

    fn complete<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> ProviderFuture<'a, Result<Completion, ProviderError>> {
        Box::pin(async move {
            request.validate()?;

            let mut http_request = self.client.post(self.endpoint()).json(&self.build_body(&request));
            if let Some(api_key) = &self.api_key {
                http_request = http_request.bearer_auth(api_key.expose());
            }

            let response = http_request.send().await.map_err(classify_reqwest_error)?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status(status, &body));
            }

            let parsed = response
                .json::<WireResponse>()
                .await
                .map_err(|err| ProviderError::transport(err.to_string()))?;

            let text = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .unwrap_or_default();

            let usage = parsed.usage.map(TokenUsage::from).unwrap_or_default();

            Ok(Completion {
                provider: self.label.clone(),
                text,
                usage,
            })
        })
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::timeout(error.to_string())
    } else {
        ProviderError::transport(error.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let detail = format!("http {status}: {}", truncate(body, 512));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::authentication(detail),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(detail),
        status if status.is_server_error() => ProviderError::unavailable(detail),
        _ => ProviderError::transport(detail),
    }
}

fn truncate(input: &str, max: usize) -> String {
    if input.len() <= max {
        return input.to_string();
    }

    let mut end = max;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    let mut output = input[..end].to_string();
    output.push_str("...");
    output
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };

        Self {
            role,
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_strips_trailing_slashes() {
        let provider = OpenAiCompatProvider::new(
            Client::new(),
            "test",
            "http://localhost:8080/v1/",
            "test-model",
        );
        assert_eq!(provider.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn request_body_serializes_roles_and_options() {
        let provider = OpenAiCompatProvider::ollama(Client::new(), "llama3.2");
        let request = CompletionRequest::new(vec![
            Message::new(Role::System, "be brief"),
            Message::new(Role::User, "hi"),
        ])
        .with_temperature(0.7);

        let body = provider.build_body(&request);
        let json = serde_json::to_value(&body).expect("body should serialize");

        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        let temperature = json["temperature"].as_f64().expect("temperature present");
        assert!((temperature - 0.7).abs() < 1e-6);
        assert_eq!(json["stream"], false);
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn wire_response_tolerates_missing_usage() {
        let parsed: WireResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"hello there"}}]}"#,
        )
        .expect("response should parse");

        assert_eq!(parsed.choices.len(), 1);
        assert!(parsed.usage.is_none());
    }

    #[test]
    fn preset_labels_include_the_model() {
        let provider = OpenAiCompatProvider::openai(
            Client::new(),
            "gpt-4o-mini",
            SecretString::new("sk-test"),
        );
        assert_eq!(provider.label(), "openai:gpt-4o-mini");
    }
}
