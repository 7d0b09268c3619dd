//! HTTP vision provider for OpenAI-compatible chat completion APIs.

use crate::analysis::{
    ConfidenceAssessment, ElementSource, ElementType, InteractionStrategy, ScreenElement,
    SemanticAnalysis, SemanticContext, TaskContext,
};
use crate::capability::{CapabilityError, CapabilityResult};
use crate::capture::{Region, Screenshot};
use crate::provider::SemanticProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.1
}

/// Settings for one HTTP provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpProviderSettings {
    /// Name used for ranking and metrics
    pub name: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl HttpProviderSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Vision provider that calls a chat completion endpoint with an image.
pub struct HttpVisionProvider {
    client: reqwest::Client,
    api_key: String,
    settings: HttpProviderSettings,
}

impl HttpVisionProvider {
    /// Create a provider; `Unavailable` when the API key is not set.
    pub fn new(settings: HttpProviderSettings) -> CapabilityResult<Self> {
        let api_key = std::env::var(&settings.api_key_env).map_err(|_| {
            CapabilityError::Unavailable(format!("{} is not set", settings.api_key_env))
        })?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            settings,
        })
    }

    async fn call_api(&self, messages: Vec<Value>) -> CapabilityResult<String> {
        let body = serde_json::json!({
            "model": self.settings.model,
            "messages": messages,
            "max_tokens": self.settings.max_tokens,
            "temperature": self.settings.temperature,
        });

        let response = self
            .client
            .post(&self.settings.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;

        if response.status() == 429 {
            return Err(CapabilityError::Failed("API rate limit exceeded".to_string()));
        }

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CapabilityError::Failed(error_text));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| CapabilityError::Failed("Missing content in response".to_string()))
    }
}

#[async_trait]
impl SemanticProvider for HttpVisionProvider {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn analyze_semantically(
        &self,
        screenshot: &Screenshot,
        context: &TaskContext,
    ) -> CapabilityResult<SemanticAnalysis> {
        let messages = vec![serde_json::json!({
            "role": "user",
            "content": [
                {"type": "text", "text": analysis_prompt(&context.task)},
                {"type": "image_url", "image_url": {"url": screenshot.to_data_url(), "detail": "high"}}
            ]
        })];

        let response = self.call_api(messages).await?;
        parse_semantic_response(&self.settings.name, &response)
    }
}

/// Prompt asking for the semantic JSON structure.
pub fn analysis_prompt(task: &str) -> String {
    format!(
        r#"Analyze this interface screenshot for the task: "{task}"

Respond with JSON only, using this structure:
{{
    "interface_type": "app name or interface type",
    "ui_elements": [
        {{
            "id": "unique_element_id",
            "type": "button|input|text|image|icon|menu|link|checkbox|switch|tab|list",
            "purpose": "what this element does",
            "text": "visible text if any",
            "coordinates": {{"x": 0, "y": 0, "width": 0, "height": 0}},
            "interaction_method": "tap|click|type|swipe|long_press",
            "semantic_role": "primary_action|navigation|content|input",
            "confidence": 0.0
        }}
    ],
    "semantic_context": {{
        "app_state": "current state",
        "user_flow_position": "where the user is in the workflow",
        "available_actions": [],
        "primary_goal_elements": []
    }},
    "interaction_strategy": {{
        "recommended_approach": "best way to accomplish the task",
        "step_by_step": [],
        "alternative_paths": [],
        "risk_factors": [],
        "success_indicators": []
    }},
    "confidence_assessment": {{
        "overall_confidence": 0.0,
        "element_detection_confidence": 0.0,
        "task_completion_probability": 0.0,
        "complexity_level": "simple|medium|complex|very_complex"
    }}
}}"#
    )
}

/// Pull the outermost JSON object out of a model response.
fn extract_json(response: &str) -> CapabilityResult<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(response) {
        return Ok(value);
    }
    let start = response.find('{');
    let end = response.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if end > start => serde_json::from_str(&response[start..=end])
            .map_err(|e| CapabilityError::Failed(format!("Invalid JSON in response: {}", e))),
        _ => Err(CapabilityError::Failed("No JSON found in response".to_string())),
    }
}

fn parse_element(index: usize, provider: &str, e: &Value) -> ScreenElement {
    let coords = &e["coordinates"];
    let bounds = Region::new(
        coords["x"].as_i64().unwrap_or(0) as i32,
        coords["y"].as_i64().unwrap_or(0) as i32,
        coords["width"].as_u64().unwrap_or(0) as u32,
        coords["height"].as_u64().unwrap_or(0) as u32,
    );

    ScreenElement {
        id: e["id"]
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("elem_{}", index)),
        element_type: ElementType::from_label(e["type"].as_str().unwrap_or("unknown")),
        purpose: e["purpose"].as_str().filter(|s| !s.is_empty()).map(|s| s.to_string()),
        bounds,
        text: e["text"].as_str().filter(|s| !s.is_empty()).map(|s| s.to_string()),
        confidence: e["confidence"].as_f64().unwrap_or(0.8),
        interaction_method: Some(e["interaction_method"].as_str().unwrap_or("tap").to_string()),
        semantic_role: Some(e["semantic_role"].as_str().unwrap_or("unknown").to_string()),
        source: ElementSource::AiSemantic,
        detector: Some(provider.to_string()),
        merge_count: 0,
    }
}

/// Parse a provider response into a semantic analysis.
///
/// Prose around the JSON is tolerated. Missing fields take defaults:
/// element confidence 0.8, interaction `tap`, role `unknown`, overall 0.8.
pub fn parse_semantic_response(provider: &str, response: &str) -> CapabilityResult<SemanticAnalysis> {
    let parsed = extract_json(response)?;

    let elements = parsed["ui_elements"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .enumerate()
                .map(|(i, e)| parse_element(i, provider, e))
                .collect()
        })
        .unwrap_or_default();

    let mut semantic_context: SemanticContext =
        serde_json::from_value(parsed["semantic_context"].clone()).unwrap_or_default();
    if semantic_context.interface_type.is_none() {
        semantic_context.interface_type = parsed["interface_type"].as_str().map(|s| s.to_string());
    }

    let interaction_strategy: Option<InteractionStrategy> = parsed
        .get("interaction_strategy")
        .and_then(|v| serde_json::from_value(v.clone()).ok());
    let confidence_assessment: Option<ConfidenceAssessment> = parsed
        .get("confidence_assessment")
        .and_then(|v| serde_json::from_value(v.clone()).ok());

    let confidence = confidence_assessment
        .as_ref()
        .and_then(|c| c.overall_confidence)
        .unwrap_or(0.8);

    Ok(SemanticAnalysis {
        provider: provider.to_string(),
        elements,
        semantic_context,
        interaction_strategy,
        confidence_assessment,
        confidence,
        processing_time_secs: 0.0,
    })
}
