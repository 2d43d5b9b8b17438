//! Vision planner - asks an OpenAI-compatible model what to type next
//!
//! The model sees a screenshot URL and answers with a JSON game plan; only the
//! `input` of each step is used, in order.

use crate::config::VisionConfig;
use crate::typing::Word;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("vision request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("vision API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("vision response has no message content")]
    NoContent,
    #[error("no JSON object in model reply")]
    NoJson,
    #[error("malformed game plan: {0}")]
    Json(#[from] serde_json::Error),
}

/// Turns a published screenshot into the words to type
pub trait Planner: Send + Sync {
    fn plan(&self, image_url: &str) -> Result<Vec<Word>, PlanError>;
}

const SYSTEM_PROMPT: &str = r#"You are an assistant playing the typing game "The Chef's Shift".

Rules:
1. The game is played entirely by typing words: starting, cooking, serving, taking orders and collecting payment. Words contain letters and special characters.
2. Game flow is controlled with words such as start, retry and done.
3. The word to type has nothing to do with the food or action; only the word shown on screen matters.
4. Only highlighted words can be typed: white text on a dark brown background. Grey words cannot be typed.
5. Every dish has fixed preparation steps.
6. The player controls the chef: white uniform, chef's hat, red apron.
7. Screen layout:
   * Top left: dishes that are ready, each with a number below it.
   * Two tables on the right, one table in the middle.
   * Under the window, upper left: three desserts, made by typing their word.
   * Lower middle: coffee machine making two kinds of coffee, with the counts shown beside it.
   * Middle left, between oven and coffee machine: the cash register.
   * Bottom: noodle station, ingredients on the left, pot on the right. Pick up the noodles, then put them in the pot.
   * Bottom left: fryer station for two fried dishes. Pick up the ingredient, put it in the fryer, take it out when done.
   * Left edge: pizza station. Add ingredients bottom to top, put the pizza in the oven above, take it out when baked.
8. Seated customers: a food picture above the table means the order must be cooked first. When the food is ready a highlighted word appears above the table; typing it serves the order. The customer then walks to the register with a banknote icon overhead; type the register word to take payment.
9. Customers at the register: same flow, with the picture and then the highlighted word above the customer's head, then the banknote icon and the register word.
10. The register word is always highlighted, but type it only when a customer shows the banknote icon.
11. A mouse on the red carpet is removed by typing the two-letter word above it.
12. Without a mouse, serve orders whose food is ready first, then the others.
13. With a mouse on screen, remove it first.
14. If the first letters of a highlighted word are yellow, the word was left half typed; finish it.

Analyse the screenshot, work out the open orders and the next steps, and reply with JSON only:
{
    "description": "everything visible on screen",
    "words": ["toe", "body", "page", "week", "use", "cow"],
    "cash": "use",
    "mouse": false,
    "order": "pizza",
    "steps": [
        {"action": "pick up pizza dough", "input": "week", "note": "pizza starts with the dough"}
    ]
}
Every step input must be one of the highlighted words."#;

const USER_PROMPT: &str =
    "Analyse this screenshot, tell me the state of the orders and give the concrete steps.";

#[derive(Debug, Deserialize)]
struct GamePlan {
    #[serde(default)]
    description: String,
    #[serde(default)]
    words: Vec<String>,
    #[serde(default)]
    steps: Vec<PlanStep>,
}

#[derive(Debug, Deserialize)]
struct PlanStep {
    #[serde(default)]
    action: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Slice from the first `{` to the last `}`, tolerating prose or code fences around it.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Words to type, in step order, from a raw model reply.
pub fn parse_plan(reply: &str) -> Result<Vec<Word>, PlanError> {
    let json = extract_json(reply).ok_or(PlanError::NoJson)?;
    let plan: GamePlan = serde_json::from_str(json)?;

    tracing::debug!(
        description = %plan.description,
        highlighted = ?plan.words,
        steps = plan.steps.len(),
        "game plan"
    );

    Ok(plan
        .steps
        .iter()
        .filter_map(|step| {
            let word = Word::new(&step.input);
            if word.is_none() {
                tracing::debug!(action = %step.action, "step without input");
            }
            word
        })
        .collect())
}

/// OpenAI-compatible chat completion client with image input
pub struct VisionPlanner {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl VisionPlanner {
    pub fn new(config: &VisionConfig) -> Result<Self, PlanError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn request_body(&self, image_url: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [
                {
                    "role": "system",
                    "content": SYSTEM_PROMPT
                },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": USER_PROMPT },
                        { "type": "image_url", "image_url": { "url": image_url } }
                    ]
                }
            ]
        })
    }
}

impl Planner for VisionPlanner {
    fn plan(&self, image_url: &str) -> Result<Vec<Word>, PlanError> {
        tracing::debug!(url = image_url, model = %self.model, "requesting plan");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(image_url))
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(PlanError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let response: ChatResponse = serde_json::from_str(&body)?;
        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(PlanError::NoContent)?;

        tracing::debug!(reply = %reply, "model reply");
        parse_plan(&reply)
    }
}
