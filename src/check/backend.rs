//! AI backend boundary: one request in, either a tool call or a final
//! answer out. The production backend speaks the Anthropic Messages API;
//! the scripted one drives tests and local runs without a key.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

pub const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_MODEL: &str = "WATCHDOG_MODEL";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const WEB_SEARCH_TOOL: &str = "web_search";

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

/// One content block of a conversation turn, matching the wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: "assistant".into(),
            content,
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
            }],
        }
    }
}

/// What the executor does next with a backend response.
#[derive(Debug, Clone)]
pub enum BackendReply {
    /// The model wants one web search before answering.
    ToolUse { id: String, query: String },
    /// The model's final text answer.
    Final(String),
}

/// A full backend turn: the raw assistant blocks (appended to the
/// transcript) plus their classification.
#[derive(Debug, Clone)]
pub struct BackendTurn {
    pub blocks: Vec<ContentBlock>,
    pub reply: BackendReply,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn complete(&self, system: &str, messages: &[Message]) -> Result<BackendTurn>;
    fn name(&self) -> &'static str;
}

fn classify(blocks: Vec<ContentBlock>) -> BackendTurn {
    let tool_call = blocks.iter().find_map(|block| match block {
        ContentBlock::ToolUse { id, name, input } if name == WEB_SEARCH_TOOL => {
            let query = input
                .get("query")
                .and_then(|q| q.as_str())
                .unwrap_or_default()
                .to_string();
            Some((id.clone(), query))
        }
        _ => None,
    });
    if let Some((id, query)) = tool_call {
        return BackendTurn {
            reply: BackendReply::ToolUse { id, query },
            blocks,
        };
    }
    let text = blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    BackendTurn {
        reply: BackendReply::Final(text),
        blocks,
    }
}

/// Anthropic Messages API backend. Requires `ANTHROPIC_API_KEY`.
pub struct AnthropicBackend {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicBackend {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(ENV_API_KEY)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("{ENV_API_KEY} not set"))?;
        let model = std::env::var(ENV_MODEL).unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let http = reqwest::Client::builder()
            .user_agent("watchdog-agent/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client");
        Ok(Self {
            http,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    async fn complete(&self, system: &str, messages: &[Message]) -> Result<BackendTurn> {
        #[derive(Serialize)]
        struct ToolSpec<'a> {
            name: &'a str,
            description: &'a str,
            input_schema: serde_json::Value,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            system: &'a str,
            messages: &'a [Message],
            tools: Vec<ToolSpec<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            content: Vec<ContentBlock>,
        }

        let req = Req {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system,
            messages,
            tools: vec![ToolSpec {
                name: WEB_SEARCH_TOOL,
                description: "Search the web. Returns the top result titles, URLs and snippets.",
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "The search query." }
                    },
                    "required": ["query"]
                }),
            }],
        };

        let resp = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&req)
            .send()
            .await
            .context("anthropic request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("anthropic returned {status}: {body}"));
        }
        let body: Resp = resp.json().await.context("parse anthropic response")?;
        Ok(classify(body.content))
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

/// Scripted backend for tests: pops one prepared turn per call.
pub struct ScriptedBackend {
    turns: Mutex<VecDeque<BackendTurn>>,
}

impl ScriptedBackend {
    pub fn new(turns: Vec<BackendTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
        }
    }

    /// A turn that requests one web search.
    pub fn tool_use_turn(id: &str, query: &str) -> BackendTurn {
        classify(vec![ContentBlock::ToolUse {
            id: id.to_string(),
            name: WEB_SEARCH_TOOL.to_string(),
            input: serde_json::json!({ "query": query }),
        }])
    }

    /// A final-answer turn.
    pub fn final_turn(text: &str) -> BackendTurn {
        classify(vec![ContentBlock::Text {
            text: text.to_string(),
        }])
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn complete(&self, _system: &str, _messages: &[Message]) -> Result<BackendTurn> {
        self.turns
            .lock()
            .expect("poisoned scripted backend")
            .pop_front()
            .ok_or_else(|| anyhow!("scripted backend exhausted"))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
