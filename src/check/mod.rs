//! CheckExecutor: one bounded AI conversation per topic.
//!
//! The model gets the topic context plus a web-search tool; it may search a
//! few times, then must answer with a JSON verdict. Both the number of tool
//! rounds and the wall-clock time are capped, and any failure folds into an
//! inconclusive result so one bad topic never takes the batch down.

pub mod backend;
pub mod search;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Topic;
use crate::verdict::{fingerprint, parse_answer, CheckResult};
use backend::{Backend, BackendReply, Message};
use search::{SearchClient, SearchHit, SearchProvider};

pub const DEFAULT_MAX_ROUNDS: usize = 4;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_PREFETCH_URLS: usize = 3;
const PREFETCH_CHAR_CAP: usize = 3_000;

const SYSTEM_PROMPT: &str = "You are monitoring a topic for updates on behalf of a user. \
Use the web_search tool to look for recent news about the topic, then decide whether \
anything genuinely NEW has happened. Do not report things that have not changed. \
Answer with a single JSON object on its own line:\n\
{\"verdict\": \"changed\" | \"unchanged\" | \"inconclusive\", \
\"summary\": \"1-2 sentence summary of the update or current status\", \
\"source_url\": \"most relevant URL or null\"}";

#[derive(Clone)]
pub struct CheckExecutor {
    backend: Arc<dyn Backend>,
    search: Arc<dyn SearchProvider>,
    max_rounds: usize,
    timeout: Duration,
}

impl CheckExecutor {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            search: Arc::new(SearchClient::new()),
            max_rounds: DEFAULT_MAX_ROUNDS,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = search;
        self
    }

    pub fn with_limits(mut self, max_rounds: usize, timeout: Duration) -> Self {
        self.max_rounds = max_rounds;
        self.timeout = timeout;
        self
    }

    /// Check one topic. Infallible by contract: errors and timeouts come
    /// back as inconclusive results with `error` set.
    pub async fn execute(&self, topic: &Topic) -> CheckResult {
        match tokio::time::timeout(self.timeout, self.run(topic)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(topic = %topic.name, error = ?e, "check failed");
                CheckResult::inconclusive(&topic.name, format!("check failed: {e:#}"))
            }
            Err(_) => {
                tracing::warn!(topic = %topic.name, timeout = ?self.timeout, "check timed out");
                CheckResult::inconclusive(
                    &topic.name,
                    format!("check timed out after {:?}", self.timeout),
                )
            }
        }
    }

    async fn run(&self, topic: &Topic) -> anyhow::Result<CheckResult> {
        let prompt = self.build_prompt(topic).await;
        let mut messages = vec![Message::user_text(prompt)];
        let mut rounds = 0usize;

        loop {
            let turn = self.backend.complete(SYSTEM_PROMPT, &messages).await?;
            match turn.reply {
                BackendReply::Final(text) => return Ok(self.finish(topic, &text)),
                BackendReply::ToolUse { id, query } => {
                    rounds += 1;
                    if rounds > self.max_rounds {
                        tracing::warn!(
                            topic = %topic.name,
                            rounds,
                            "tool-use round limit reached"
                        );
                        return Ok(CheckResult::inconclusive(
                            &topic.name,
                            format!("gave up after {} tool rounds", self.max_rounds),
                        ));
                    }
                    tracing::debug!(topic = %topic.name, round = rounds, query = %query, "web search");
                    let content = match self.search.search(&query).await {
                        Ok(hits) => format_hits(&query, &hits),
                        Err(e) => {
                            tracing::warn!(topic = %topic.name, error = ?e, "search failed");
                            format!("Search failed: {e:#}")
                        }
                    };
                    messages.push(Message::assistant(turn.blocks));
                    messages.push(Message::tool_result(id, content));
                }
            }
        }
    }

    fn finish(&self, topic: &Topic, text: &str) -> CheckResult {
        let Some(answer) = parse_answer(text) else {
            tracing::warn!(topic = %topic.name, "unparsable final answer");
            return CheckResult::inconclusive(&topic.name, "could not parse final answer");
        };
        CheckResult {
            topic_name: topic.name.clone(),
            verdict: answer.verdict,
            fingerprint: fingerprint(&answer.summary),
            summary: answer.summary,
            source_url: answer.source_url,
            error: None,
        }
    }

    /// Topic context plus prefetched page text for the configured URLs.
    /// Fetch failures are logged and skipped; the model still gets the
    /// queries to search for.
    async fn build_prompt(&self, topic: &Topic) -> String {
        let mut prompt = format!(
            "Topic: {}\nDescription: {}\n",
            topic.name, topic.description
        );
        if !topic.search_queries.is_empty() {
            prompt.push_str("\nSuggested search queries:\n");
            for q in &topic.search_queries {
                prompt.push_str(&format!("- {q}\n"));
            }
        }
        for url in topic.urls_to_check.iter().take(MAX_PREFETCH_URLS) {
            match self.search.fetch_page(url).await {
                Ok(text) => {
                    let text: String = text.chars().take(PREFETCH_CHAR_CAP).collect();
                    prompt.push_str(&format!("\nContent from {url}:\n{text}\n"));
                }
                Err(e) => {
                    tracing::warn!(topic = %topic.name, url = %url, error = ?e, "url fetch failed");
                }
            }
        }
        prompt.push_str("\nDecide whether anything new has happened for this topic.");
        prompt
    }
}

fn format_hits(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No results for '{query}'.");
    }
    let mut out = format!("Results for '{query}':\n");
    for hit in hits {
        out.push_str(&format!(
            "Title: {}\nURL: {}\nSnippet: {}\n\n",
            hit.title, hit.url, hit.snippet
        ));
    }
    out
}
