//! Scripted fakes shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use schemabench_llm::Message;
use schemabench_types::{BenchError, Result};

use crate::generator::{Generation, GenerationMode, GenerationRequest, Generator};

pub(crate) const VALID_FULL: &str = r#"{"recommendation":"Create a database specialist","action":{"type":"create_actor","actor":{"title":"DBA","reason":"needs db help, long enough text","skills":["PostgreSQL","Indexing","Tuning"],"prompt":"You are a DBA expert with enough characters","model":"reasoning"}}}"#;
pub(crate) const VALID_DECISION: &str =
    r#"{"recommendation":"Create a database specialist","action":"create_actor"}"#;
pub(crate) const NO_ACTION_DECISION: &str =
    r#"{"recommendation":"Add read replicas first","action":null}"#;
pub(crate) const VALID_PROFILE: &str = r#"{"title":"DBA","reason":"needs db help, long enough text","skills":["PostgreSQL","Indexing","Tuning"]}"#;
pub(crate) const VALID_PROMPT: &str =
    r#"{"prompt":"You are a DBA expert with enough characters","model":"reasoning"}"#;
pub(crate) const INVALID_PROFILE: &str = r#"{"title":"DBA","reason":"short","skills":["PostgreSQL"]}"#;

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub messages: Vec<Message>,
    pub schema_name: &'static str,
    pub mode: GenerationMode,
}

/// Replays a fixed sequence of generator results and records every request.
pub(crate) struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<Generation>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<Generation>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A script of plain-text replies.
    pub fn texts(replies: &[&str]) -> Self {
        Self::new(
            replies
                .iter()
                .map(|r| Ok(Generation::text(*r).with_usage(100, 50)))
                .collect(),
        )
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn invoke(&self, request: &GenerationRequest<'_>) -> Result<Generation> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: request.messages.to_vec(),
            schema_name: request.schema.name,
            mode: request.mode,
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BenchError::Other("script exhausted".into())))
    }
}
