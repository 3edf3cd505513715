//! Scripted provider for router and orchestrator tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ProviderClient, ProviderError, ProviderErrorKind, ProviderResponse};
use crate::types::{Command, ToolDefinition};

type Scripted = Result<Vec<Value>, ProviderErrorKind>;

/// Answers from a queue; an empty queue answers with no tool calls
pub(crate) struct ScriptedProvider {
    name: String,
    credential: bool,
    delay: Option<Duration>,
    script: Mutex<VecDeque<Scripted>>,
    calls: AtomicU32,
    last_command: Mutex<Option<Command>>,
}

impl ScriptedProvider {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            credential: true,
            delay: None,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
            last_command: Mutex::new(None),
        }
    }

    pub(crate) fn respond(self, tool_calls: Vec<Value>) -> Self {
        self.script.lock().unwrap().push_back(Ok(tool_calls));
        self
    }

    pub(crate) fn fail(self, kind: ProviderErrorKind) -> Self {
        self.script.lock().unwrap().push_back(Err(kind));
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn without_credential(mut self) -> Self {
        self.credential = false;
        self
    }

    pub(crate) fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_command(&self) -> Option<Command> {
        self.last_command.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    async fn call(
        &self,
        command: &Command,
        _tools: &[ToolDefinition],
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_command.lock().unwrap() = Some(command.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Err(kind)) => Err(ProviderError::with_provider(
                kind,
                format!("scripted {:?}", kind),
                &self.name,
            )),
            Some(Ok(tool_calls)) => Ok(ProviderResponse {
                tool_calls,
                ..Default::default()
            }),
            None => Ok(ProviderResponse::default()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn has_credential(&self) -> bool {
        self.credential
    }
}
