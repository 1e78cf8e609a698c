//! Scripted backend for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError};

/// Replays queued replies, then a fixed reply forever.
///
/// Every request is kept so tests can inspect what a stage sent.
pub struct MockBackend {
    model_id: String,
    available: AtomicBool,
    fallback_reply: String,
    queued: Mutex<VecDeque<Result<String, LlmError>>>,
    seen: Mutex<Vec<CompletionRequest>>,
    calls: AtomicU32,
}

impl MockBackend {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            available: AtomicBool::new(true),
            fallback_reply: "{}".to_string(),
            queued: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Reply used once the queue is empty.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.fallback_reply = content.into();
        self
    }

    /// An unavailable mock fails every call.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    pub fn then_respond(self, content: impl Into<String>) -> Self {
        self.queue().push_back(Ok(content.into()));
        self
    }

    pub fn then_fail(self, error: LlmError) -> Self {
        self.queue().push_back(Err(error));
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Result<String, LlmError>>> {
        self.queued.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable("mock backend disabled".to_string()));
        }
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).push(request);

        let next = self.queue().pop_front();
        let content = match next {
            Some(reply) => reply?,
            None => self.fallback_reply.clone(),
        };
        Ok(CompletionResponse {
            content,
            ..Default::default()
        })
    }
}
