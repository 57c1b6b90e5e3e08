use async_trait::async_trait;
use meridian_core::{CompletionReply, CompletionRequest, ProviderClient, ProviderError, TokenUsage};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct FixedProvider {
    name: String,
    reply: String,
    usage: Option<TokenUsage>,
}

impl FixedProvider {
    pub fn new(name: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reply: reply.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

#[async_trait]
impl ProviderClient for FixedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        _request: &CompletionRequest,
    ) -> Result<CompletionReply, ProviderError> {
        let reply = CompletionReply::new(self.reply.clone());
        Ok(match self.usage {
            Some(usage) => reply.with_usage(usage),
            None => reply,
        })
    }
}

/// Replies with `You said: {message}`.
#[derive(Debug, Clone, Default)]
pub struct EchoProvider;

#[async_trait]
impl ProviderClient for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionReply, ProviderError> {
        Ok(CompletionReply::new(format!("You said: {}", request.message)))
    }
}

/// Fails every call with the same error and counts the calls.
#[derive(Debug)]
pub struct FailingProvider {
    name: String,
    error: ProviderError,
    calls: AtomicU32,
}

impl FailingProvider {
    pub fn new(name: impl Into<String>, error: ProviderError) -> Self {
        Self {
            name: name.into(),
            error,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for FailingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        _request: &CompletionRequest,
    ) -> Result<CompletionReply, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Fails the first `failures` calls as unavailable, then replies.
///
/// Records the tokio clock at every call so tests can assert backoff gaps.
#[derive(Debug)]
pub struct FlakyProvider {
    failures: u32,
    reply: String,
    attempts: Mutex<Vec<Instant>>,
}

impl FlakyProvider {
    pub fn new(failures: u32, reply: impl Into<String>) -> Self {
        Self {
            failures,
            reply: reply.into(),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    /// Gaps between consecutive calls.
    pub fn gaps(&self) -> Vec<Duration> {
        self.attempts
            .lock()
            .windows(2)
            .map(|pair| pair[1].duration_since(pair[0]))
            .collect()
    }
}

#[async_trait]
impl ProviderClient for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn complete(
        &self,
        _request: &CompletionRequest,
    ) -> Result<CompletionReply, ProviderError> {
        let call = {
            let mut attempts = self.attempts.lock();
            attempts.push(Instant::now());
            attempts.len()
        };
        if call <= self.failures as usize {
            return Err(ProviderError::Unavailable(format!("scripted failure {call}")));
        }
        Ok(CompletionReply::new(self.reply.clone()))
    }
}

/// Sleeps on the tokio clock before replying.
#[derive(Debug, Clone)]
pub struct SlowProvider {
    delay: Duration,
    reply: String,
}

impl SlowProvider {
    pub fn new(delay: Duration, reply: impl Into<String>) -> Self {
        Self {
            delay,
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl ProviderClient for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    async fn complete(
        &self,
        _request: &CompletionRequest,
    ) -> Result<CompletionReply, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(CompletionReply::new(self.reply.clone()))
    }
}

/// Captures every request and echoes the message back.
#[derive(Debug, Clone)]
pub struct RecordingProvider {
    seen: Arc<Mutex<Vec<CompletionRequest>>>,
    delay: Duration,
}

impl RecordingProvider {
    pub fn new() -> (Self, Arc<Mutex<Vec<CompletionRequest>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                seen: seen.clone(),
                delay: Duration::ZERO,
            },
            seen,
        )
    }

    /// Sleep before recording, to widen race windows in ordering tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ProviderClient for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionReply, ProviderError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.seen.lock().push(request.clone());
        Ok(CompletionReply::new(format!("reply to {}", request.message)))
    }
}
