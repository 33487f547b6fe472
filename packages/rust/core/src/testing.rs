//! Scripted in-memory providers for engine and orchestrator tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use medcontact_provider::{ProviderError, ProviderFactory, SearchProvider};
use medcontact_shared::{Credential, MedContactError, Result};
use tokio::time::Instant;

type Reply = std::result::Result<String, ProviderError>;

/// Replays a fixed list of replies, then a fallback for every further call.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    latency: Duration,
    calls: Arc<Mutex<Vec<(Instant, String)>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: Err(ProviderError::Transient("script exhausted".into())),
            latency: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every call fails with a transient error.
    pub fn failing() -> Self {
        Self::new(Vec::new())
    }

    /// Every call returns `text`.
    pub fn always(text: &str) -> Self {
        Self::new(Vec::new()).with_fallback(Ok(text.to_string()))
    }

    pub fn with_fallback(mut self, fallback: Reply) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Shared log of `(call time, prompt)`.
    pub fn calls(&self) -> Arc<Mutex<Vec<(Instant, String)>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl SearchProvider for ScriptedProvider {
    async fn complete(&self, prompt: &str) -> Reply {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), prompt.to_string()));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// How a [`ScriptedFactory`] treats a given credential.
#[derive(Clone)]
pub enum Behaviour {
    /// Answer every prompt with this text after a delay.
    Answer { text: String, latency: Duration },
    /// Refuse to build the channel.
    Reject,
    /// Panic inside the provider call.
    Panic,
}

/// Builds providers whose behaviour is keyed by credential secret.
pub struct ScriptedFactory {
    behaviours: HashMap<String, Behaviour>,
    default: Behaviour,
}

impl ScriptedFactory {
    pub fn answering(text: &str) -> Self {
        Self {
            behaviours: HashMap::new(),
            default: Behaviour::Answer {
                text: text.to_string(),
                latency: Duration::ZERO,
            },
        }
    }

    pub fn with(mut self, secret: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(secret.to_string(), behaviour);
        self
    }
}

pub enum ScriptedChannel {
    Scripted(ScriptedProvider),
    Panicking,
}

#[async_trait]
impl SearchProvider for ScriptedChannel {
    async fn complete(&self, prompt: &str) -> Reply {
        match self {
            Self::Scripted(provider) => provider.complete(prompt).await,
            Self::Panicking => panic!("provider exploded"),
        }
    }
}

impl ProviderFactory for ScriptedFactory {
    type Provider = ScriptedChannel;

    fn connect(&self, credential: &Credential) -> Result<ScriptedChannel> {
        let behaviour = self
            .behaviours
            .get(credential.expose())
            .unwrap_or(&self.default);
        match behaviour {
            Behaviour::Answer { text, latency } => Ok(ScriptedChannel::Scripted(
                ScriptedProvider::always(text).with_latency(*latency),
            )),
            Behaviour::Reject => Err(MedContactError::Provider(format!(
                "malformed credential {credential}"
            ))),
            Behaviour::Panic => Ok(ScriptedChannel::Panicking),
        }
    }
}
