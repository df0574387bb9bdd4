//! Deterministic collaborators shared by the unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::api::{ChatMessage, ChatModel};
use crate::document::Chunk;
use crate::embedding::Embedder;
use crate::error::{Error, Result};

/// Chunk `doc#{index}` of a document called `doc`.
pub fn chunk(index: usize, text: &str) -> Chunk {
    Chunk {
        id: format!("doc#{index}"),
        text: text.to_string(),
        document_id: "doc".to_string(),
        start_offset: 0,
        overlap: 0,
    }
}

/// Embedder backed by a fixed text → vector table. Unknown texts fail.
pub struct FixedEmbedder {
    model_id: String,
    vectors: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new(model_id: &str, pairs: &[(&str, Vec<f32>)]) -> Self {
        Self {
            model_id: model_id.to_string(),
            vectors: pairs
                .iter()
                .map(|(text, vector)| (text.to_string(), vector.clone()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of texts embedded so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| Error::Embedding(format!("no vector for {text:?}")))
    }
}

/// Chat model that replays canned replies and records every prompt it was sent.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    repeat: Option<String>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            repeat: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with the same reply.
    pub fn repeating(reply: &str) -> Self {
        Self {
            repeat: Some(reply.to_string()),
            ..Self::new(Vec::<String>::new())
        }
    }

    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        let next = self.replies.lock().unwrap().pop_front();
        next.or_else(|| self.repeat.clone())
            .ok_or_else(|| Error::Model("script exhausted".into()))
    }
}
