//! Query session
//!
//! The one object that owns everything a question needs: the index, the
//! embedder, the generator and a status sink. Nothing lives in globals.
//!
//! ```text
//! question → Embedder → top_k_similar → build_prompt → Generator → Answer
//! ```

mod status;


pub use status::Status;

use instant::Instant;
use serde::Serialize;
use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::embeddings::{Embedder, OnnxModel};
use crate::error::{RagError, RetrievalError};
use crate::generation::{
    select_candidates, BusyGuard, ChatBackend, Gate, Generator, LoadProgress, ProgressFn,
};
use crate::index::DocumentIndex;
use crate::prompt::build_prompt;
use crate::retrieval::{clamp_top_k_within, top_k_similar, Citation};

/// Callback receiving every status change
pub type StatusSink = Rc<dyn Fn(&Status)>;

/// Per-phase wall-clock timings for one question
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskTimings {
    pub embed_ms: f64,
    pub retrieve_ms: f64,
    pub generate_ms: f64,
}

impl AskTimings {
    pub fn total_ms(&self) -> f64 {
        self.embed_ms + self.retrieve_ms + self.generate_ms
    }
}

/// A grounded answer and the passages it was built from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub model: String,
    pub passages: Vec<Citation>,
    pub timings: AskTimings,
}

/// Result of [`RagSession::ask`] that is not an error
#[derive(Debug, Clone, PartialEq)]
pub enum AskOutcome {
    Answered(Answer),
    /// Blank question; nothing happened
    Ignored,
    /// Engine not loaded yet
    NotReady,
    /// Another question is in flight; this one was dropped
    Busy,
}

pub struct RagSession<E: Embedder, B: ChatBackend> {
    config: RagConfig,
    index: DocumentIndex,
    embedder: E,
    generator: Generator<B>,
    status: StatusSink,
}

impl<E: Embedder, B: ChatBackend> RagSession<E, B> {
    /// Assemble a session around an already-loaded index.
    ///
    /// Fails when the embedder's declared dimension cannot match the index.
    pub fn new(
        config: RagConfig,
        index: DocumentIndex,
        embedder: E,
        backend: B,
        status: impl Fn(&Status) + 'static,
    ) -> Result<Self, RagError> {
        if let Some(dims) = embedder.dimensions() {
            if dims != index.dimensions() {
                return Err(RetrievalError::DimensionMismatch {
                    query: dims,
                    index: index.dimensions(),
                }
                .into());
            }
        }

        if let Some(built_with) = index.model() {
            if !same_embedding_model(built_with, &config.embedding_model) {
                warn!(
                    index_model = built_with,
                    query_model = %config.embedding_model,
                    "index was built with a different embedding model"
                );
            }
        }

        let generator = Generator::new(backend, config.sampling());

        Ok(Self {
            config,
            index,
            embedder,
            generator,
            status: Rc::new(status),
        })
    }

    /// [`new`](Self::new) then [`load_engine`](Self::load_engine).
    ///
    /// The session is only returned once a chat model is ready, so a caller
    /// that keeps it never holds one whose load failed.
    pub async fn start(
        config: RagConfig,
        index: DocumentIndex,
        embedder: E,
        backend: B,
        status: impl Fn(&Status) + 'static,
    ) -> Result<Self, RagError> {
        let session = Self::new(config, index, embedder, backend, status)?;
        session.load_engine().await?;
        Ok(session)
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn index(&self) -> &DocumentIndex {
        &self.index
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn generator(&self) -> &Generator<B> {
        &self.generator
    }

    pub fn is_ready(&self) -> bool {
        self.generator.is_ready()
    }

    pub fn is_busy(&self) -> bool {
        self.generator.is_busy()
    }

    pub fn model_id(&self) -> Option<String> {
        self.generator.model_id()
    }

    fn emit(&self, status: Status) {
        debug!(%status, "status");
        (self.status)(&status);
    }

    /// Pick candidates (config narrowed by the runtime catalog) and load one
    pub async fn load_engine(&self) -> Result<String, RagError> {
        let available = self.generator.backend().available_models().await;
        let candidates = select_candidates(&self.config.candidate_models, &available);
        debug!(?candidates, catalog = available.len(), "chat model candidates");

        let sink = self.status.clone();
        let progress: ProgressFn =
            Rc::new(move |p: LoadProgress| sink(&Status::LoadingModel(p)));

        match self.generator.load(&candidates, progress).await {
            Ok(model) => {
                self.emit(Status::Ready {
                    model: model.clone(),
                });
                Ok(model)
            }
            Err(e) => {
                self.emit(Status::Error(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Answer `question` from the top `k` passages.
    ///
    /// `k` is clamped to `1..=max_top_k` (and never above 10).
    ///
    /// Blank questions, a not-yet-loaded engine and a request already in
    /// flight are reported as outcomes, not errors.
    pub async fn ask(&self, question: &str, k: i64) -> Result<AskOutcome, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(AskOutcome::Ignored);
        }

        let guard = match self.generator.begin() {
            Ok(guard) => guard,
            Err(Gate::NotReady) => return Ok(AskOutcome::NotReady),
            Err(Gate::Busy) => {
                self.emit(Status::StillAnswering);
                return Ok(AskOutcome::Busy);
            }
        };

        match self.answer(&guard, question, k).await {
            Ok(answer) => {
                info!(
                    passages = answer.passages.len(),
                    total_ms = answer.timings.total_ms(),
                    "question answered"
                );
                self.emit(Status::Answered {
                    passages: answer.passages.len(),
                    millis: answer.timings.total_ms(),
                });
                Ok(AskOutcome::Answered(answer))
            }
            Err(e) => {
                warn!(error = %e, "question failed");
                self.emit(Status::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn answer(
        &self,
        guard: &BusyGuard<'_>,
        question: &str,
        k: i64,
    ) -> Result<Answer, RagError> {
        let mut timings = AskTimings::default();

        self.emit(Status::Embedding);
        let started = Instant::now();
        let query = self.embedder.embed(question).await?;
        timings.embed_ms = elapsed_ms(started);

        self.emit(Status::Searching);
        let started = Instant::now();
        let k = clamp_top_k_within(k, self.config.max_top_k);
        let passages = top_k_similar(&self.index, &query, k as i64)?;
        timings.retrieve_ms = elapsed_ms(started);

        let messages = build_prompt(question, &passages);
        let model = self.generator.model_id().unwrap_or_default();

        self.emit(Status::Generating {
            model: model.clone(),
        });
        let started = Instant::now();
        let text = self.generator.complete(guard, &messages).await?;
        timings.generate_ms = elapsed_ms(started);

        Ok(Answer {
            question: question.to_string(),
            text,
            // may have changed if the engine was rebuilt
            model: self.generator.model_id().unwrap_or(model),
            passages: passages.iter().map(Citation::from).collect(),
            timings,
        })
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Compare model ids loosely (`Xenova/all-MiniLM-L6-v2` == `sentence-transformers/all-MiniLM-L6-v2`)
fn same_embedding_model(a: &str, b: &str) -> bool {
    match (OnnxModel::from_id(a), OnnxModel::from_id(b)) {
        (Some(x), Some(y)) => x == y,
        _ => {
            let tail = |s: &str| s.rsplit('/').next().unwrap_or(s).to_ascii_lowercase();
            tail(a) == tail(b)
        }
    }
}
