//! In-memory stand-ins for the embedding and chat runtimes (tests only)

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use futures::channel::oneshot;

use crate::embeddings::Embedder;
use crate::error::{EmbedError, GenerationError};
use crate::generation::{ChatBackend, ChatEngine, LoadProgress, ProgressFn, SamplingParams};
use crate::index::{DocumentIndex, IndexFile, IndexRecord, PageRange};
use crate::prompt::ChatMessage;

/// Looks texts up in a fixed table
#[derive(Default)]
pub struct TableEmbedder {
    pub vectors: HashMap<String, Vec<f32>>,
    pub fallback: Option<Vec<f32>>,
    pub calls: Cell<u32>,
}

impl TableEmbedder {
    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn fallback(mut self, vector: Vec<f32>) -> Self {
        self.fallback = Some(vector);
        self
    }
}

impl Embedder for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.calls.set(self.calls.get() + 1);
        self.vectors
            .get(text)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| EmbedError::InferenceFailed(format!("no vector for {text:?}")))
    }
}

/// Counters shared between a backend and the engines it creates
#[derive(Default)]
pub struct Calls {
    pub creates: Cell<u32>,
    pub completes: Cell<u32>,
    pub reloads: Cell<u32>,
    pub last_messages: RefCell<Vec<ChatMessage>>,
    pub last_params: Cell<Option<SamplingParams>>,
}

/// Backend whose engines replay a script of completion results
#[derive(Default)]
pub struct ScriptedBackend {
    pub catalog: Vec<String>,
    pub broken_models: Vec<String>,
    pub in_place_reload: bool,
    pub script: Rc<RefCell<VecDeque<Result<Option<String>, GenerationError>>>>,
    /// When set, the next completion waits for this before answering
    pub hold: Rc<RefCell<Option<oneshot::Receiver<()>>>>,
    pub calls: Rc<Calls>,
}

impl ScriptedBackend {
    pub fn answering(answers: &[&str]) -> Self {
        let backend = Self::default();
        for a in answers {
            backend.push(Ok(Some(a.to_string())));
        }
        backend
    }

    pub fn push(&self, step: Result<Option<String>, GenerationError>) {
        self.script.borrow_mut().push_back(step);
    }

    pub fn broken(mut self, model: &str) -> Self {
        self.broken_models.push(model.to_string());
        self
    }

    pub fn catalog(mut self, models: &[&str]) -> Self {
        self.catalog = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn in_place_reload(mut self) -> Self {
        self.in_place_reload = true;
        self
    }

    /// Make the next completion wait; fire the returned sender to release it
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.borrow_mut() = Some(rx);
        tx
    }
}

pub struct ScriptedEngine {
    model_id: String,
    in_place_reload: bool,
    script: Rc<RefCell<VecDeque<Result<Option<String>, GenerationError>>>>,
    hold: Rc<RefCell<Option<oneshot::Receiver<()>>>>,
    calls: Rc<Calls>,
}

impl ScriptedEngine {
    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

impl ChatEngine for ScriptedEngine {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &SamplingParams,
    ) -> Result<Option<String>, GenerationError> {
        self.calls.completes.set(self.calls.completes.get() + 1);
        *self.calls.last_messages.borrow_mut() = messages.to_vec();
        self.calls.last_params.set(Some(*params));

        let held = self.hold.borrow_mut().take();
        if let Some(rx) = held {
            let _ = rx.await;
        }

        self.script
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(None))
    }

    async fn reload(&self, _model_id: &str) -> Result<(), GenerationError> {
        if !self.in_place_reload {
            return Err(GenerationError::ReloadUnsupported);
        }
        self.calls.reloads.set(self.calls.reloads.get() + 1);
        Ok(())
    }
}

impl ChatBackend for ScriptedBackend {
    type Engine = ScriptedEngine;

    async fn available_models(&self) -> Vec<String> {
        self.catalog.clone()
    }

    async fn create(
        &self,
        model_id: &str,
        progress: ProgressFn,
    ) -> Result<ScriptedEngine, GenerationError> {
        self.calls.creates.set(self.calls.creates.get() + 1);
        if self.broken_models.iter().any(|m| m == model_id) {
            return Err(GenerationError::Fatal(format!("cannot load {model_id}")));
        }
        progress(LoadProgress {
            fraction: Some(1.0),
            text: format!("{model_id} loaded"),
        });
        Ok(ScriptedEngine {
            model_id: model_id.to_string(),
            in_place_reload: self.in_place_reload,
            script: self.script.clone(),
            hold: self.hold.clone(),
            calls: self.calls.clone(),
        })
    }
}

pub fn record(book: &str, pages: (u32, u32), text: &str, embedding: Vec<f32>) -> IndexRecord {
    IndexRecord {
        id: None,
        chunk_id: None,
        source: format!("{}.pdf#pp.{}-{}", book.replace(' ', "_"), pages.0, pages.1),
        book: book.to_string(),
        pages: PageRange::new(pages.0, pages.1),
        text: text.to_string(),
        embedding,
    }
}

/// Three records of dimension 4, one per axis-ish direction
pub fn small_index() -> DocumentIndex {
    DocumentIndex::from_file_contents(IndexFile {
        records: vec![
            record("Moby Dick", (1, 2), "Call me Ishmael.", vec![1.0, 0.0, 0.0, 0.0]),
            record("Walden", (10, 11), "I went to the woods.", vec![0.0, 1.0, 0.0, 0.0]),
            record("Dune", (5, 5), "Fear is the mind-killer.", vec![0.0, 0.0, 0.6, 0.8]),
        ],
        metadata: None,
    })
    .expect("valid test index")
}

pub fn no_progress() -> ProgressFn {
    Rc::new(|_| {})
}
