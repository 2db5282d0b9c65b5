//! Generator lifecycle: load, ready/busy gate, reload-and-retry

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, info, warn};

use super::{text_or_placeholder, ChatBackend, ChatEngine, ProgressFn, SamplingParams};
use crate::error::GenerationError;
use crate::prompt::ChatMessage;

/// Lifecycle of the generation engine. Busy implies a loaded engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotReady,
    Ready,
    Busy,
}

/// Why a request was turned away at the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    NotReady,
    Busy,
}

/// Held for the duration of one request; dropping it returns the engine to `Ready`
#[must_use]
pub struct BusyGuard<'a> {
    state: &'a Cell<EngineState>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.state.get() == EngineState::Busy {
            self.state.set(EngineState::Ready);
        }
    }
}

struct Loaded<E> {
    model_id: String,
    engine: Rc<E>,
    progress: ProgressFn,
}

/// Chat generation with candidate fallback and a single in-flight request
pub struct Generator<B: ChatBackend> {
    backend: B,
    sampling: SamplingParams,
    loaded: RefCell<Option<Loaded<B::Engine>>>,
    state: Cell<EngineState>,
    reloads: Cell<u32>,
}

impl<B: ChatBackend> Generator<B> {
    pub fn new(backend: B, sampling: SamplingParams) -> Self {
        Self {
            backend,
            sampling,
            loaded: RefCell::new(None),
            state: Cell::new(EngineState::NotReady),
            reloads: Cell::new(0),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> EngineState {
        self.state.get()
    }

    pub fn is_ready(&self) -> bool {
        self.state.get() != EngineState::NotReady
    }

    pub fn is_busy(&self) -> bool {
        self.state.get() == EngineState::Busy
    }

    /// Identifier of the model that loaded successfully
    pub fn model_id(&self) -> Option<String> {
        self.loaded.borrow().as_ref().map(|l| l.model_id.clone())
    }

    /// Recovery reloads performed so far
    pub fn reload_count(&self) -> u32 {
        self.reloads.get()
    }

    /// Try each candidate in order until one engine initializes.
    ///
    /// Returns the chosen model id and flips the state to `Ready`.
    pub async fn load(
        &self,
        candidates: &[String],
        progress: ProgressFn,
    ) -> Result<String, GenerationError> {
        if candidates.is_empty() {
            return Err(GenerationError::NoCandidates);
        }

        let mut last = String::new();
        for model_id in candidates {
            info!(model = %model_id, "loading chat model");
            match self.backend.create(model_id, progress.clone()).await {
                Ok(engine) => {
                    *self.loaded.borrow_mut() = Some(Loaded {
                        model_id: model_id.clone(),
                        engine: Rc::new(engine),
                        progress,
                    });
                    self.state.set(EngineState::Ready);
                    info!(model = %model_id, "chat model ready");
                    return Ok(model_id.clone());
                }
                Err(e) => {
                    warn!(model = %model_id, error = %e, "chat model failed to load");
                    last = e.to_string();
                }
            }
        }

        Err(GenerationError::AllCandidatesFailed { last })
    }

    /// Enter `Busy`, or say why not
    pub fn begin(&self) -> Result<BusyGuard<'_>, Gate> {
        match self.state.get() {
            EngineState::NotReady => Err(Gate::NotReady),
            EngineState::Busy => Err(Gate::Busy),
            EngineState::Ready => {
                self.state.set(EngineState::Busy);
                Ok(BusyGuard { state: &self.state })
            }
        }
    }

    /// Run one completion while holding the busy guard.
    ///
    /// A `ModelUnloaded` error triggers exactly one reload of the same model
    /// and one retry; anything after that propagates.
    pub async fn complete(
        &self,
        _guard: &BusyGuard<'_>,
        messages: &[ChatMessage],
    ) -> Result<String, GenerationError> {
        let (engine, model_id) = self.current()?;

        match engine.complete(messages, &self.sampling).await {
            Ok(text) => Ok(text_or_placeholder(text)),
            Err(e) if e.is_recoverable() => {
                warn!(model = %model_id, error = %e, "model unloaded mid-request; reloading once");
                let engine = self.reload(&model_id).await?;
                let text = engine.complete(messages, &self.sampling).await?;
                Ok(text_or_placeholder(text))
            }
            Err(e) => Err(e),
        }
    }

    fn current(&self) -> Result<(Rc<B::Engine>, String), GenerationError> {
        let loaded = self.loaded.borrow();
        let loaded = loaded.as_ref().ok_or(GenerationError::NotLoaded)?;
        Ok((loaded.engine.clone(), loaded.model_id.clone()))
    }

    /// Reload in place when the engine supports it, otherwise rebuild it
    async fn reload(&self, model_id: &str) -> Result<Rc<B::Engine>, GenerationError> {
        self.reloads.set(self.reloads.get() + 1);

        let (engine, progress) = {
            let loaded = self.loaded.borrow();
            let loaded = loaded.as_ref().ok_or(GenerationError::NotLoaded)?;
            (loaded.engine.clone(), loaded.progress.clone())
        };

        match engine.reload(model_id).await {
            Ok(()) => {
                debug!(model = %model_id, "engine reloaded in place");
                Ok(engine)
            }
            Err(GenerationError::ReloadUnsupported) => {
                debug!(model = %model_id, "engine has no reload; recreating");
                let fresh = Rc::new(self.backend.create(model_id, progress.clone()).await?);
                *self.loaded.borrow_mut() = Some(Loaded {
                    model_id: model_id.to_string(),
                    engine: fresh.clone(),
                    progress,
                });
                Ok(fresh)
            }
            Err(e) => Err(e),
        }
    }
}
