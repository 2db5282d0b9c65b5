//! Browser bindings
//!
//! The two ML runtimes live on the JS side and are handed in as plain
//! functions. This module adapts them to [`Embedder`] / [`ChatBackend`] and
//! exposes [`RagApp`] to the page.
//!
//! # Example (TypeScript)
//! ```typescript
//! const app = new RagApp({ indexUrl: "index.json" }, embed, CreateMLCEngine, listModels, onStatus);
//! await app.init();
//! const result = await app.ask("Who is Ishmael?", 5); // null when ignored or busy
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Float32Array, Function, Object, Promise, Reflect};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};

use crate::config::RagConfig;
use crate::embeddings::{EmbedOptions, Embedder, EmbeddingOutput};
use crate::error::{EmbedError, GenerationError, IndexError, RagError};
use crate::generation::{ChatBackend, ChatEngine, LoadProgress, ProgressFn, SamplingParams};
use crate::index::DocumentIndex;
use crate::prompt::ChatMessage;
use crate::render::{escape_html, render_answer_text, render_sources_html};
use crate::retrieval::{clamp_top_k, parse_top_k, Citation};
use crate::session::{AskOutcome, AskTimings, RagSession, Status};

type AppSession = RagSession<JsEmbedder, WebLlmBackend>;

fn log(message: &str) {
    web_sys::console::log_1(&format!("[RagApp] {}", message).into());
}

fn to_js(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Best-effort message from a thrown JS value
fn js_error_message(err: &JsValue) -> String {
    if let Some(e) = err.dyn_ref::<js_sys::Error>() {
        return String::from(e.message());
    }
    err.as_string().unwrap_or_else(|| format!("{:?}", err))
}

/// Await `value` whether or not it is a promise
async fn settle(value: JsValue) -> Result<JsValue, JsValue> {
    JsFuture::from(Promise::resolve(&value)).await
}

/// Runtime errors mentioning an unloaded model are the only recoverable ones
fn classify_generation_error(message: String) -> GenerationError {
    if message.to_ascii_lowercase().contains("not loaded") {
        GenerationError::ModelUnloaded(message)
    } else {
        GenerationError::Fatal(message)
    }
}

/// k from the page: a number, a numeric string, or anything else (default)
fn top_k_from_js(k: &JsValue, default_k: usize) -> usize {
    if let Some(n) = k.as_f64() {
        if n.is_finite() {
            return clamp_top_k(n.trunc() as i64);
        }
    }
    match k.as_string() {
        Some(s) if !s.trim().is_empty() => parse_top_k(&s),
        _ => default_k,
    }
}

// ============================================================================
// Embedder
// ============================================================================

/// Embedding through a JS function `(text, { pooling, normalize }) → vector`
pub struct JsEmbedder {
    func: Function,
    options: EmbedOptions,
}

impl JsEmbedder {
    pub fn new(func: Function, options: EmbedOptions) -> Self {
        Self { func, options }
    }
}

impl Embedder for JsEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let options = serde_wasm_bindgen::to_value(&self.options)
            .map_err(|e| EmbedError::InferenceFailed(e.to_string()))?;

        let pending = self
            .func
            .call2(&JsValue::NULL, &JsValue::from_str(text), &options)
            .map_err(|e| EmbedError::InferenceFailed(js_error_message(&e)))?;
        let output = settle(pending)
            .await
            .map_err(|e| EmbedError::InferenceFailed(js_error_message(&e)))?;

        vector_from_js(&output)
    }
}

/// Accepts a Float32Array, a tensor-like `{ data, dims }`, or plain arrays
fn vector_from_js(output: &JsValue) -> Result<Vec<f32>, EmbedError> {
    if let Some(array) = output.dyn_ref::<Float32Array>() {
        return EmbeddingOutput::Vector(array.to_vec()).into_vector();
    }

    if output.is_object() {
        let data = Reflect::get(output, &JsValue::from_str("data")).unwrap_or(JsValue::UNDEFINED);
        if let Some(array) = data.dyn_ref::<Float32Array>() {
            let dims = Reflect::get(output, &JsValue::from_str("dims"))
                .ok()
                .and_then(|d| serde_wasm_bindgen::from_value::<Vec<usize>>(d).ok())
                .unwrap_or_default();
            return EmbeddingOutput::Tensor {
                data: array.to_vec(),
                dims,
            }
            .into_vector();
        }
    }

    serde_wasm_bindgen::from_value::<EmbeddingOutput>(output.clone())
        .map_err(|e| EmbedError::UnsupportedOutput(e.to_string()))?
        .into_vector()
}

// ============================================================================
// Chat runtime
// ============================================================================

#[derive(Serialize)]
struct CompletionRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<CompletionMessage>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionResponse {
    fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
    }
}

/// Engine factory `(modelId, { initProgressCallback, useWebWorker }) → engine`
pub struct WebLlmBackend {
    create_engine: Function,
    list_models: Option<Function>,
    use_web_worker: bool,
}

impl WebLlmBackend {
    pub fn new(create_engine: Function, list_models: Option<Function>, use_web_worker: bool) -> Self {
        Self {
            create_engine,
            list_models,
            use_web_worker,
        }
    }
}

impl ChatBackend for WebLlmBackend {
    type Engine = WebLlmEngine;

    async fn available_models(&self) -> Vec<String> {
        let Some(list) = &self.list_models else {
            return Vec::new();
        };

        let listed = match list.call0(&JsValue::NULL) {
            Ok(value) => settle(value).await,
            Err(e) => Err(e),
        };

        match listed.map(serde_wasm_bindgen::from_value::<Vec<String>>) {
            Ok(Ok(models)) => models,
            Ok(Err(e)) => {
                log(&format!("Ignoring model catalog: {}", e));
                Vec::new()
            }
            Err(e) => {
                log(&format!("Model catalog unavailable: {}", js_error_message(&e)));
                Vec::new()
            }
        }
    }

    async fn create(
        &self,
        model_id: &str,
        progress: ProgressFn,
    ) -> Result<Self::Engine, GenerationError> {
        let on_progress = Closure::<dyn FnMut(JsValue)>::new(move |report: JsValue| {
            let report = serde_wasm_bindgen::from_value::<LoadProgress>(report.clone())
                .unwrap_or_else(|_| LoadProgress {
                    fraction: None,
                    text: report.as_string().unwrap_or_default(),
                });
            progress(report);
        });

        let options = Object::new();
        Reflect::set(
            &options,
            &JsValue::from_str("initProgressCallback"),
            on_progress.as_ref(),
        )
        .map_err(|e| GenerationError::Fatal(js_error_message(&e)))?;
        Reflect::set(
            &options,
            &JsValue::from_str("useWebWorker"),
            &JsValue::from_bool(self.use_web_worker),
        )
        .map_err(|e| GenerationError::Fatal(js_error_message(&e)))?;

        let pending = self
            .create_engine
            .call2(&JsValue::NULL, &JsValue::from_str(model_id), &options)
            .map_err(|e| GenerationError::Fatal(js_error_message(&e)))?;
        let engine = settle(pending)
            .await
            .map_err(|e| GenerationError::Fatal(js_error_message(&e)))?;

        if !engine.is_object() {
            return Err(GenerationError::Fatal(format!(
                "engine factory for {} returned no engine",
                model_id
            )));
        }

        Ok(WebLlmEngine {
            inner: engine,
            _on_progress: on_progress,
        })
    }
}

/// OpenAI-style engine object (`engine.chat.completions.create`)
pub struct WebLlmEngine {
    inner: JsValue,
    // the runtime keeps calling this while it (re)loads weights
    _on_progress: Closure<dyn FnMut(JsValue)>,
}

impl WebLlmEngine {
    fn completions(&self) -> Result<(JsValue, Function), GenerationError> {
        let lookup = |target: &JsValue, key: &str| {
            Reflect::get(target, &JsValue::from_str(key))
                .ok()
                .filter(|v| !v.is_undefined() && !v.is_null())
        };

        let completions = lookup(&self.inner, "chat")
            .and_then(|chat| lookup(&chat, "completions"))
            .ok_or_else(|| GenerationError::Fatal("engine has no chat.completions".into()))?;
        let create = lookup(&completions, "create")
            .and_then(|f| f.dyn_into::<Function>().ok())
            .ok_or_else(|| GenerationError::Fatal("engine has no chat.completions.create".into()))?;

        Ok((completions, create))
    }
}

impl ChatEngine for WebLlmEngine {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &SamplingParams,
    ) -> Result<Option<String>, GenerationError> {
        let (completions, create) = self.completions()?;

        let request = serde_wasm_bindgen::to_value(&CompletionRequest {
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        })
        .map_err(|e| GenerationError::Fatal(e.to_string()))?;

        let pending = create
            .call1(&completions, &request)
            .map_err(|e| classify_generation_error(js_error_message(&e)))?;
        let reply = settle(pending)
            .await
            .map_err(|e| classify_generation_error(js_error_message(&e)))?;

        let reply: CompletionResponse = serde_wasm_bindgen::from_value(reply)
            .map_err(|e| GenerationError::Fatal(format!("Unexpected completion shape: {}", e)))?;
        Ok(reply.into_content())
    }

    async fn reload(&self, model_id: &str) -> Result<(), GenerationError> {
        let reload = Reflect::get(&self.inner, &JsValue::from_str("reload"))
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok())
            .ok_or(GenerationError::ReloadUnsupported)?;

        let pending = reload
            .call1(&self.inner, &JsValue::from_str(model_id))
            .map_err(|e| classify_generation_error(js_error_message(&e)))?;
        settle(pending)
            .await
            .map_err(|e| classify_generation_error(js_error_message(&e)))?;
        Ok(())
    }
}

// ============================================================================
// Index fetch
// ============================================================================

/// GET `url` and parse it as the index JSON
pub async fn fetch_index(url: &str) -> Result<DocumentIndex, IndexError> {
    let fetch_error = |reason: String| IndexError::Fetch {
        url: url.to_string(),
        reason,
    };

    let window = web_sys::window().ok_or_else(|| fetch_error("no window".into()))?;
    let response = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(|e| fetch_error(js_error_message(&e)))?;
    let response: web_sys::Response = response
        .dyn_into()
        .map_err(|_| fetch_error("fetch did not return a Response".into()))?;

    if !response.ok() {
        return Err(fetch_error(format!("HTTP {}", response.status())));
    }

    let text = response.text().map_err(|e| fetch_error(js_error_message(&e)))?;
    let text = JsFuture::from(text)
        .await
        .map_err(|e| fetch_error(js_error_message(&e)))?
        .as_string()
        .ok_or_else(|| fetch_error("response body is not text".into()))?;

    DocumentIndex::from_json(&text)
}

// ============================================================================
// RagApp
// ============================================================================

/// Status object handed to `onStatus`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusEvent {
    kind: &'static str,
    message: String,
    is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<f32>,
}

impl From<&Status> for StatusEvent {
    fn from(status: &Status) -> Self {
        let kind = match status {
            Status::LoadingIndex { .. } => "loadingIndex",
            Status::IndexLoaded { .. } => "indexLoaded",
            Status::LoadingModel(_) => "loadingModel",
            Status::Ready { .. } => "ready",
            Status::Embedding => "embedding",
            Status::Searching => "searching",
            Status::Generating { .. } => "generating",
            Status::StillAnswering => "stillAnswering",
            Status::Answered { .. } => "answered",
            Status::Error(_) => "error",
        };
        let progress = match status {
            Status::LoadingModel(p) => p.fraction,
            _ => None,
        };
        Self {
            kind,
            message: status.to_string(),
            is_error: status.is_error(),
            progress,
        }
    }
}

fn emit_status(on_status: &Function, status: &Status) {
    let event = match serde_wasm_bindgen::to_value(&StatusEvent::from(status)) {
        Ok(event) => event,
        Err(e) => {
            log(&format!("Status not serializable: {}", e));
            return;
        }
    };
    if let Err(e) = on_status.call1(&JsValue::NULL, &event) {
        log(&format!("onStatus threw: {}", js_error_message(&e)));
    }
}

/// Result of `RagApp.ask`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AskResponse<'a> {
    answer: String,
    model: &'a str,
    passages: &'a [Citation],
    sources_html: String,
    timings: AskTimings,
}

/// Page-facing entry point
///
/// # Example (TypeScript)
/// ```typescript
/// const app = new RagApp(config, embed, createEngine, listModels, onStatus);
/// await app.init();
/// const { answer, sourcesHtml } = await app.ask(question, topK);
/// ```
#[wasm_bindgen]
pub struct RagApp {
    config: RagConfig,
    embed_fn: Function,
    create_engine: Function,
    list_models: Option<Function>,
    on_status: Function,
    session: Rc<RefCell<Option<Rc<AppSession>>>>,
}

#[wasm_bindgen]
impl RagApp {
    /// Create an app; nothing is fetched or loaded until `init()`
    #[wasm_bindgen(constructor)]
    pub fn new(
        config: JsValue,
        embed_fn: Function,
        create_engine: Function,
        list_models: Option<Function>,
        on_status: Function,
    ) -> Result<RagApp, JsValue> {
        let config: RagConfig = if config.is_undefined() || config.is_null() {
            RagConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)
                .map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e)))?
        };

        Ok(Self {
            config,
            embed_fn,
            create_engine,
            list_models,
            on_status,
            session: Rc::new(RefCell::new(None)),
        })
    }

    /// Fetch the index and load a chat model. Resolves to the model id.
    ///
    /// Rejects when no model loads; calling it again retries from scratch.
    #[wasm_bindgen]
    pub fn init(&self) -> Promise {
        let slot = self.session.clone();
        let config = self.config.clone();
        let embedder = JsEmbedder::new(
            self.embed_fn.clone(),
            EmbedOptions {
                pooling: config.pooling,
                normalize: config.normalize,
            },
        );
        let backend = WebLlmBackend::new(
            self.create_engine.clone(),
            self.list_models.clone(),
            config.use_web_worker,
        );
        let on_status = self.on_status.clone();

        future_to_promise(async move {
            let existing = slot.borrow().clone();
            if let Some(session) = existing {
                return Ok(session.model_id().map(JsValue::from).unwrap_or(JsValue::NULL));
            }

            emit_status(
                &on_status,
                &Status::LoadingIndex {
                    url: config.index_url.clone(),
                },
            );
            let index = match fetch_index(&config.index_url).await {
                Ok(index) => index,
                Err(e) => {
                    emit_status(&on_status, &Status::Error(e.to_string()));
                    return Err(to_js(e));
                }
            };
            emit_status(
                &on_status,
                &Status::IndexLoaded {
                    records: index.len(),
                },
            );
            log(&format!("Index loaded ({} records, {}d)", index.len(), index.dimensions()));

            let sink = on_status.clone();
            let session = RagSession::start(config, index, embedder, backend, move |s: &Status| {
                emit_status(&sink, s)
            })
            .await
            .map_err(|e| {
                // load failures have already been reported by the session
                if !matches!(e, RagError::Generation(_)) {
                    emit_status(&on_status, &Status::Error(e.to_string()));
                }
                to_js(e)
            })?;
            let model = session.model_id().unwrap_or_default();
            *slot.borrow_mut() = Some(Rc::new(session));

            log(&format!("Engine ready ({})", model));
            Ok(JsValue::from_str(&model))
        })
    }

    /// Answer a question. Resolves to `null` when it was ignored (blank,
    /// not ready, or another question still running).
    #[wasm_bindgen]
    pub fn ask(&self, question: String, k: JsValue) -> Promise {
        let session = self.session.borrow().clone();
        let k = top_k_from_js(&k, self.config.default_top_k);
        let snippet_chars = self.config.snippet_chars;

        future_to_promise(async move {
            let Some(session) = session else {
                return Ok(JsValue::NULL);
            };

            match session.ask(&question, k as i64).await.map_err(to_js)? {
                AskOutcome::Answered(answer) => {
                    let response = AskResponse {
                        answer: render_answer_text(&answer.text),
                        model: &answer.model,
                        passages: &answer.passages,
                        sources_html: render_sources_html(&answer.passages, snippet_chars),
                        timings: answer.timings,
                    };
                    serde_wasm_bindgen::to_value(&response).map_err(to_js)
                }
                AskOutcome::Ignored | AskOutcome::NotReady | AskOutcome::Busy => Ok(JsValue::NULL),
            }
        })
    }

    #[wasm_bindgen(js_name = isReady)]
    pub fn is_ready(&self) -> bool {
        self.session.borrow().as_ref().is_some_and(|s| s.is_ready())
    }

    #[wasm_bindgen(js_name = isBusy)]
    pub fn is_busy(&self) -> bool {
        self.session.borrow().as_ref().is_some_and(|s| s.is_busy())
    }

    #[wasm_bindgen(js_name = modelId)]
    pub fn model_id(&self) -> Option<String> {
        self.session.borrow().as_ref().and_then(|s| s.model_id())
    }

    /// Number of records in the loaded index (0 before `init()`)
    #[wasm_bindgen(js_name = indexSize)]
    pub fn index_size(&self) -> usize {
        self.session.borrow().as_ref().map_or(0, |s| s.index().len())
    }
}

/// Escape text for insertion into HTML
#[wasm_bindgen(js_name = escapeHtml)]
pub fn escape_html_js(text: &str) -> String {
    escape_html(text)
}

/// Clamp a requested k into the supported range
#[wasm_bindgen(js_name = clampTopK)]
pub fn clamp_top_k_js(k: f64) -> usize {
    if k.is_finite() {
        clamp_top_k(k.trunc() as i64)
    } else {
        crate::config::DEFAULT_TOP_K
    }
}
