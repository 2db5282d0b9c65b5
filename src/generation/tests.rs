use std::cell::RefCell;
use std::rc::Rc;

use futures::executor::block_on;

use super::*;
use crate::testing::{no_progress, ScriptedBackend};

fn models(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

fn prompt() -> Vec<ChatMessage> {
    vec![ChatMessage::system("s"), ChatMessage::user("u")]
}

fn loaded(backend: ScriptedBackend) -> Generator<ScriptedBackend> {
    let generator = Generator::new(backend, SamplingParams::default());
    block_on(generator.load(&models(&["m1"]), no_progress())).unwrap();
    generator
}

#[test]
fn test_load_first_candidate() {
    let generator = Generator::new(ScriptedBackend::default(), SamplingParams::default());
    assert_eq!(generator.state(), EngineState::NotReady);

    let chosen = block_on(generator.load(&models(&["a", "b"]), no_progress())).unwrap();
    assert_eq!(chosen, "a");
    assert_eq!(generator.model_id().as_deref(), Some("a"));
    assert_eq!(generator.state(), EngineState::Ready);
    assert_eq!(generator.backend().calls.creates.get(), 1);
}

#[test]
fn test_load_falls_back_in_order() {
    let backend = ScriptedBackend::default().broken("a").broken("b");
    let generator = Generator::new(backend, SamplingParams::default());

    let chosen = block_on(generator.load(&models(&["a", "b", "c"]), no_progress())).unwrap();
    assert_eq!(chosen, "c");
    assert_eq!(generator.backend().calls.creates.get(), 3);
}

#[test]
fn test_load_all_fail_carries_last_error() {
    let backend = ScriptedBackend::default().broken("a").broken("b");
    let generator = Generator::new(backend, SamplingParams::default());

    let err = block_on(generator.load(&models(&["a", "b"]), no_progress())).unwrap_err();
    assert_eq!(
        err,
        GenerationError::AllCandidatesFailed {
            last: "cannot load b".to_string()
        }
    );
    assert_eq!(generator.state(), EngineState::NotReady);
    assert!(generator.model_id().is_none());
}

#[test]
fn test_load_without_candidates() {
    let generator = Generator::new(ScriptedBackend::default(), SamplingParams::default());
    assert_eq!(
        block_on(generator.load(&[], no_progress())).unwrap_err(),
        GenerationError::NoCandidates
    );
}

#[test]
fn test_load_reports_progress() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let progress: ProgressFn = Rc::new(move |p: LoadProgress| sink.borrow_mut().push(p.text));

    let generator = Generator::new(ScriptedBackend::default(), SamplingParams::default());
    block_on(generator.load(&models(&["m1"]), progress)).unwrap();
    assert_eq!(*seen.borrow(), vec!["m1 loaded".to_string()]);
}

#[test]
fn test_gate_states() {
    let generator = Generator::new(ScriptedBackend::default(), SamplingParams::default());
    assert_eq!(generator.begin().err(), Some(Gate::NotReady));

    block_on(generator.load(&models(&["m1"]), no_progress())).unwrap();
    {
        let _guard = generator.begin().unwrap();
        assert!(generator.is_busy());
        assert_eq!(generator.begin().err(), Some(Gate::Busy));
    }
    assert_eq!(generator.state(), EngineState::Ready);
    assert!(generator.begin().is_ok());
}

#[test]
fn test_complete_uses_fixed_sampling() {
    let generator = loaded(ScriptedBackend::answering(&["forty-two"]));
    let guard = generator.begin().unwrap();

    let text = block_on(generator.complete(&guard, &prompt())).unwrap();
    assert_eq!(text, "forty-two");

    let calls = &generator.backend().calls;
    assert_eq!(calls.completes.get(), 1);
    assert_eq!(
        calls.last_params.get(),
        Some(SamplingParams {
            temperature: 0.2,
            max_tokens: 512
        })
    );
    assert_eq!(*calls.last_messages.borrow(), prompt());
}

#[test]
fn test_missing_content_uses_placeholder() {
    let backend = ScriptedBackend::default();
    backend.push(Ok(None));
    backend.push(Ok(Some("   ".to_string())));
    let generator = loaded(backend);
    let guard = generator.begin().unwrap();

    assert_eq!(block_on(generator.complete(&guard, &prompt())).unwrap(), NO_RESPONSE);
    assert_eq!(block_on(generator.complete(&guard, &prompt())).unwrap(), NO_RESPONSE);
}

#[test]
fn test_unloaded_model_recreated_once_then_retried() {
    let backend = ScriptedBackend::default();
    backend.push(Err(GenerationError::ModelUnloaded("Model not loaded".into())));
    backend.push(Ok(Some("second try".to_string())));
    let generator = loaded(backend);
    let guard = generator.begin().unwrap();

    let text = block_on(generator.complete(&guard, &prompt())).unwrap();
    assert_eq!(text, "second try");
    assert_eq!(generator.reload_count(), 1);

    let calls = &generator.backend().calls;
    assert_eq!(calls.completes.get(), 2);
    // initial load + one rebuild
    assert_eq!(calls.creates.get(), 2);
    assert_eq!(generator.model_id().as_deref(), Some("m1"));
}

#[test]
fn test_unloaded_model_reloaded_in_place() {
    let backend = ScriptedBackend::default().in_place_reload();
    backend.push(Err(GenerationError::ModelUnloaded("Model not loaded".into())));
    backend.push(Ok(Some("after reload".to_string())));
    let generator = loaded(backend);
    let guard = generator.begin().unwrap();

    assert_eq!(
        block_on(generator.complete(&guard, &prompt())).unwrap(),
        "after reload"
    );
    let calls = &generator.backend().calls;
    assert_eq!(calls.reloads.get(), 1);
    assert_eq!(calls.creates.get(), 1);
}

#[test]
fn test_second_unload_propagates() {
    let backend = ScriptedBackend::default();
    backend.push(Err(GenerationError::ModelUnloaded("gone".into())));
    backend.push(Err(GenerationError::ModelUnloaded("still gone".into())));
    backend.push(Ok(Some("never reached".to_string())));
    let generator = loaded(backend);
    let guard = generator.begin().unwrap();

    let err = block_on(generator.complete(&guard, &prompt())).unwrap_err();
    assert_eq!(err, GenerationError::ModelUnloaded("still gone".into()));
    assert_eq!(generator.reload_count(), 1);
    assert_eq!(generator.backend().calls.completes.get(), 2);
}

#[test]
fn test_fatal_error_not_retried() {
    let backend = ScriptedBackend::default();
    backend.push(Err(GenerationError::Fatal("device lost".into())));
    let generator = loaded(backend);

    {
        let guard = generator.begin().unwrap();
        let err = block_on(generator.complete(&guard, &prompt())).unwrap_err();
        assert_eq!(err, GenerationError::Fatal("device lost".into()));
    }
    assert_eq!(generator.reload_count(), 0);
    assert_eq!(generator.state(), EngineState::Ready);
}

#[test]
fn test_select_candidates() {
    let configured = models(&["a", "b", "c"]);

    assert_eq!(select_candidates(&configured, &[]), configured);
    assert_eq!(
        select_candidates(&configured, &models(&["c", "x", "a"])),
        models(&["a", "c"])
    );
    assert_eq!(
        select_candidates(&configured, &models(&["x", "y"])),
        models(&["x", "y"])
    );
    assert_eq!(select_candidates(&[], &models(&["x"])), models(&["x"]));
}

#[test]
fn test_load_progress_accepts_runtime_shape() {
    let p: LoadProgress =
        serde_json::from_str(r#"{ "progress": 0.5, "text": "Fetching shard 3/9", "timeElapsed": 4 }"#)
            .unwrap();
    assert_eq!(p.fraction, Some(0.5));
    assert_eq!(p.text, "Fetching shard 3/9");
}
