//! End-to-end run of the bakery scenario with scripted providers.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use designflow::config::GeneratorConfig;
use designflow::core::Role;
use designflow::html::ImageRewriter;
use designflow::images::ImageSynthesizer;
use designflow::pipeline::StageSequencer;
use designflow::session::GenerationSession;
use designflow::testing::fixtures::{
    bakery_generator, BAKERY_FINAL, BAKERY_OUTLINE, BAKERY_PROMPT, BAKERY_WIREFRAME,
    BAKERY_WIREFRAME_HTML,
};
use designflow::testing::StaticImageBackend;

const IMAGE: &str = "data:image/png;base64,QkFLRQ==";

const EXPECTED_HTML: &str = concat!(
    r#"<main class="font-serif">"#,
    r#"<section class="h-96 bg-cover" aria-label="Warm bakery interior at dawn with flour in the air" style="background-image:url('data:image/png;base64,QkFLRQ==')">"#,
    r#"<h1 class="text-5xl">Crumb &amp; Co.</h1></section>"#,
    r#"<div class="grid grid-cols-3 gap-6">"#,
    r#"<img src="data:image/png;base64,QkFLRQ==" alt="Rustic sourdough boule with a crackled crust" width="400" height="300">"#,
    r#"<img src="data:image/png;base64,QkFLRQ==" alt="Golden butter croissants on parchment" width="400" height="300">"#,
    r#"<img src="https://picsum.photos/400" alt="" width="400">"#,
    r#"</div></main>"#,
);

#[tokio::test(start_paused = true)]
async fn test_bakery_page_end_to_end() {
    let text = Arc::new(bakery_generator().with_latency(Duration::from_millis(50)));
    let images = Arc::new(StaticImageBackend::new(IMAGE));

    let config = GeneratorConfig::new();
    let session = GenerationSession::new(
        0,
        StageSequencer::new(text.clone(), &config),
        ImageRewriter::from_config(ImageSynthesizer::new(images.clone()), &config.image).unwrap(),
    );

    let mut rx = session.subscribe();
    let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let watcher = {
        let observed = observed.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                observed.lock().push((state.progress, state.is_running, state.result));
            }
        })
    };

    let html = session.generate(BAKERY_PROMPT).await.unwrap();
    assert_eq!(html, EXPECTED_HTML);

    // Exactly three calls, each replaying the conversation so far.
    let requests = text.requests();
    assert_eq!(requests.len(), 3);
    let expected_assistant = [BAKERY_OUTLINE, BAKERY_WIREFRAME, BAKERY_FINAL];
    for (i, request) in requests.iter().enumerate() {
        assert_eq!(request.messages.len(), 2 + i);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, config.system_prompt);
        assert_eq!(request.messages[1].role, Role::User);
        assert_eq!(request.messages[1].content, BAKERY_PROMPT);
        for (turn, expected) in request.messages[2..].iter().zip(expected_assistant) {
            assert_eq!(turn.role, Role::Assistant);
            assert_eq!(turn.content, expected);
        }
    }

    let mut prompts = images.prompts();
    prompts.sort();
    assert_eq!(
        prompts,
        vec![
            "Golden butter croissants on parchment",
            "Rustic sourdough boule with a crackled crust",
            "Warm bakery interior at dawn with flour in the air",
        ]
    );

    let state = session.state();
    assert_eq!(state.progress, 100);
    assert!(!state.is_running);
    assert_eq!(state.result, EXPECTED_HTML);

    drop(session);
    watcher.await.unwrap();
    let observed = observed.lock();

    let progress: Vec<u8> = observed.iter().map(|(p, _, _)| *p).collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
    assert!(progress.contains(&33));
    assert!(progress.contains(&66));
    assert!(observed
        .iter()
        .any(|(p, running, result)| *p == 66 && *running && result == BAKERY_WIREFRAME_HTML));
    assert!(observed
        .iter()
        .filter(|(p, _, _)| *p < 100)
        .all(|(_, running, _)| *running));
    assert_eq!(observed.last().map(|(p, running, _)| (*p, *running)), Some((100, false)));
}

#[tokio::test]
async fn test_rerun_overwrites_result() {
    let text = Arc::new(
        bakery_generator()
            .with_response("second outline")
            .with_response("```html\n<p>second</p>\n```")
            .with_response("```html\n<p>third</p>\n```"),
    );
    let config = GeneratorConfig::new();
    let session = GenerationSession::new(
        0,
        StageSequencer::new(text, &config),
        ImageRewriter::new(ImageSynthesizer::new(Arc::new(StaticImageBackend::new(IMAGE)))),
    );

    session.generate(BAKERY_PROMPT).await.unwrap();
    let first_run = session.state().run_id;

    assert_eq!(session.generate("again").await.unwrap(), "<p>third</p>");
    let state = session.state();
    assert_eq!(state.result, "<p>third</p>");
    assert_ne!(state.run_id, first_run);
}
