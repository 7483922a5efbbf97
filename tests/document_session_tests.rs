use std::sync::Arc;
use std::time::Duration;

use papermaster::pdf::{
    BusyNavigation, DocumentEngine, DocumentSession, LayerOrigin, RenderTag, SessionOptions, Zoom,
    render_page,
};
use papermaster::test_utils::fake_engine::{
    FakeDocumentSpec, FakeEngine, FakePageSpec, NativeLayer, settle, text_item,
};

const WAIT: Duration = Duration::from_secs(5);

fn load(engine: &FakeEngine, options: SessionOptions) -> DocumentSession {
    DocumentSession::load(Arc::new(engine.clone()), b"%PDF-1.7".to_vec(), options).unwrap()
}

#[test]
fn rapid_next_page_lands_on_page_three() {
    let (engine, gate) = FakeEngine::gated(FakeDocumentSpec::with_pages(3));
    let mut session = load(&engine, SessionOptions::default());
    assert_eq!(session.page_count(), 3);
    assert_eq!(session.page(), 1);
    assert_eq!(session.scale(), Zoom::DEFAULT_SCALE);

    session.render_page(1);
    session.next_page();
    session.next_page();
    assert_eq!(session.page(), 3);

    gate.release(2);
    assert!(settle(&mut session, WAIT));

    assert_eq!(session.page(), 3);
    assert_eq!(session.current_render().unwrap().tag.page, 3);
    // page 2 was never rendered, page 1 finished but was dropped as stale
    assert_eq!(engine.rendered_pages(), vec![1, 3]);
}

#[test]
fn ignore_mode_drops_navigation_while_loading() {
    let (engine, gate) = FakeEngine::gated(FakeDocumentSpec::with_pages(3));
    let mut session = load(
        &engine,
        SessionOptions {
            busy_navigation: BusyNavigation::Ignore,
            ..SessionOptions::default()
        },
    );

    session.render_page(1);
    session.next_page();
    assert_eq!(session.page(), 1);

    gate.release(1);
    assert!(settle(&mut session, WAIT));
    assert_eq!(session.current_render().unwrap().tag.page, 1);

    session.next_page();
    assert_eq!(session.page(), 2);
    gate.release(1);
    assert!(settle(&mut session, WAIT));
    assert_eq!(engine.rendered_pages(), vec![1, 2]);
}

#[test]
fn navigation_past_either_end_is_a_no_op() {
    let engine = FakeEngine::new(FakeDocumentSpec::with_pages(3));
    let mut session = load(&engine, SessionOptions::default());
    session.render_page(1);
    assert!(settle(&mut session, WAIT));

    session.prev_page();
    assert_eq!(session.page(), 1);
    assert!(!session.is_loading());

    session.render_page(3);
    assert!(settle(&mut session, WAIT));
    let before = session.current_render().cloned().unwrap();

    session.next_page();
    assert_eq!(session.page(), 3);
    assert!(!session.is_loading());
    assert!(Arc::ptr_eq(&before, session.current_render().unwrap()));
    assert_eq!(engine.rendered_pages(), vec![1, 3]);
}

#[test]
fn rendering_same_scale_twice_gives_identical_overlay() {
    let engine = FakeEngine::new(FakeDocumentSpec::with_pages(2));
    let mut session = load(&engine, SessionOptions::default());

    session.set_scale(1.5);
    assert!(settle(&mut session, WAIT));
    let first = session.current_render().unwrap().overlay.clone();

    session.set_scale(1.5);
    assert!(settle(&mut session, WAIT));
    let second = &session.current_render().unwrap().overlay;

    assert_eq!(first.len(), second.len());
    assert_eq!(first.spans, second.spans);
    assert_eq!(session.current_render().unwrap().tag, RenderTag::new(1, 1.5));
}

#[test]
fn scale_is_clamped_to_zoom_bounds() {
    let engine = FakeEngine::new(FakeDocumentSpec::with_pages(1));
    let mut session = load(&engine, SessionOptions::default());

    session.set_scale(10.0);
    assert_eq!(session.scale(), Zoom::MAX_SCALE);
    session.set_scale(0.01);
    assert_eq!(session.scale(), Zoom::MIN_SCALE);
    assert!(settle(&mut session, WAIT));
    assert_eq!(session.current_render().unwrap().tag.scale(), Zoom::MIN_SCALE);
}

#[test]
fn raster_and_overlay_agree_on_logical_size() {
    let engine = FakeEngine::new(FakeDocumentSpec::with_pages(1));
    let doc = engine.open(b"%PDF-1.7").unwrap();

    for scale in [0.5, 0.8, 1.0, 1.3, 2.25, 3.0] {
        for dpr in [1.0, 1.5, 2.0, 3.0] {
            let render = render_page(&*doc, RenderTag::new(1, scale), scale, dpr).unwrap();
            let viewport = render.viewport;

            assert_eq!(render.raster.width_px, (viewport.width * dpr).floor() as u32);
            assert_eq!(render.raster.height_px, (viewport.height * dpr).floor() as u32);
            assert_eq!(render.overlay.width, viewport.width);
            assert_eq!(render.overlay.height, viewport.height);
            assert_eq!(render.raster.css_width, render.overlay.width);
        }
    }
}

#[test]
fn empty_primary_layer_falls_back_to_five_spans() {
    let page = FakePageSpec {
        items: (0..5)
            .map(|i| text_item(&format!("line {i}"), 72.0, 700.0 - i as f32 * 14.0, 12.0))
            .collect(),
        native: NativeLayer::Empty,
        ..FakePageSpec::default()
    };
    let engine = FakeEngine::new(FakeDocumentSpec {
        pages: vec![page],
        title: None,
    });
    let mut session = load(&engine, SessionOptions::default());

    session.render_page(1);
    assert!(settle(&mut session, WAIT));

    let overlay = &session.current_render().unwrap().overlay;
    assert_eq!(overlay.origin, LayerOrigin::Fallback);
    assert_eq!(overlay.len(), 5);
    assert!(overlay.spans.iter().all(|span| span.font_size >= 8.0));
    assert_eq!(overlay.spans[0].text, "line 0");
}

#[test]
fn failed_page_keeps_session_usable() {
    let engine = FakeEngine::new(FakeDocumentSpec::with_pages(3).failing_page(2));
    let mut session = load(&engine, SessionOptions::default());
    session.render_page(1);
    assert!(settle(&mut session, WAIT));

    session.next_page();
    assert!(settle(&mut session, WAIT));
    assert!(session.last_error().is_some());
    assert_eq!(session.current_render().unwrap().tag.page, 1);

    session.next_page();
    assert!(settle(&mut session, WAIT));
    assert_eq!(session.current_render().unwrap().tag.page, 3);
    assert!(session.last_error().is_none());
}

#[test]
fn dropping_a_session_destroys_the_document() {
    let engine = FakeEngine::new(FakeDocumentSpec::with_pages(2));
    let destroyed = engine.destroy_count();
    {
        let mut session = load(&engine, SessionOptions::default());
        session.render_page(1);
        assert!(settle(&mut session, WAIT));
    }
    assert_eq!(destroyed.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn dead_worker_clears_loading_and_keeps_navigation_usable() {
    let engine = FakeEngine::new(FakeDocumentSpec::with_pages(3).panicking_page(2));
    let mut session = load(&engine, SessionOptions::default());
    session.render_page(1);
    assert!(settle(&mut session, WAIT));

    session.next_page();
    assert!(settle(&mut session, WAIT));
    assert!(!session.is_loading());
    assert_eq!(session.last_error(), Some("render worker stopped"));
    assert_eq!(session.current_render().unwrap().tag.page, 1);

    // later requests fail at once instead of queueing for a dead thread
    session.next_page();
    assert_eq!(session.page(), 3);
    assert!(!session.is_loading());
    assert_eq!(session.last_error(), Some("render worker stopped"));

    session.set_scale(2.0);
    assert!(!session.is_loading());
    assert_eq!(session.current_render().unwrap().tag.page, 1);
}
