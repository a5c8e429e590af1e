use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use dompick::app::filters::FilterSynthesizer;
use dompick::app::host::DocumentHost;
use dompick::app::picker::{
    Dispatch, PickCommit, PickRequest, PickerController, PickerState, PointerEvent,
};
use dompick::app::report::ElementReport;
use dompick::app::selector;
use dompick::infra::config::Config;
use dompick::infra::snapshot;

fn host() -> DocumentHost {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/article.json");
    let document = snapshot::load(&path).unwrap();
    DocumentHost::new(document, &Config::default().picker)
}

#[test]
fn hover_then_click_delivers_one_commit() {
    let mut host = host();
    let document = host.document().clone();
    let heading = selector::resolve_path(&document, "#main > article > h2").unwrap();
    let heading_text = document.children(heading)[0];
    let aside = selector::resolve_path(&document, "#main > aside").unwrap();

    let commits: Rc<RefCell<Vec<PickCommit>>> = Rc::default();
    let sink = Rc::clone(&commits);
    let mut picker = PickerController::new();
    assert!(picker.start(&mut host, PickRequest::new("filters"), move |commit| {
        sink.borrow_mut().push(commit)
    }));
    assert_eq!(host.cursor(), Some("crosshair"));

    picker.handle(&mut host, PointerEvent::Move { target: heading_text });
    assert_eq!(host.highlighted(), vec![heading]);

    picker.handle(&mut host, PointerEvent::Move { target: aside });
    assert_eq!(host.highlighted(), vec![aside]);

    let dispatch = picker.handle(&mut host, PointerEvent::Click { target: aside });
    assert_eq!(dispatch, Dispatch::Consumed);
    assert_eq!(picker.state(), PickerState::Idle);
    assert!(host.highlighted().is_empty());
    assert_eq!(host.cursor(), None);
    assert_eq!(host.listener_sets(), 0);

    let commits = commits.borrow();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].node, aside);
    assert_eq!(commits[0].source, "filters");

    let report = ElementReport::build(
        host.document(),
        commits[0].node,
        "news.example.com",
        &FilterSynthesizer::default(),
    )
    .unwrap()
    .unwrap();
    assert_eq!(report.path, "#main > aside");
    assert_eq!(report.classes, vec!["promo", "sponsored"]);
}

#[test]
fn toolbar_is_never_picked() {
    let mut host = host();
    let document = host.document().clone();
    let button = selector::resolve_path(&document, "html > body > div:nth-of-type(2) > button")
        .unwrap();

    let mut picker = PickerController::new();
    picker.start(&mut host, PickRequest::new("inspector"), |_| {
        panic!("chrome clicks must not commit")
    });

    picker.handle(&mut host, PointerEvent::Move { target: button });
    assert!(host.highlighted().is_empty());
    assert_eq!(
        picker.handle(&mut host, PointerEvent::Click { target: button }),
        Dispatch::Continue
    );
    assert!(picker.is_active());

    assert!(picker.stop(&mut host));
    assert_eq!(host.listener_sets(), 0);
}
