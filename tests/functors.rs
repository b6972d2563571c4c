use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use msgsearch::engine::{Engine, Store};
use msgsearch::error::{EngineError, Result};
use msgsearch::functor::{
    Functor, Functors, Notice, NoticeKind, AUTHOR_NAME, BOUT_NUMBER, MSG_DATE, NAMESPACE, TEXT,
};
use msgsearch::lattice::LatticeConfig;

fn posted(number: u64, text: &str) -> Notice {
    Notice::MessagePosted {
        number,
        bout: 4,
        author: "urn:test:johnny".to_string(),
        text: text.to_string(),
        date: Utc.with_ymd_and_hms(2012, 3, 14, 9, 26, 53).unwrap(),
    }
}

#[derive(Debug, Default)]
struct Counter {
    calls: AtomicUsize,
}

impl Functor for Counter {
    fn name(&self) -> &'static str {
        "counter"
    }
    fn kinds(&self) -> &'static [NoticeKind] {
        &[NoticeKind::MessagePosted, NoticeKind::MessageSeen]
    }
    fn see(&self, _store: &Store, _notice: &Notice) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
struct Failing;

impl Functor for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }
    fn kinds(&self) -> &'static [NoticeKind] {
        &[NoticeKind::MessagePosted]
    }
    fn see(&self, _store: &Store, _notice: &Notice) -> Result<()> {
        Err(EngineError::Markup("always broken".to_string()))
    }
}

#[test]
fn posted_message_becomes_facts() {
    let store = Store::default();
    let failed = Functors::with_defaults().dispatch(&store, &posted(12, "Hi <b>there</b>"));
    assert_eq!(failed, 0);
    assert_eq!(store.indexes().all(), vec![12]);
    assert!(store.triples().has(12, BOUT_NUMBER, "4"));
    assert!(store.triples().has(12, AUTHOR_NAME, "urn:test:johnny"));
    assert_eq!(
        store.triples().first(12, MSG_DATE),
        Some("2012-03-14T09:26:53+00:00".to_string())
    );
    let text = store.indexes().get(TEXT).expect("text index");
    assert_eq!(text.values(12).expect("values"), vec!["b", "hi", "there"]);
    assert!(store.indexes().get(NAMESPACE).is_none(), "plain text has no namespace");
}

#[test]
fn malformed_markup_is_logged_and_skipped() {
    let store = Store::default();
    let functors = Functors::with_defaults();
    let failed = functors.dispatch(&store, &posted(7, r#"<x:doc xmlns:y="urn:test:y">"#));
    assert_eq!(failed, 1, "only the namespace functor fails");
    assert_eq!(store.indexes().all(), vec![7], "the functors after it still ran");
    assert!(store.indexes().get(TEXT).expect("text").has(7, "doc").expect("valid msg"));
    let failed = functors.dispatch(&store, &posted(9, r#"<doc xmlns="urn:test:bad"><p></doc>"#));
    assert_eq!(failed, 1, "mismatched end tags are malformed too");
    assert!(store.indexes().get(NAMESPACE).is_none_or(|ns| ns.msgs("urn:test:bad").is_empty()));
    let failed = functors.dispatch(&store, &posted(8, r#"<doc xmlns="urn:test:ok"/>"#));
    assert_eq!(failed, 0);
    assert_eq!(store.indexes().get(NAMESPACE).expect("ns").msgs("urn:test:ok"), vec![8]);
}

#[test]
fn registry_dispatches_in_order_and_survives_failures() {
    let counter = Arc::new(Counter::default());
    let mut functors = Functors::new();
    functors.register(Arc::new(Failing));
    functors.register(Arc::clone(&counter) as Arc<dyn Functor>);
    assert_eq!(functors.listeners(NoticeKind::MessagePosted), 2);
    assert_eq!(functors.listeners(NoticeKind::MessageSeen), 1);
    assert_eq!(functors.listeners(NoticeKind::BoutRenamed), 0);
    let store = Store::default();
    assert_eq!(functors.dispatch(&store, &posted(1, "x")), 1);
    let seen = Notice::MessageSeen {
        number: 1,
        identity: "urn:test:jeff".to_string(),
    };
    assert_eq!(functors.dispatch(&store, &seen), 0);
    let deleted = Notice::MessageDeleted { number: 1 };
    assert_eq!(functors.dispatch(&store, &deleted), 0, "nobody listens");
    assert_eq!(counter.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn engine_runs_extra_functors_after_the_built_in_ones() {
    let counter = Arc::new(Counter::default());
    let mut engine = Engine::new(LatticeConfig::default());
    engine.register(Arc::clone(&counter) as Arc<dyn Functor>);
    engine.notify(&posted(3, "hey"));
    assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.search(r#"(matches "hey")"#).expect("search"), vec![3]);
}

#[test]
fn notices_read_from_json() {
    let notice: Notice = serde_json::from_str(
        r#"{"kind":"message-posted","number":9,"bout":2,"author":"urn:test:a","text":"hi","date":"2012-03-14T09:26:53Z"}"#,
    )
    .expect("json");
    assert_eq!(notice.kind(), NoticeKind::MessagePosted);
    let notice: Notice =
        serde_json::from_str(r#"{"kind":"bout-renamed","bout":2,"title":"Plans"}"#).expect("json");
    assert_eq!(
        notice,
        Notice::BoutRenamed {
            bout: 2,
            title: "Plans".to_string()
        }
    );
}
