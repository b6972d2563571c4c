use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;

use msgsearch::engine::Engine;
use msgsearch::error::Result;
use msgsearch::functor::Notice;
use msgsearch::lattice::{Lattice, LatticeConfig};
use msgsearch::msg::Msg;
use msgsearch::term::{AndTerm, Capability, Term};

// Counts how often the search asks about single messages.
#[derive(Debug)]
struct Counted {
    term: Box<dyn Term>,
    calls: Arc<AtomicUsize>,
}

impl Counted {
    fn new(term: Box<dyn Term>) -> Self {
        Self {
            term,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
    // keeps counting after the term is handed to a compound
    fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Term for Counted {
    fn name(&self) -> &'static str {
        "counted"
    }
    fn supports(&self, capability: Capability) -> bool {
        capability == Capability::Contains && self.term.supports(capability)
    }
    fn lattice(&self) -> &Lattice {
        self.term.lattice()
    }
    fn contains(&self, msg: Msg) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.term.contains(msg)
    }
    fn exhausted(&self) -> bool {
        self.term.exhausted()
    }
}

// 79 messages over eight windows of ten; only 75 and 5 are by "x"
fn setup() -> Engine {
    let engine = Engine::new(LatticeConfig::new(8, 10));
    for number in 1..=79u64 {
        let author = if number == 75 || number == 5 { "urn:test:x" } else { "urn:test:y" };
        engine.notify(&Notice::MessagePosted {
            number,
            bout: 1,
            author: author.to_string(),
            text: "hay".to_string(),
            date: Utc::now(),
        });
    }
    engine
}

#[test]
fn void_windows_are_never_visited() {
    let engine = setup();
    let counted = Counted::new(engine.compile(r#"(equal $author.name "urn:test:x")"#).expect("compile"));
    let found = engine.search_term(&counted).expect("search");
    assert_eq!(found, vec![75, 5]);
    // 70..79 and 1..9 are checked, the six windows in between are jumped
    assert_eq!(counted.calls(), 19);
}

#[test]
fn reached_limit_stops_the_walk() {
    let engine = setup();
    let counted = Counted::new(
        engine
            .compile(r#"(limit 1 (equal $author.name "urn:test:x"))"#)
            .expect("compile"),
    );
    assert_eq!(engine.search_term(&counted).expect("search"), vec![75]);
    assert_eq!(counted.calls(), 5, "79 down to 75");
}

#[test]
fn negation_never_skips() {
    let engine = setup();
    let counted = Counted::new(
        engine
            .compile(r#"(not (equal $author.name "urn:test:y"))"#)
            .expect("compile"),
    );
    assert_eq!(engine.search_term(&counted).expect("search"), vec![75, 5]);
    assert_eq!(counted.calls(), 79);
}

#[test]
fn and_skips_windows_void_in_any_operand() {
    let engine = setup();
    let counted = Counted::new(
        engine
            .compile(r#"(and (equal $author.name "urn:test:x") (equal $bout.number 1))"#)
            .expect("compile"),
    );
    assert_eq!(engine.search_term(&counted).expect("search"), vec![75, 5]);
    assert_eq!(counted.calls(), 19);
}

#[test]
fn enumerated_and_drops_void_windows_before_filtering() {
    let engine = setup();
    let config = *engine.config();
    let author = Counted::new(
        engine
            .compile(r#"(equal $author.name "urn:test:x")"#)
            .expect("compile"),
    );
    let calls = author.counter();
    let and = AndTerm::new(
        config,
        vec![
            engine.compile(r#"(matches "hay")"#).expect("compile"),
            Box::new(author),
        ],
    );
    assert!(and.supports(Capability::Enumerate), "the matcher drives the walk");
    assert_eq!(engine.search_term(&and).expect("search"), vec![75, 5]);
    assert_eq!(calls.load(Ordering::SeqCst), 19);
}
