use chrono::Utc;

use msgsearch::engine::Engine;
use msgsearch::error::EngineError;
use msgsearch::functor::Notice;
use msgsearch::lattice::LatticeConfig;

fn post(engine: &Engine, number: u64, bout: u64, author: &str, text: &str) {
    engine.notify(&Notice::MessagePosted {
        number,
        bout,
        author: author.to_string(),
        text: text.to_string(),
        date: Utc::now(),
    });
}

fn setup() -> Engine {
    let engine = Engine::new(LatticeConfig::default());
    post(&engine, 1, 1, "urn:test:johnny", "hello world");
    post(&engine, 2, 1, "urn:test:jeff", "Hello again");
    post(&engine, 3, 2, "urn:test:johnny", r#"<app xmlns="urn:test:app"/>"#);
    post(&engine, 4, 2, "urn:test:jeff", "goodbye world");
    // malformed markup still gets its words indexed
    post(&engine, 5, 3, "urn:test:johnny", "<broken");
    engine
}

fn found(engine: &Engine, query: &str) -> Vec<u64> {
    engine
        .search(query)
        .unwrap_or_else(|e| panic!("query {} failed: {}", query, e))
}

#[test]
fn words_are_matched_case_insensitively() {
    let engine = setup();
    assert_eq!(found(&engine, r#"(matches "hello")"#), vec![2, 1]);
    assert_eq!(found(&engine, r#"(matches "HELLO World")"#), vec![1]);
    assert_eq!(found(&engine, r#"(matches "broken")"#), vec![5]);
    assert!(found(&engine, r#"(matches "...")"#).is_empty());
}

#[test]
fn attributes_of_posted_messages() {
    let engine = setup();
    assert_eq!(
        found(&engine, r#"(equal $author.name "urn:test:johnny")"#),
        vec![5, 3, 1]
    );
    assert_eq!(found(&engine, "(equal $bout.number 2)"), vec![4, 3]);
    assert_eq!(found(&engine, r#"(author "urn:test:jeff")"#), vec![4, 2]);
    assert_eq!(found(&engine, "(unbundled 1)"), vec![2, 1]);
    assert_eq!(found(&engine, r#"(ns "urn:test:app")"#), vec![3]);
}

#[test]
fn unbundled_names_a_single_bout() {
    let engine = setup();
    assert_eq!(found(&engine, "(unbundled 1)"), found(&engine, "(equal $bout.number 1)"));
    assert_eq!(found(&engine, "(unbundled 3)"), vec![5], "no other bout comes along");
    assert!(found(&engine, "(unbundled 9)").is_empty());
}

#[test]
fn positions_and_bundles() {
    let engine = setup();
    assert_eq!(
        found(
            &engine,
            r#"(limit 20 (and (equal $author.name "urn:test:johnny") (pos 0)))"#
        ),
        vec![5]
    );
    assert_eq!(found(&engine, "(pos 1)"), vec![3, 1]);
    assert_eq!(found(&engine, "(bundled)"), vec![5, 4, 2]);
    assert_eq!(found(&engine, "(unique $author.name)"), vec![5, 4]);
}

#[test]
fn boolean_combinations() {
    let engine = setup();
    assert_eq!(found(&engine, r#"(not (matches "world"))"#), vec![5, 3, 2]);
    assert_eq!(
        found(&engine, r#"(or (matches "hello") (unbundled 2))"#),
        vec![4, 3, 2, 1]
    );
    assert_eq!(found(&engine, "(always)"), vec![5, 4, 3, 2, 1]);
    assert!(found(&engine, "(never)").is_empty());
    assert_eq!(found(&engine, "(and)"), vec![5, 4, 3, 2, 1]);
}

#[test]
fn limit_truncates() {
    let engine = setup();
    assert_eq!(found(&engine, "(limit 2 (always))"), vec![5, 4]);
    assert!(found(&engine, "(limit 0 (always))").is_empty());
    assert_eq!(found(&engine, r#"(limit 1 (matches "world"))"#), vec![4]);
}

#[test]
fn numbers() {
    let engine = setup();
    assert_eq!(found(&engine, "(number 3)"), vec![3]);
    assert!(found(&engine, "(number 99)").is_empty());
    assert!(matches!(
        engine.search("(number 0)"),
        Err(EngineError::InvalidMessage(0))
    ));
}

#[test]
fn seen_renamed_and_deleted() {
    let engine = setup();
    engine.notify(&Notice::MessageSeen {
        number: 2,
        identity: "urn:test:jeff".to_string(),
    });
    assert_eq!(found(&engine, r#"(seen-by "urn:test:jeff")"#), vec![2]);

    engine.notify(&Notice::BoutRenamed {
        bout: 1,
        title: "Greetings".to_string(),
    });
    assert_eq!(found(&engine, r#"(title "Greetings")"#), vec![2, 1]);
    post(&engine, 6, 1, "urn:test:jeff", "late reply");
    assert_eq!(found(&engine, r#"(title "Greetings")"#), vec![6, 2, 1]);
    engine.notify(&Notice::BoutRenamed {
        bout: 1,
        title: "Farewells".to_string(),
    });
    assert!(found(&engine, r#"(title "Greetings")"#).is_empty());

    engine.notify(&Notice::MessageDeleted { number: 3 });
    assert!(found(&engine, r#"(ns "urn:test:app")"#).is_empty());
    assert_eq!(found(&engine, "(always)"), vec![6, 5, 4, 2, 1]);
    assert_eq!(engine.lost([3, 4]).expect("lost"), vec![3]);
    assert!(matches!(engine.lost([4, 0]), Err(EngineError::InvalidMessage(0))));
}

#[test]
fn broken_queries_are_reported() {
    let engine = setup();
    assert!(matches!(engine.search("(and"), Err(EngineError::Parse { .. })));
    assert!(matches!(engine.search("(limit x)"), Err(EngineError::Parse { .. })));
    assert!(matches!(engine.search("(bogus)"), Err(EngineError::Compile { .. })));
    assert!(matches!(engine.search("(limit 2)"), Err(EngineError::Compile { .. })));
    assert!(matches!(
        engine.search(r#"(equal "author.name" 1)"#),
        Err(EngineError::Compile { .. })
    ));
    assert!(matches!(engine.search("(pos -1)"), Err(EngineError::Compile { .. })));
}
