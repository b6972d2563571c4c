//! msgsearch: the search engine behind a conversation service.
//!
//! Messages are identified by monotonically assigned numbers ([`msg::Msg`]).
//! The engine never sees messages themselves; it sees notices about them
//! ("posted", "seen", "bout renamed", "deleted") and answers queries with
//! lists of message numbers, newest first.
//!
//! ## Pieces
//! * [`index`]: inverted indexes, one per attribute, each a bidirectional
//!   multimap between text values and message numbers.
//! * [`triples`]: (message, attribute, value) facts.
//! * [`lattice`]: window-granular bitsets telling a search which ranges of
//!   the number space can't hold a match.
//! * [`term`] and [`predicate`]: compiled query nodes, with containment
//!   and enumeration as separate capabilities.
//! * [`query`]: the s-expression language, e.g.
//!   `(limit 20 (and (equal $author.name "urn:test:johnny") (pos 0)))`.
//! * [`functor`]: notices and the handlers deriving facts from them.
//! * [`persist`]: flat-file form of indexes and triples.
//! * [`engine`]: the facade tying it all together.
//! * [`settings`]: layered configuration for the binary and embedders.
//!
//! ## Example
//! ```
//! use chrono::Utc;
//! use msgsearch::engine::Engine;
//! use msgsearch::functor::Notice;
//! use msgsearch::lattice::LatticeConfig;
//!
//! let engine = Engine::new(LatticeConfig::default());
//! engine.notify(&Notice::MessagePosted {
//!     number: 7,
//!     bout: 1,
//!     author: "urn:test:johnny".into(),
//!     text: "Hello, world".into(),
//!     date: Utc::now(),
//! });
//! assert_eq!(engine.search(r#"(matches "hello")"#).unwrap(), vec![7]);
//! ```
//!
//! ## Concurrency
//! Every structure reachable from an [`engine::Engine`] may be used from
//! many threads at once. Index and triple updates lock per key, never
//! globally. The only single-owner object is the
//! [`lattice::LatticeBuilder`], which lives as long as one compilation.
//!
//! ## Logging
//! The library emits `tracing` events and installs no subscriber; the
//! binary sets one up from the `log.filter` setting or `RUST_LOG`.

pub mod engine;
pub mod error;
pub mod functor;
pub mod index;
pub mod lattice;
pub mod msg;
pub mod persist;
pub mod predicate;
pub mod query;
pub mod settings;
pub mod term;
pub mod triples;
