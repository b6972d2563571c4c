//! Notices and the functors that turn them into facts.
//!
//! Whatever happens to messages outside the engine arrives as a
//! [`Notice`]. The [`Functors`] registry maps each [`NoticeKind`] to an
//! ordered list of handlers and runs them synchronously, in registration
//! order, on the caller's thread. A failing functor is logged and skipped;
//! it never stops the functors after it, nor the notices after this one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::Store;
use crate::error::{EngineError, Result};
use crate::index::IndexMap;
use crate::msg::{validate, Msg};

// attributes maintained by the built-in functors
pub const BOUT_NUMBER: &str = "bout.number";
pub const AUTHOR_NAME: &str = "author.name";
pub const MSG_DATE: &str = "msg.date";
pub const TEXT: &str = "text";
pub const NAMESPACE: &str = "xml-namespace";
pub const SEEN_BY: &str = "seen-by";
pub const BOUT_TITLE: &str = "bout.title";

// ------------- Notice -------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Notice {
    MessagePosted {
        number: Msg,
        bout: u64,
        author: String,
        text: String,
        date: DateTime<Utc>,
    },
    MessageSeen {
        number: Msg,
        identity: String,
    },
    BoutRenamed {
        bout: u64,
        title: String,
    },
    MessageDeleted {
        number: Msg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    MessagePosted,
    MessageSeen,
    BoutRenamed,
    MessageDeleted,
}

impl Notice {
    pub fn kind(&self) -> NoticeKind {
        match self {
            Notice::MessagePosted { .. } => NoticeKind::MessagePosted,
            Notice::MessageSeen { .. } => NoticeKind::MessageSeen,
            Notice::BoutRenamed { .. } => NoticeKind::BoutRenamed,
            Notice::MessageDeleted { .. } => NoticeKind::MessageDeleted,
        }
    }
}

// ------------- Functor -------------
pub trait Functor: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;
    /// Kinds of notices the functor wants to see.
    fn kinds(&self) -> &'static [NoticeKind];
    fn see(&self, store: &Store, notice: &Notice) -> Result<()>;
}

// ------------- Functors -------------
#[derive(Debug, Default)]
pub struct Functors {
    registry: HashMap<NoticeKind, Vec<Arc<dyn Functor>>>,
}

impl Functors {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry every engine starts with.
    pub fn with_defaults() -> Self {
        let mut functors = Self::new();
        let defaults: [Arc<dyn Functor>; 9] = [
            Arc::new(NumberFunctor),
            Arc::new(BoutFunctor),
            Arc::new(AuthorFunctor),
            Arc::new(DateFunctor),
            Arc::new(WordsFunctor),
            Arc::new(NamespaceFunctor),
            Arc::new(SeenFunctor),
            Arc::new(TitleFunctor),
            Arc::new(DeleteFunctor),
        ];
        for functor in defaults {
            functors.register(functor);
        }
        functors
    }

    pub fn register(&mut self, functor: Arc<dyn Functor>) {
        for kind in functor.kinds() {
            self.registry
                .entry(*kind)
                .or_default()
                .push(Arc::clone(&functor));
        }
    }

    pub fn listeners(&self, kind: NoticeKind) -> usize {
        self.registry.get(&kind).map_or(0, Vec::len)
    }

    /// Run every functor registered for the kind of the notice and return
    /// how many of them failed.
    pub fn dispatch(&self, store: &Store, notice: &Notice) -> usize {
        let Some(functors) = self.registry.get(&notice.kind()) else {
            debug!(kind = ?notice.kind(), "nobody listens");
            return 0;
        };
        let mut failed = 0;
        for functor in functors {
            if let Err(e) = functor.see(store, notice) {
                failed += 1;
                warn!(functor = functor.name(), kind = ?notice.kind(), error = %e, "functor failed");
            }
        }
        failed
    }
}

// ------------- Built-in functors -------------
#[derive(Debug)]
pub struct NumberFunctor;

impl Functor for NumberFunctor {
    fn name(&self) -> &'static str {
        "number"
    }
    fn kinds(&self) -> &'static [NoticeKind] {
        &[NoticeKind::MessagePosted]
    }
    fn see(&self, store: &Store, notice: &Notice) -> Result<()> {
        if let Notice::MessagePosted { number, .. } = notice {
            store.indexes().touch(*number)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct BoutFunctor;

impl Functor for BoutFunctor {
    fn name(&self) -> &'static str {
        "bout"
    }
    fn kinds(&self) -> &'static [NoticeKind] {
        &[NoticeKind::MessagePosted]
    }
    fn see(&self, store: &Store, notice: &Notice) -> Result<()> {
        if let Notice::MessagePosted { number, bout, .. } = notice {
            attach(store, *number, BOUT_NUMBER, &bout.to_string())?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct AuthorFunctor;

impl Functor for AuthorFunctor {
    fn name(&self) -> &'static str {
        "author"
    }
    fn kinds(&self) -> &'static [NoticeKind] {
        &[NoticeKind::MessagePosted]
    }
    fn see(&self, store: &Store, notice: &Notice) -> Result<()> {
        if let Notice::MessagePosted { number, author, .. } = notice {
            attach(store, *number, AUTHOR_NAME, author)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct DateFunctor;

impl Functor for DateFunctor {
    fn name(&self) -> &'static str {
        "date"
    }
    fn kinds(&self) -> &'static [NoticeKind] {
        &[NoticeKind::MessagePosted]
    }
    fn see(&self, store: &Store, notice: &Notice) -> Result<()> {
        if let Notice::MessagePosted { number, date, .. } = notice {
            store.triples().put(*number, MSG_DATE, &date.to_rfc3339())?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct WordsFunctor;

impl Functor for WordsFunctor {
    fn name(&self) -> &'static str {
        "words"
    }
    fn kinds(&self) -> &'static [NoticeKind] {
        &[NoticeKind::MessagePosted]
    }
    fn see(&self, store: &Store, notice: &Notice) -> Result<()> {
        if let Notice::MessagePosted { number, text, .. } = notice {
            let index = store.indexes().index(TEXT)?;
            for word in words(text) {
                index.add(*number, &word)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct NamespaceFunctor;

impl Functor for NamespaceFunctor {
    fn name(&self) -> &'static str {
        "namespace"
    }
    fn kinds(&self) -> &'static [NoticeKind] {
        &[NoticeKind::MessagePosted]
    }
    fn see(&self, store: &Store, notice: &Notice) -> Result<()> {
        if let Notice::MessagePosted { number, text, .. } = notice {
            if let Some(namespace) = namespace(text)? {
                store.indexes().index(NAMESPACE)?.replace(*number, &namespace)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct SeenFunctor;

impl Functor for SeenFunctor {
    fn name(&self) -> &'static str {
        "seen"
    }
    fn kinds(&self) -> &'static [NoticeKind] {
        &[NoticeKind::MessageSeen]
    }
    fn see(&self, store: &Store, notice: &Notice) -> Result<()> {
        if let Notice::MessageSeen { number, identity } = notice {
            store.indexes().index(SEEN_BY)?.add(*number, identity)?;
        }
        Ok(())
    }
}

// A renamed bout retitles every message it holds, and a message posted
// into a titled bout inherits the title of its siblings.
#[derive(Debug)]
pub struct TitleFunctor;

impl Functor for TitleFunctor {
    fn name(&self) -> &'static str {
        "title"
    }
    fn kinds(&self) -> &'static [NoticeKind] {
        &[NoticeKind::BoutRenamed, NoticeKind::MessagePosted]
    }
    fn see(&self, store: &Store, notice: &Notice) -> Result<()> {
        let indexes = store.indexes();
        match notice {
            Notice::BoutRenamed { bout, title } => {
                let titles = indexes.index(BOUT_TITLE)?;
                for msg in members(indexes, *bout) {
                    titles.replace(msg, title)?;
                }
            }
            Notice::MessagePosted { number, bout, .. } => {
                let Some(titles) = indexes.get(BOUT_TITLE) else {
                    return Ok(());
                };
                for sibling in members(indexes, *bout) {
                    if sibling == *number {
                        continue;
                    }
                    if let Some(title) = titles.first(sibling)? {
                        titles.replace(*number, &title)?;
                        break;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct DeleteFunctor;

impl Functor for DeleteFunctor {
    fn name(&self) -> &'static str {
        "delete"
    }
    fn kinds(&self) -> &'static [NoticeKind] {
        &[NoticeKind::MessageDeleted]
    }
    fn see(&self, store: &Store, notice: &Notice) -> Result<()> {
        if let Notice::MessageDeleted { number } = notice {
            store.indexes().clean(*number)?;
        }
        Ok(())
    }
}

// the triple answers `equal`, the index gives its lattice
fn attach(store: &Store, msg: Msg, attribute: &str, value: &str) -> Result<()> {
    validate(msg)?;
    store.triples().put(msg, attribute, value)?;
    store.indexes().index(attribute)?.add(msg, value)
}

fn members(indexes: &IndexMap, bout: u64) -> Vec<Msg> {
    indexes
        .get(BOUT_NUMBER)
        .map(|index| index.msgs(&bout.to_string()))
        .unwrap_or_default()
}

// ------------- Text helpers -------------
lazy_static! {
    static ref WORD: Regex = Regex::new(r"[\p{L}\p{N}]+").unwrap();
}

/// Distinct lower-cased words of the text, in order of appearance.
pub fn words(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for word in WORD.find_iter(text) {
        let word = word.as_str().to_lowercase();
        if !found.contains(&word) {
            found.push(word);
        }
    }
    found
}

/// Namespace of the root element when the text is markup. Plain text
/// gives `None`, markup that can't be made sense of is an error.
pub fn namespace(text: &str) -> Result<Option<String>> {
    let trimmed = text.trim();
    if !trimmed.starts_with('<') {
        return Ok(None);
    }
    let mut reader = NsReader::from_str(trimmed);
    reader.check_end_names(true);
    let mut root: Option<Option<String>> = None;
    let mut depth = 0usize;
    loop {
        let (resolved, event) = reader
            .read_resolved_event()
            .map_err(|e| EngineError::Markup(e.to_string()))?;
        match event {
            Event::Start(_) | Event::Empty(_) => {
                if depth == 0 && root.is_some() {
                    return Err(EngineError::Markup("more than one root element".to_owned()));
                }
                let namespace = match resolved {
                    ResolveResult::Bound(Namespace(urn)) => {
                        Some(String::from_utf8_lossy(urn).into_owned())
                    }
                    ResolveResult::Unbound => None,
                    ResolveResult::Unknown(prefix) => {
                        return Err(EngineError::Markup(format!(
                            "prefix {:?} is not declared",
                            String::from_utf8_lossy(&prefix)
                        )));
                    }
                };
                if root.is_none() {
                    root = Some(namespace);
                }
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Text(text) if depth == 0 => {
                if text.iter().any(|byte| !byte.is_ascii_whitespace()) {
                    return Err(EngineError::Markup("text outside the root element".to_owned()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if depth > 0 {
        return Err(EngineError::Markup("unterminated document".to_owned()));
    }
    match root {
        Some(namespace) => Ok(namespace.filter(|urn| !urn.is_empty())),
        None => Err(EngineError::Markup("no root element".to_owned())),
    }
}
