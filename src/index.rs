//! Inverted index: text values to the message numbers carrying them.
//!
//! Every [`Index`] is one bidirectional multimap. The forward side maps a
//! value to the set of messages (served newest first), the reverse side
//! maps a message to its values. Both sides change only through the
//! mutation methods below, which keep them mutual inverses.
//!
//! Locking is per key. An operation on a message holds that message's
//! reverse entry for its whole duration and touches the forward entry of
//! each value only briefly, always in that order, so concurrent callers
//! never deadlock and operations on one message are serialized.

use std::collections::BTreeSet;
use std::hash::BuildHasherDefault;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use roaring::RoaringTreemap;
use seahash::SeaHasher;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::lattice::{Lattice, LatticeBuilder, LatticeConfig};
use crate::msg::{validate, Msg};
use crate::persist;

pub type MsgHasher = BuildHasherDefault<SeaHasher>;
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

// ------------- Index -------------
#[derive(Debug, Default)]
pub struct Index {
    forward: DashMap<String, RoaringTreemap, OtherHasher>,
    reverse: DashMap<Msg, BTreeSet<String>, MsgHasher>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index from its flushed form; the reverse side is derived
    /// by inverting the forward side before the index is handed out.
    pub fn restore<R: BufRead>(source: R) -> Result<Self> {
        let start = Instant::now();
        let index = Self::new();
        for (value, numbers) in persist::read_index(source)? {
            let mut set = RoaringTreemap::new();
            for number in numbers {
                set.insert(number);
                index
                    .reverse
                    .entry(number)
                    .or_default()
                    .insert(value.clone());
            }
            index.forward.insert(value, set);
        }
        debug!(
            values = index.forward.len(),
            ms = start.elapsed().as_millis() as u64,
            "restored index"
        );
        Ok(index)
    }

    /// Write the forward side; values without messages are left out.
    pub fn flush<W: Write>(&self, target: W) -> Result<()> {
        let start = Instant::now();
        let mut entries: Vec<(String, Vec<Msg>)> = self
            .forward
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| (entry.key().clone(), descending(entry.value())))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        persist::write_index(target, &entries)?;
        debug!(
            values = entries.len(),
            ms = start.elapsed().as_millis() as u64,
            "flushed index"
        );
        Ok(())
    }

    pub fn add(&self, msg: Msg, value: &str) -> Result<()> {
        validate(msg)?;
        let mut texts = self.reverse.entry(msg).or_default();
        self.link(msg, value);
        texts.insert(value.to_owned());
        Ok(())
    }

    pub fn delete(&self, msg: Msg, value: &str) -> Result<()> {
        validate(msg)?;
        if let Some(mut texts) = self.reverse.get_mut(&msg) {
            if let Some(mut numbers) = self.forward.get_mut(value) {
                numbers.remove(msg);
            }
            texts.remove(value);
        }
        Ok(())
    }

    /// Same as `clean()` followed by `add()`, but nobody can observe the
    /// message in between.
    pub fn replace(&self, msg: Msg, value: &str) -> Result<()> {
        validate(msg)?;
        let mut texts = self.reverse.entry(msg).or_default();
        self.unlink(msg, &mut texts);
        self.link(msg, value);
        texts.insert(value.to_owned());
        Ok(())
    }

    pub fn clean(&self, msg: Msg) -> Result<()> {
        validate(msg)?;
        if let Some(mut texts) = self.reverse.get_mut(&msg) {
            self.unlink(msg, &mut texts);
        }
        Ok(())
    }

    pub fn values(&self, msg: Msg) -> Result<Vec<String>> {
        validate(msg)?;
        Ok(self
            .reverse
            .get(&msg)
            .map(|texts| texts.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// The smallest value of the message, if it has any.
    pub fn first(&self, msg: Msg) -> Result<Option<String>> {
        validate(msg)?;
        Ok(self
            .reverse
            .get(&msg)
            .and_then(|texts| texts.first().cloned()))
    }

    /// Messages carrying the value, newest first.
    pub fn msgs(&self, value: &str) -> Vec<Msg> {
        self.forward
            .get(value)
            .map(|numbers| descending(&numbers))
            .unwrap_or_default()
    }

    pub fn has(&self, msg: Msg, value: &str) -> Result<bool> {
        validate(msg)?;
        Ok(self
            .forward
            .get(value)
            .is_some_and(|numbers| numbers.contains(msg)))
    }

    /// Candidates that have no values recorded at all.
    pub fn lost<I>(&self, candidates: I) -> Result<Vec<Msg>>
    where
        I: IntoIterator<Item = Msg>,
    {
        let mut lost = Vec::new();
        for number in candidates {
            validate(number)?;
            if self.reverse.get(&number).is_none_or(|texts| texts.is_empty()) {
                lost.push(number);
            }
        }
        Ok(lost)
    }

    /// Every message with at least one value, newest first.
    pub fn numbers(&self) -> Vec<Msg> {
        let mut numbers: Vec<Msg> = self
            .reverse
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| *entry.key())
            .collect();
        numbers.sort_unstable_by(|a, b| b.cmp(a));
        numbers
    }

    pub fn lattice(&self, value: &str, config: LatticeConfig) -> Lattice {
        LatticeBuilder::new(config).fill(&self.msgs(value)).build()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    fn link(&self, msg: Msg, value: &str) {
        match self.forward.get_mut(value) {
            Some(mut numbers) => {
                numbers.insert(msg);
            }
            None => {
                self.forward
                    .entry(value.to_owned())
                    .or_insert_with(RoaringTreemap::new)
                    .insert(msg);
            }
        }
    }

    fn unlink(&self, msg: Msg, texts: &mut BTreeSet<String>) {
        for value in texts.iter() {
            if let Some(mut numbers) = self.forward.get_mut(value) {
                numbers.remove(msg);
            }
        }
        texts.clear();
    }
}

fn descending(numbers: &RoaringTreemap) -> Vec<Msg> {
    let mut out: Vec<Msg> = numbers.iter().collect();
    out.reverse();
    out
}

// ------------- IndexMap -------------
// One index per attribute; attribute names double as file names.
#[derive(Debug, Default)]
pub struct IndexMap {
    indexes: DashMap<String, Arc<Index>, OtherHasher>,
}

impl IndexMap {
    /// Attribute under which every known message is registered.
    pub const NUMBER: &'static str = "number";

    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the index of the attribute.
    pub fn index(&self, attribute: &str) -> Result<Arc<Index>> {
        if let Some(index) = self.indexes.get(attribute) {
            return Ok(Arc::clone(&index));
        }
        check_attribute(attribute)?;
        Ok(Arc::clone(
            &self
                .indexes
                .entry(attribute.to_owned())
                .or_insert_with(|| Arc::new(Index::new())),
        ))
    }

    /// Existing index of the attribute, never creates one.
    pub fn get(&self, attribute: &str) -> Option<Arc<Index>> {
        self.indexes.get(attribute).map(|index| Arc::clone(&index))
    }

    pub(crate) fn insert(&self, attribute: &str, index: Index) -> Result<()> {
        check_attribute(attribute)?;
        self.indexes.insert(attribute.to_owned(), Arc::new(index));
        Ok(())
    }

    /// Register the message as existing.
    pub fn touch(&self, msg: Msg) -> Result<()> {
        self.index(Self::NUMBER)?.replace(msg, &msg.to_string())
    }

    /// Every touched message, newest first.
    pub fn all(&self) -> Vec<Msg> {
        self.get(Self::NUMBER)
            .map(|index| index.numbers())
            .unwrap_or_default()
    }

    /// Candidates that were never touched.
    pub fn lost<I>(&self, candidates: I) -> Result<Vec<Msg>>
    where
        I: IntoIterator<Item = Msg>,
    {
        match self.get(Self::NUMBER) {
            Some(index) => index.lost(candidates),
            None => candidates.into_iter().map(validate).collect(),
        }
    }

    /// Remove the message from every attribute.
    pub fn clean(&self, msg: Msg) -> Result<()> {
        validate(msg)?;
        for index in self.snapshot() {
            index.clean(msg)?;
        }
        Ok(())
    }

    pub fn attributes(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .indexes
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort_unstable();
        names
    }

    fn snapshot(&self) -> Vec<Arc<Index>> {
        self.indexes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

pub(crate) fn check_attribute(attribute: &str) -> Result<()> {
    let valid = !attribute.is_empty()
        && !attribute.starts_with('.')
        && attribute
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidAttribute(attribute.to_owned()))
    }
}
