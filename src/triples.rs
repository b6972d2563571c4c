use std::io::{BufRead, BufWriter, Write};
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::index::OtherHasher;
use crate::msg::{validate, Msg};

// ------------- Triple -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Msg,
    pub predicate: String,
    pub object: String,
}

// ------------- Triples -------------
// Facts are keyed by (subject, predicate); objects keep the order in
// which they were first put, duplicates are dropped.
#[derive(Debug, Default)]
pub struct Triples {
    facts: DashMap<(Msg, String), Vec<String>, OtherHasher>,
}

impl Triples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore<R: BufRead>(source: R) -> Result<Self> {
        let start = Instant::now();
        let triples = Self::new();
        for line in source.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let triple: Triple = serde_json::from_str(&line)?;
            triples.put(triple.subject, &triple.predicate, &triple.object)?;
        }
        debug!(
            facts = triples.facts.len(),
            ms = start.elapsed().as_millis() as u64,
            "restored triples"
        );
        Ok(triples)
    }

    pub fn flush<W: Write>(&self, target: W) -> Result<()> {
        let mut writer = BufWriter::new(target);
        for triple in self.triples() {
            serde_json::to_writer(&mut writer, &triple)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Returns false when the fact was already known.
    pub fn put(&self, subject: Msg, predicate: &str, object: &str) -> Result<bool> {
        validate(subject)?;
        let mut objects = self
            .facts
            .entry((subject, predicate.to_owned()))
            .or_default();
        if objects.iter().any(|known| known == object) {
            return Ok(false);
        }
        objects.push(object.to_owned());
        Ok(true)
    }

    pub fn has(&self, subject: Msg, predicate: &str, object: &str) -> bool {
        self.facts
            .get(&(subject, predicate.to_owned()))
            .is_some_and(|objects| objects.iter().any(|known| known == object))
    }

    /// Lazy walk over the objects known at the time of the call.
    pub fn all(&self, subject: Msg, predicate: &str) -> impl Iterator<Item = String> + use<> {
        self.facts
            .get(&(subject, predicate.to_owned()))
            .map(|objects| objects.value().clone())
            .unwrap_or_default()
            .into_iter()
    }

    pub fn first(&self, subject: Msg, predicate: &str) -> Option<String> {
        self.all(subject, predicate).next()
    }

    /// Every subject holding the fact, newest first.
    pub fn scan(&self, predicate: &str, object: &str) -> Vec<Msg> {
        let mut subjects: Vec<Msg> = self
            .facts
            .iter()
            .filter(|entry| entry.key().1 == predicate)
            .filter(|entry| entry.value().iter().any(|known| known == object))
            .map(|entry| entry.key().0)
            .collect();
        subjects.sort_unstable_by(|a, b| b.cmp(a));
        subjects
    }

    pub fn len(&self) -> usize {
        self.facts.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn triples(&self) -> Vec<Triple> {
        let mut triples: Vec<Triple> = self
            .facts
            .iter()
            .flat_map(|entry| {
                let (subject, predicate) = entry.key().clone();
                entry
                    .value()
                    .iter()
                    .map(|object| Triple {
                        subject,
                        predicate: predicate.clone(),
                        object: object.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        // objects of one pair keep their relative order, the sort is stable
        triples.sort_by(|a, b| (a.subject, &a.predicate).cmp(&(b.subject, &b.predicate)));
        triples
    }
}
