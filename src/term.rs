//! Compiled query nodes and the search walk over them.
//!
//! A [`Term`] declares what it can do through [`Capability`] flags:
//! * `Contains` – it can tell whether a given message matches,
//! * `Enumerate` – it can list all of its matches, newest first.
//!
//! Calling an undeclared capability is a contract violation and fails with
//! [`EngineError::Unsupported`], so callers ask `supports()` first. Every
//! term also carries a [`Lattice`], built when the term is compiled, which
//! tells the search walk which windows of the number space it may skip.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::lattice::{Lattice, LatticeBuilder, LatticeConfig};
use crate::msg::Msg;

/// Matches of a term, newest first.
pub type Cursor<'a> = Box<dyn Iterator<Item = Result<Msg>> + Send + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Contains,
    Enumerate,
}

pub trait Term: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;
    fn supports(&self, capability: Capability) -> bool;
    fn lattice(&self) -> &Lattice;
    fn contains(&self, _msg: Msg) -> Result<bool> {
        Err(EngineError::unsupported(self.name(), "contains"))
    }
    fn enumerate(&self) -> Result<Cursor<'_>> {
        Err(EngineError::unsupported(self.name(), "enumerate"))
    }
    /// True once the term can't match anything anymore, e.g. a reached limit.
    fn exhausted(&self) -> bool {
        false
    }
}

// ------------- AndTerm -------------
#[derive(Debug)]
pub struct AndTerm {
    terms: Vec<Box<dyn Term>>,
    lattice: Lattice,
}

impl AndTerm {
    pub fn new(config: LatticeConfig, terms: Vec<Box<dyn Term>>) -> Self {
        let lattice = LatticeBuilder::new(config)
            .always()
            .and(terms.iter().map(|term| term.lattice()))
            .build();
        Self { terms, lattice }
    }

    // the first enumerable child drives enumeration, the rest filter it
    fn source(&self) -> Option<usize> {
        let source = self
            .terms
            .iter()
            .position(|term| term.supports(Capability::Enumerate))?;
        let rest = self
            .terms
            .iter()
            .enumerate()
            .all(|(pos, term)| pos == source || term.supports(Capability::Contains));
        rest.then_some(source)
    }

    fn others_contain(&self, source: usize, msg: Msg) -> Result<bool> {
        for (pos, term) in self.terms.iter().enumerate() {
            if pos != source && !term.contains(msg)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Term for AndTerm {
    fn name(&self) -> &'static str {
        "and"
    }
    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Contains => self
                .terms
                .iter()
                .all(|term| term.supports(Capability::Contains)),
            Capability::Enumerate => self.source().is_some(),
        }
    }
    fn lattice(&self) -> &Lattice {
        &self.lattice
    }
    fn contains(&self, msg: Msg) -> Result<bool> {
        for term in &self.terms {
            if !term.contains(msg)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
    fn enumerate(&self) -> Result<Cursor<'_>> {
        let source = self
            .source()
            .ok_or_else(|| EngineError::unsupported(self.name(), "enumerate"))?;
        let cursor = self.terms[source].enumerate()?;
        Ok(Box::new(cursor.filter_map(move |item| match item {
            Ok(msg) if self.lattice.is_void(self.lattice.config().bit(msg)) => None,
            Ok(msg) => match self.others_contain(source, msg) {
                Ok(true) => Some(Ok(msg)),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            },
            Err(e) => Some(Err(e)),
        })))
    }
    fn exhausted(&self) -> bool {
        self.terms.iter().any(|term| term.exhausted())
    }
}

// ------------- OrTerm -------------
#[derive(Debug)]
pub struct OrTerm {
    terms: Vec<Box<dyn Term>>,
    lattice: Lattice,
}

impl OrTerm {
    pub fn new(config: LatticeConfig, terms: Vec<Box<dyn Term>>) -> Self {
        let lattice = LatticeBuilder::new(config)
            .never()
            .or(terms.iter().map(|term| term.lattice()))
            .build();
        Self { terms, lattice }
    }
}

impl Term for OrTerm {
    fn name(&self) -> &'static str {
        "or"
    }
    fn supports(&self, capability: Capability) -> bool {
        self.terms.iter().all(|term| term.supports(capability))
    }
    fn lattice(&self) -> &Lattice {
        &self.lattice
    }
    fn contains(&self, msg: Msg) -> Result<bool> {
        for term in &self.terms {
            if term.contains(msg)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
    fn enumerate(&self) -> Result<Cursor<'_>> {
        if !self.supports(Capability::Enumerate) {
            return Err(EngineError::unsupported(self.name(), "enumerate"));
        }
        let mut merged = BTreeSet::new();
        for term in &self.terms {
            for item in term.enumerate()? {
                merged.insert(item?);
            }
        }
        Ok(Box::new(merged.into_iter().rev().map(Ok)))
    }
    fn exhausted(&self) -> bool {
        !self.terms.is_empty() && self.terms.iter().all(|term| term.exhausted())
    }
}

// ------------- NotTerm -------------
// The reverted lattice of the child says where the negation surely has
// matches, never where it surely has none, hence the relax().
#[derive(Debug)]
pub struct NotTerm {
    term: Box<dyn Term>,
    lattice: Lattice,
}

impl NotTerm {
    pub fn new(config: LatticeConfig, term: Box<dyn Term>) -> Self {
        let lattice = LatticeBuilder::new(config)
            .copy(term.lattice())
            .revert()
            .relax()
            .build();
        Self { term, lattice }
    }
}

impl Term for NotTerm {
    fn name(&self) -> &'static str {
        "not"
    }
    fn supports(&self, capability: Capability) -> bool {
        capability == Capability::Contains && self.term.supports(Capability::Contains)
    }
    fn lattice(&self) -> &Lattice {
        &self.lattice
    }
    fn contains(&self, msg: Msg) -> Result<bool> {
        Ok(!self.term.contains(msg)?)
    }
}

// ------------- Search -------------
/// Walk the matches of the term, newest first.
///
/// Enumerable terms produce their own candidates. Anything else is checked
/// message by message against `universe`, which must be sorted in
/// descending order, and a window whose reverse bit is set is jumped over
/// in one step. The walk ends as soon as the term reports itself exhausted.
pub fn search<F>(term: &dyn Term, universe: F) -> Result<Vec<Msg>>
where
    F: FnOnce() -> Vec<Msg>,
{
    let start = Instant::now();
    let lattice = term.lattice();
    let config = *lattice.config();
    let mut found = Vec::new();
    let mut skipped = 0usize;
    if term.supports(Capability::Enumerate) {
        let mut cursor = term.enumerate()?;
        while !term.exhausted() {
            let Some(item) = cursor.next() else {
                break;
            };
            found.push(item?);
        }
    } else if term.supports(Capability::Contains) {
        let candidates = universe();
        let mut position = 0;
        while position < candidates.len() && !term.exhausted() {
            let msg = candidates[position];
            let bit = config.bit(msg);
            if lattice.is_void(bit) {
                let floor = config.floor(bit);
                let jump = candidates[position..].partition_point(|&number| number >= floor);
                position += jump;
                skipped += jump;
                continue;
            }
            if term.contains(msg)? {
                found.push(msg);
            }
            position += 1;
        }
    } else {
        return Err(EngineError::unsupported(term.name(), "contains"));
    }
    debug!(
        term = term.name(),
        found = found.len(),
        skipped,
        us = start.elapsed().as_micros() as u64,
        "search complete"
    );
    Ok(found)
}
