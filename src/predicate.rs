// Built-in terms of the query language.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashSet;

use crate::engine::Store;
use crate::error::Result;
use crate::functor::BOUT_NUMBER;
use crate::index::{Index, OtherHasher};
use crate::lattice::{Lattice, LatticeBuilder, LatticeConfig};
use crate::msg::{validate, Msg};
use crate::term::{Capability, Cursor, Term};

// ------------- Quota -------------
/// Counter of admitted matches that never goes past its limit, however
/// many threads ask at once.
#[derive(Debug)]
pub struct Quota {
    limit: usize,
    passed: AtomicUsize,
}

impl Quota {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            passed: AtomicUsize::new(0),
        }
    }
    pub fn admit(&self) -> bool {
        self.passed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |passed| {
                (passed < self.limit).then_some(passed + 1)
            })
            .is_ok()
    }
    pub fn passed(&self) -> usize {
        self.passed.load(Ordering::SeqCst)
    }
    pub fn full(&self) -> bool {
        self.passed() >= self.limit
    }
}

// ------------- Seen -------------
/// Keys already admitted; only the first caller of each key wins.
#[derive(Debug, Default)]
pub struct Seen {
    keys: DashSet<String, OtherHasher>,
}

impl Seen {
    pub fn first(&self, key: &str) -> bool {
        self.keys.insert(key.to_owned())
    }
    pub fn len(&self) -> usize {
        self.keys.len()
    }
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn always(config: LatticeConfig) -> Lattice {
    LatticeBuilder::new(config).always().build()
}

fn never(config: LatticeConfig) -> Lattice {
    LatticeBuilder::new(config).never().build()
}

// ------------- MatcherTerm -------------
// Means "(ns 'urn:foo')", "(matches 'hello')" and friends: messages
// carrying the value in the index of the attribute.
#[derive(Debug)]
pub struct MatcherTerm {
    name: &'static str,
    index: Option<Arc<Index>>,
    value: String,
    lattice: Lattice,
}

impl MatcherTerm {
    pub fn new(name: &'static str, store: &Store, attribute: &str, value: &str, config: LatticeConfig) -> Self {
        let index = store.indexes().get(attribute);
        let lattice = match &index {
            Some(index) => index.lattice(value, config),
            None => never(config),
        };
        Self {
            name,
            index,
            value: value.to_owned(),
            lattice,
        }
    }
}

impl Term for MatcherTerm {
    fn name(&self) -> &'static str {
        self.name
    }
    fn supports(&self, _capability: Capability) -> bool {
        true
    }
    fn lattice(&self) -> &Lattice {
        &self.lattice
    }
    fn contains(&self, msg: Msg) -> Result<bool> {
        validate(msg)?;
        match &self.index {
            Some(index) => index.has(msg, &self.value),
            None => Ok(false),
        }
    }
    fn enumerate(&self) -> Result<Cursor<'_>> {
        let numbers = self
            .index
            .as_ref()
            .map(|index| index.msgs(&self.value))
            .unwrap_or_default();
        Ok(Box::new(numbers.into_iter().map(Ok)))
    }
}

// ------------- EqualPred -------------
// Means "(equal $author.name 'urn:test:johnny')". The functors keep the
// indexed attributes in step with the triples, so the index, when there
// is one, gives the lattice.
#[derive(Debug)]
pub struct EqualPred {
    store: Store,
    attribute: String,
    value: String,
    lattice: Lattice,
}

impl EqualPred {
    pub fn new(store: &Store, attribute: &str, value: &str, config: LatticeConfig) -> Self {
        let lattice = match store.indexes().get(attribute) {
            Some(index) => index.lattice(value, config),
            None => always(config),
        };
        Self {
            store: store.clone(),
            attribute: attribute.to_owned(),
            value: value.to_owned(),
            lattice,
        }
    }
}

impl Term for EqualPred {
    fn name(&self) -> &'static str {
        "equal"
    }
    fn supports(&self, capability: Capability) -> bool {
        capability == Capability::Contains
    }
    fn lattice(&self) -> &Lattice {
        &self.lattice
    }
    fn contains(&self, msg: Msg) -> Result<bool> {
        Ok(self.store.triples().has(msg, &self.attribute, &self.value))
    }
}

// ------------- PosPred -------------
// Means "(pos 0)": the message is the newest one of its bout.
#[derive(Debug)]
pub struct PosPred {
    store: Store,
    position: usize,
    lattice: Lattice,
}

impl PosPred {
    pub fn new(store: &Store, position: usize, config: LatticeConfig) -> Self {
        Self {
            store: store.clone(),
            position,
            lattice: always(config),
        }
    }
}

impl Term for PosPred {
    fn name(&self) -> &'static str {
        "pos"
    }
    fn supports(&self, capability: Capability) -> bool {
        capability == Capability::Contains
    }
    fn lattice(&self) -> &Lattice {
        &self.lattice
    }
    fn contains(&self, msg: Msg) -> Result<bool> {
        let Some(bout) = self.store.triples().first(msg, BOUT_NUMBER) else {
            return Ok(false);
        };
        let Some(index) = self.store.indexes().get(BOUT_NUMBER) else {
            return Ok(false);
        };
        Ok(index.msgs(&bout).get(self.position) == Some(&msg))
    }
}

// ------------- UniquePred -------------
// Means "(unique $bout.number)": only the first message seen for every
// value of the attribute passes. Every call records the key, so asking
// twice about the same message gives different answers.
#[derive(Debug)]
pub struct UniquePred {
    store: Store,
    attribute: String,
    seen: Seen,
    lattice: Lattice,
}

impl UniquePred {
    pub fn new(store: &Store, attribute: &str, config: LatticeConfig) -> Self {
        Self {
            store: store.clone(),
            attribute: attribute.to_owned(),
            seen: Seen::default(),
            lattice: always(config),
        }
    }
}

impl Term for UniquePred {
    fn name(&self) -> &'static str {
        "unique"
    }
    fn supports(&self, capability: Capability) -> bool {
        capability == Capability::Contains
    }
    fn lattice(&self) -> &Lattice {
        &self.lattice
    }
    fn contains(&self, msg: Msg) -> Result<bool> {
        Ok(match self.store.triples().first(msg, &self.attribute) {
            Some(key) => self.seen.first(&key),
            None => false,
        })
    }
}

// ------------- LimitTerm -------------
// Means "(limit 20 (...))": matches of the inner term, but no more than
// the limit of them.
#[derive(Debug)]
pub struct LimitTerm {
    quota: Quota,
    term: Box<dyn Term>,
    lattice: Lattice,
}

impl LimitTerm {
    pub fn new(config: LatticeConfig, limit: usize, term: Box<dyn Term>) -> Self {
        let lattice = LatticeBuilder::new(config).copy(term.lattice()).build();
        Self {
            quota: Quota::new(limit),
            term,
            lattice,
        }
    }
    pub fn passed(&self) -> usize {
        self.quota.passed()
    }
}

impl Term for LimitTerm {
    fn name(&self) -> &'static str {
        "limit"
    }
    fn supports(&self, capability: Capability) -> bool {
        capability == Capability::Contains && self.term.supports(Capability::Contains)
    }
    fn lattice(&self) -> &Lattice {
        &self.lattice
    }
    fn contains(&self, msg: Msg) -> Result<bool> {
        if !self.term.contains(msg)? {
            return Ok(false);
        }
        Ok(self.quota.admit())
    }
    fn exhausted(&self) -> bool {
        self.quota.full() || self.term.exhausted()
    }
}

// ------------- NumberTerm -------------
// Means "(number 42)": exactly one message, if it exists.
#[derive(Debug)]
pub struct NumberTerm {
    number: Msg,
    known: bool,
    lattice: Lattice,
}

impl NumberTerm {
    pub fn new(store: &Store, number: Msg, config: LatticeConfig) -> Result<Self> {
        validate(number)?;
        let all = store.indexes().all();
        let known = all.contains(&number);
        let members = if known { vec![number] } else { Vec::new() };
        let mut builder = LatticeBuilder::new(config);
        let mut previous = None;
        for msg in all {
            // one message per window is enough to decide the window
            let bit = config.bit(msg);
            if previous == Some(bit) && msg != number {
                continue;
            }
            previous = Some(bit);
            builder = builder.set(msg, msg == number, &members);
        }
        Ok(Self {
            number,
            known,
            lattice: builder.build(),
        })
    }
}

impl Term for NumberTerm {
    fn name(&self) -> &'static str {
        "number"
    }
    fn supports(&self, _capability: Capability) -> bool {
        true
    }
    fn lattice(&self) -> &Lattice {
        &self.lattice
    }
    fn contains(&self, msg: Msg) -> Result<bool> {
        validate(msg)?;
        Ok(self.known && msg == self.number)
    }
    fn enumerate(&self) -> Result<Cursor<'_>> {
        let numbers = if self.known { vec![self.number] } else { Vec::new() };
        Ok(Box::new(numbers.into_iter().map(Ok)))
    }
}

// ------------- AlwaysTerm / NeverTerm -------------
#[derive(Debug)]
pub struct AlwaysTerm {
    store: Store,
    lattice: Lattice,
}

impl AlwaysTerm {
    pub fn new(store: &Store, config: LatticeConfig) -> Self {
        Self {
            store: store.clone(),
            lattice: always(config),
        }
    }
}

impl Term for AlwaysTerm {
    fn name(&self) -> &'static str {
        "always"
    }
    fn supports(&self, _capability: Capability) -> bool {
        true
    }
    fn lattice(&self) -> &Lattice {
        &self.lattice
    }
    fn contains(&self, msg: Msg) -> Result<bool> {
        validate(msg)?;
        Ok(true)
    }
    fn enumerate(&self) -> Result<Cursor<'_>> {
        Ok(Box::new(self.store.indexes().all().into_iter().map(Ok)))
    }
}

#[derive(Debug)]
pub struct NeverTerm {
    lattice: Lattice,
}

impl NeverTerm {
    pub fn new(config: LatticeConfig) -> Self {
        Self {
            lattice: never(config),
        }
    }
}

impl Term for NeverTerm {
    fn name(&self) -> &'static str {
        "never"
    }
    fn supports(&self, _capability: Capability) -> bool {
        true
    }
    fn lattice(&self) -> &Lattice {
        &self.lattice
    }
    fn contains(&self, msg: Msg) -> Result<bool> {
        validate(msg)?;
        Ok(false)
    }
    fn enumerate(&self) -> Result<Cursor<'_>> {
        Ok(Box::new(std::iter::empty()))
    }
}
