//! The facade collaborators talk to.
//!
//! An [`Engine`] owns the indexes and triples of one store, the registry
//! of functors feeding them, and the lattice geometry every compiled query
//! uses. It is shared by reference between any number of threads: notices
//! and searches may run concurrently, while `flush` calls on one directory
//! have to be serialized by the caller.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::Result;
use crate::functor::{Functor, Functors, Notice};
use crate::index::IndexMap;
use crate::lattice::LatticeConfig;
use crate::msg::Msg;
use crate::persist::Persistor;
use crate::query::Compiler;
use crate::settings::Settings;
use crate::term::{search, Term};
use crate::triples::Triples;

// ------------- Store -------------
/// Shared handles to the indexes and the triples, cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Store {
    indexes: Arc<IndexMap>,
    triples: Arc<Triples>,
}

impl Store {
    pub fn new(indexes: IndexMap, triples: Triples) -> Self {
        Self {
            indexes: Arc::new(indexes),
            triples: Arc::new(triples),
        }
    }
    pub fn indexes(&self) -> &IndexMap {
        &self.indexes
    }
    pub fn triples(&self) -> &Triples {
        &self.triples
    }
}

// ------------- Engine -------------
#[derive(Debug)]
pub struct Engine {
    store: Store,
    functors: Functors,
    config: LatticeConfig,
}

impl Engine {
    /// An empty engine with the built-in functors registered.
    pub fn new(config: LatticeConfig) -> Self {
        Self::with_store(Store::default(), config)
    }

    pub fn with_store(store: Store, config: LatticeConfig) -> Self {
        Self {
            store,
            functors: Functors::with_defaults(),
            config,
        }
    }

    /// Load whatever an earlier `flush` left in the directory; a missing
    /// directory gives an empty engine.
    pub fn restore<P: AsRef<Path>>(directory: P, config: LatticeConfig) -> Result<Self> {
        let start = Instant::now();
        let persistor = Persistor::new(directory);
        let indexes = persistor.restore_indexes()?;
        let triples = persistor.restore_triples()?;
        info!(
            directory = %persistor.directory().display(),
            attributes = indexes.attributes().len(),
            triples = triples.len(),
            ms = start.elapsed().as_millis() as u64,
            "engine restored"
        );
        Ok(Self::with_store(Store::new(indexes, triples), config))
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::restore(&settings.storage.directory, settings.lattice())
    }

    /// Functors run in registration order, after the built-in ones.
    pub fn register(&mut self, functor: Arc<dyn Functor>) {
        self.functors.register(functor);
    }

    pub fn notify(&self, notice: &Notice) {
        self.functors.dispatch(&self.store, notice);
    }

    pub fn compile(&self, query: &str) -> Result<Box<dyn Term>> {
        Compiler::new(&self.store, self.config).compile(query)
    }

    /// Message numbers matching the query, newest first.
    pub fn search(&self, query: &str) -> Result<Vec<Msg>> {
        let term = self.compile(query)?;
        debug!(query, "compiled");
        self.search_term(term.as_ref())
    }

    pub fn search_term(&self, term: &dyn Term) -> Result<Vec<Msg>> {
        search(term, || self.store.indexes().all())
    }

    /// Candidates the engine has never been told about.
    pub fn lost<I>(&self, candidates: I) -> Result<Vec<Msg>>
    where
        I: IntoIterator<Item = Msg>,
    {
        self.store.indexes().lost(candidates)
    }

    pub fn flush<P: AsRef<Path>>(&self, directory: P) -> Result<()> {
        let start = Instant::now();
        let persistor = Persistor::new(directory);
        persistor.persist_indexes(self.store.indexes())?;
        persistor.persist_triples(self.store.triples())?;
        info!(
            directory = %persistor.directory().display(),
            ms = start.elapsed().as_millis() as u64,
            "engine flushed"
        );
        Ok(())
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &LatticeConfig {
        &self.config
    }
}
