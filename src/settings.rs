// used for reading settings from defaults, a file and the environment
use std::path::{Path, PathBuf};

use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use serde::Deserialize;

use crate::error::Result;
use crate::lattice::LatticeConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct LatticeSettings {
    pub bits: u32,
    pub span: u64,
    #[serde(default)]
    pub gap: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub filter: String,
}

// ------------- Settings -------------
// Later sources win: built-in defaults, then `msgsearch.toml` (or the
// file given explicitly), then MSGSEARCH__SECTION__KEY variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub lattice: LatticeSettings,
    pub storage: StorageSettings,
    pub log: LogSettings,
}

impl Settings {
    pub const FILE: &'static str = "msgsearch";
    pub const ENV_PREFIX: &'static str = "MSGSEARCH";

    pub fn load() -> Result<Self> {
        let builder = defaults()?.add_source(File::with_name(Self::FILE).required(false));
        Self::finish(builder)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let builder = defaults()?.add_source(File::from(path.as_ref()).required(true));
        Self::finish(builder)
    }

    pub fn lattice(&self) -> LatticeConfig {
        let config = LatticeConfig::new(self.lattice.bits, self.lattice.span);
        match self.lattice.gap {
            Some(gap) => config.with_gap(gap),
            None => config,
        }
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings = builder
            .add_source(
                Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(Config::builder()
        .set_default("lattice.bits", i64::from(LatticeConfig::DEFAULT_BITS))?
        .set_default("lattice.span", LatticeConfig::DEFAULT_SPAN as i64)?
        .set_default("storage.directory", "msgsearch-data")?
        .set_default("log.filter", "info")?)
}
