//! Line-oriented driver around the engine.
//!
//! Reads standard input one line at a time:
//! * a JSON object is a notice, e.g.
//!   `{"kind":"message-seen","number":7,"identity":"urn:test:jeff"}`,
//! * anything else is a query, answered on standard output with the
//!   matching message numbers separated by spaces.
//!
//! The store is restored from the configured directory on start and
//! flushed back when input ends. An optional argument names the settings
//! file, otherwise `msgsearch.toml` is used when present.

use std::io::{self, BufRead, Write};

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use msgsearch::engine::Engine;
use msgsearch::error::Result;
use msgsearch::functor::Notice;
use msgsearch::settings::Settings;

fn main() -> Result<()> {
    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log.filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let engine = Engine::from_settings(&settings)?;
    info!(version = env!("CARGO_PKG_VERSION"), "ready");
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('{') {
            match serde_json::from_str::<Notice>(line) {
                Ok(notice) => engine.notify(&notice),
                Err(e) => warn!(error = %e, "not a notice"),
            }
            continue;
        }
        match engine.search(line) {
            Ok(found) => {
                let numbers: Vec<String> = found.iter().map(u64::to_string).collect();
                writeln!(out, "{}", numbers.join(" "))?;
            }
            Err(e) => warn!(query = line, error = %e, "query failed"),
        }
    }
    engine.flush(&settings.storage.directory)
}
