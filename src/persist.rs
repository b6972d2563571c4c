// used for persistence
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::index::{check_attribute, Index, IndexMap};
use crate::msg::{validate, Msg};
use crate::triples::Triples;

// ------------- Index file format -------------
// A value line is followed by its message numbers, one per line and each
// prefixed by a single space. A blank line or the end of the stream ends
// the document.
//
//   hello
//    50
//    40
//   world
//    10

pub fn write_index<W: Write>(target: W, entries: &[(String, Vec<Msg>)]) -> Result<()> {
    let mut writer = BufWriter::new(target);
    for (value, numbers) in entries {
        if !flushable(value) {
            warn!(value = %value.escape_debug(), "value can't be flushed, skipped");
            continue;
        }
        writeln!(writer, "{}", value)?;
        for number in numbers {
            writeln!(writer, " {}", number)?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn read_index<R: BufRead>(source: R) -> Result<Vec<(String, Vec<Msg>)>> {
    let mut entries: Vec<(String, Vec<Msg>)> = Vec::new();
    for (position, line) in source.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            break;
        }
        if !line.starts_with(' ') {
            entries.push((line, Vec::new()));
            continue;
        }
        let Some((_, numbers)) = entries.last_mut() else {
            warn!(line = position + 1, "message number without a value, ignored");
            continue;
        };
        numbers.push(parse_number(&line[1..], position + 1)?);
    }
    Ok(entries)
}

fn parse_number(text: &str, line: usize) -> Result<Msg> {
    let number = text
        .trim()
        .parse::<Msg>()
        .map_err(|e| EngineError::DataCorruption {
            message: format!("line {}: {:?} is not a message number: {}", line, text, e),
        })?;
    validate(number).map_err(|_| EngineError::DataCorruption {
        message: format!("line {}: reserved message number {}", line, number),
    })
}

fn flushable(value: &str) -> bool {
    !value.is_empty() && !value.starts_with(' ') && !value.contains(['\n', '\r'])
}

// ------------- Persistence -------------
// A directory holding one `<attribute>.idx` file per index and a
// `triples.jsonl` file with every fact. Concurrent flushes into the same
// directory have to be serialized by the caller.
#[derive(Debug, Clone)]
pub struct Persistor {
    directory: PathBuf,
}

impl Persistor {
    const INDEX_EXTENSION: &'static str = "idx";
    const TRIPLES_FILE: &'static str = "triples.jsonl";

    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn persist_indexes(&self, indexes: &IndexMap) -> Result<()> {
        let start = Instant::now();
        fs::create_dir_all(&self.directory)?;
        let attributes = indexes.attributes();
        for attribute in &attributes {
            if let Some(index) = indexes.get(attribute) {
                let path = self.index_path(attribute);
                index.flush(File::create(&path)?)?;
            }
        }
        debug!(
            directory = %self.directory.display(),
            attributes = attributes.len(),
            ms = start.elapsed().as_millis() as u64,
            "persisted indexes"
        );
        Ok(())
    }

    pub fn restore_indexes(&self) -> Result<IndexMap> {
        let indexes = IndexMap::new();
        if !self.directory.exists() {
            return Ok(indexes);
        }
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(Self::INDEX_EXTENSION) {
                continue;
            }
            let Some(attribute) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if check_attribute(attribute).is_err() {
                warn!(path = %path.display(), "not an index file, skipped");
                continue;
            }
            let index = Index::restore(BufReader::new(File::open(&path)?))?;
            indexes.insert(attribute, index)?;
        }
        Ok(indexes)
    }

    pub fn persist_triples(&self, triples: &Triples) -> Result<()> {
        fs::create_dir_all(&self.directory)?;
        triples.flush(File::create(self.triples_path())?)
    }

    pub fn restore_triples(&self) -> Result<Triples> {
        let path = self.triples_path();
        if !path.exists() {
            return Ok(Triples::new());
        }
        Triples::restore(BufReader::new(File::open(path)?))
    }

    fn index_path(&self, attribute: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{}", attribute, Self::INDEX_EXTENSION))
    }

    fn triples_path(&self) -> PathBuf {
        self.directory.join(Self::TRIPLES_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_blank_line() {
        let text = "alpha\n 5\n\nbeta\n 3\n";
        let entries = read_index(text.as_bytes()).unwrap();
        assert_eq!(entries, vec![("alpha".to_string(), vec![5])]);
    }

    #[test]
    fn ignores_orphan_numbers() {
        let text = " 7\nalpha\n 5\n";
        let entries = read_index(text.as_bytes()).unwrap();
        assert_eq!(entries, vec![("alpha".to_string(), vec![5])]);
    }

    #[test]
    fn rejects_garbage_numbers() {
        assert!(matches!(
            read_index("alpha\n five\n".as_bytes()),
            Err(EngineError::DataCorruption { .. })
        ));
        assert!(matches!(
            read_index("alpha\n 0\n".as_bytes()),
            Err(EngineError::DataCorruption { .. })
        ));
    }

    #[test]
    fn skips_values_that_break_the_format() {
        let entries = vec![
            ("two\nlines".to_string(), vec![3]),
            (" padded".to_string(), vec![2]),
            ("fine".to_string(), vec![1]),
        ];
        let mut out = Vec::new();
        write_index(&mut out, &entries).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "fine\n 1\n");
    }
}
