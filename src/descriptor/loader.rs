//! # Loader: JSON configuration files → ordered descriptor list.
//!
//! ```text
//! load(path)
//!   ├─ missing           → skipped
//!   ├─ directory         → load(entry) for each entry, sorted by name
//!   └─ file *.json       → load_file(file)
//!                            ├─ include  → load(dir(file)/include) for each, first
//!                            └─ service  → { name: descriptor } | [descriptor]
//! ```
//!
//! ## File shape
//! ```json
//! {
//!   "include": ["more.json", "conf.d"],
//!   "service": {
//!     "echo": { "port": 7000, "command": "/bin/cat" }
//!   }
//! }
//! ```
//! A bare array is accepted as the `service` list. List entries are named by
//! their `name` field, or by their index when it is absent.
//!
//! ## Rules
//! - Object order is preserved (`serde_json` `preserve_order`).
//! - A file already loaded is skipped, so include cycles terminate.
//! - Any unreadable or malformed file aborts the load.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde_json::Value;
use tracing::debug;

use crate::error::ConfigError;

use super::descriptor::ServiceDescriptor;

/// Accumulates descriptors from configuration paths, in load order.
#[derive(Debug, Default)]
pub struct Loader {
    visited: HashSet<PathBuf>,
    descriptors: Vec<ServiceDescriptor>,
}

impl Loader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a file or directory. Missing paths and non-`.json` files are skipped.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let meta = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(source) => return Err(io_error(path, source)),
        };

        if meta.is_dir() {
            let mut entries = fs::read_dir(path)
                .and_then(|rd| rd.map(|e| e.map(|e| e.path())).collect::<io::Result<Vec<_>>>())
                .map_err(|source| io_error(path, source))?;
            entries.sort();
            for entry in entries {
                self.load(entry)?;
            }
            Ok(())
        } else if path.extension().is_some_and(|ext| ext == "json") {
            self.load_file(path)
        } else {
            Ok(())
        }
    }

    /// Loads one configuration file regardless of its extension.
    ///
    /// Unlike [`load`](Self::load), a missing file is an error.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let key = fs::canonicalize(path).map_err(|source| io_error(path, source))?;
        if !self.visited.insert(key) {
            debug!(component = "loader", event = "skip_visited", path = %path.display());
            return Ok(());
        }

        debug!(component = "loader", event = "load_file", path = %path.display());
        let text = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
        let doc: Value = serde_json::from_str(&text).map_err(|source| parse_error(path, source))?;

        let (include, services) = match doc {
            Value::Array(_) => (None, Some(doc)),
            Value::Object(mut map) => (map.remove("include"), map.remove("service")),
            _ => return Err(shape_error(path, "expected an object or an array")),
        };

        if let Some(include) = include {
            let base = path.parent().unwrap_or_else(|| Path::new(""));
            for rel in include_paths(path, include)? {
                self.load(base.join(rel))?;
            }
        }
        if let Some(services) = services {
            self.load_services(path, services)?;
        }
        Ok(())
    }

    /// Descriptors loaded so far.
    pub fn descriptors(&self) -> &[ServiceDescriptor] {
        &self.descriptors
    }

    /// Consumes the loader and returns the descriptors in load order.
    pub fn into_descriptors(self) -> Vec<ServiceDescriptor> {
        self.descriptors
    }

    fn load_services(&mut self, path: &Path, services: Value) -> Result<(), ConfigError> {
        match services {
            Value::Object(map) => {
                for (name, value) in map {
                    let mut desc = parse_descriptor(path, value)?;
                    desc.name = name;
                    self.descriptors.push(desc);
                }
            }
            Value::Array(list) => {
                for (idx, value) in list.into_iter().enumerate() {
                    let mut desc = parse_descriptor(path, value)?;
                    if desc.name.is_empty() {
                        desc.name = idx.to_string();
                    }
                    self.descriptors.push(desc);
                }
            }
            _ => return Err(shape_error(path, "`service` must be an object or an array")),
        }
        Ok(())
    }
}

/// Loads every path in order into one descriptor list.
pub fn load_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<ServiceDescriptor>, ConfigError> {
    let mut loader = Loader::new();
    for p in paths {
        loader.load(p)?;
    }
    Ok(loader.into_descriptors())
}

fn include_paths(path: &Path, include: Value) -> Result<Vec<PathBuf>, ConfigError> {
    match include {
        Value::String(one) => Ok(vec![PathBuf::from(one)]),
        Value::Array(_) => {
            serde_json::from_value::<Vec<PathBuf>>(include).map_err(|source| parse_error(path, source))
        }
        _ => Err(shape_error(path, "`include` must be a string or an array of strings")),
    }
}

fn parse_descriptor(path: &Path, value: Value) -> Result<ServiceDescriptor, ConfigError> {
    serde_json::from_value(value).map_err(|source| parse_error(path, source))
}

fn io_error(path: &Path, source: io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn parse_error(path: &Path, source: serde_json::Error) -> ConfigError {
    ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    }
}

fn shape_error(path: &Path, msg: &str) -> ConfigError {
    parse_error(path, serde_json::Error::custom(msg))
}
