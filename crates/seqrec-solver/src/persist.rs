//! Policy files: one JSON document per window length, only the policy map.
//!
//! ```json
//! { "window": 2, "entries": [ { "state": [null, 7], "action": 3 } ] }
//! ```
//!
//! Entries are written in state order so the same policy always produces
//! the same bytes.

use seqrec_core::{ItemId, PersistenceError, Policy, State};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const MODEL_FILE_PREFIX: &str = "mdp-model_k=";
pub const MODEL_FILE_EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct PolicyFile {
    window: usize,
    entries: Vec<PolicyEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PolicyEntry {
    state: State,
    action: ItemId,
}

/// `<dir>/mdp-model_k=<window>.json`
#[must_use]
pub fn model_path(dir: &Path, window: usize) -> PathBuf {
    dir.join(format!("{MODEL_FILE_PREFIX}{window}.{MODEL_FILE_EXTENSION}"))
}

/// Writes `policy` for `window` into `dir`, creating the directory if needed.
pub fn save(dir: &Path, window: usize, policy: &Policy) -> Result<PathBuf, PersistenceError> {
    std::fs::create_dir_all(dir).map_err(|source| PersistenceError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = model_path(dir, window);
    let doc = PolicyFile {
        window,
        entries: policy
            .iter()
            .map(|(state, action)| PolicyEntry {
                state: state.clone(),
                action,
            })
            .collect(),
    };

    let io_err = |source: std::io::Error| PersistenceError::Io {
        path: path.clone(),
        source,
    };
    let file = File::create(&path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &doc).map_err(|e| io_err(e.into()))?;
    writer.flush().map_err(io_err)?;
    Ok(path)
}

/// Reads the policy for `window` from `dir`.
///
/// A missing file is [`PersistenceError::NotFound`]. A file that does not
/// parse, was written for another window, holds states of the wrong length
/// or lists a state twice is [`PersistenceError::Corrupt`]. Nothing is
/// returned unless the whole document is valid.
pub fn load(dir: &Path, window: usize) -> Result<Policy, PersistenceError> {
    let path = model_path(dir, window);
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(PersistenceError::NotFound { path });
        }
        Err(source) => return Err(PersistenceError::Io { path, source }),
    };

    let corrupt = |reason: String| PersistenceError::Corrupt {
        path: path.clone(),
        reason,
    };
    let doc: PolicyFile =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| corrupt(e.to_string()))?;

    if doc.window != window {
        return Err(corrupt(format!(
            "file was written for window {}, expected {window}",
            doc.window
        )));
    }

    let mut seen = BTreeSet::new();
    for entry in &doc.entries {
        if entry.state.len() != window {
            return Err(corrupt(format!(
                "state {} has {} items, expected {window}",
                entry.state,
                entry.state.len()
            )));
        }
        if !seen.insert(&entry.state) {
            return Err(corrupt(format!("state {} listed twice", entry.state)));
        }
    }

    Ok(doc
        .entries
        .into_iter()
        .map(|entry| (entry.state, entry.action))
        .collect())
}
