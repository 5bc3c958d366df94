// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Snapshot storage backends

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{EcsError, Result};
use crate::serialization::Snapshot;

const EXTENSION: &str = "json";

/// Named slots holding snapshots
pub trait SnapshotStore: Send {
    /// Write `snapshot` to `slot`, replacing what was there
    fn save(&mut self, slot: &str, snapshot: &Snapshot) -> Result<()>;

    /// Read a slot; `None` when it is empty
    fn load(&self, slot: &str) -> Result<Option<Snapshot>>;

    /// Occupied slot names, sorted
    fn list(&self) -> Result<Vec<String>>;

    /// Empty a slot. Returns whether it held anything.
    fn delete(&mut self, slot: &str) -> Result<bool>;
}

fn validate_slot(slot: &str) -> Result<()> {
    let valid = !slot.is_empty()
        && slot
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(EcsError::InvalidSlot(slot.to_string()))
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slots: BTreeMap<String, Snapshot>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&mut self, slot: &str, snapshot: &Snapshot) -> Result<()> {
        validate_slot(slot)?;
        self.slots.insert(slot.to_string(), snapshot.clone());
        Ok(())
    }

    fn load(&self, slot: &str) -> Result<Option<Snapshot>> {
        validate_slot(slot)?;
        Ok(self.slots.get(slot).cloned())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.slots.keys().cloned().collect())
    }

    fn delete(&mut self, slot: &str) -> Result<bool> {
        validate_slot(slot)?;
        Ok(self.slots.remove(slot).is_some())
    }
}

/// One pretty-printed JSON file per slot in a directory owned by the host
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    directory: PathBuf,
}

impl FileSnapshotStore {
    /// Use `directory`, creating it if needed
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn slot_path(&self, slot: &str) -> Result<PathBuf> {
        validate_slot(slot)?;
        Ok(self.directory.join(format!("{slot}.{EXTENSION}")))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&mut self, slot: &str, snapshot: &Snapshot) -> Result<()> {
        let path = self.slot_path(slot)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, snapshot.to_json_pretty()?)?;
        // rename keeps a reader from seeing half a file
        fs::rename(&tmp, &path)?;
        tracing::debug!(slot, path = %path.display(), "snapshot saved");
        Ok(())
    }

    fn load(&self, slot: &str) -> Result<Option<Snapshot>> {
        let path = self.slot_path(slot)?;
        match fs::read_to_string(&path) {
            Ok(json) => Ok(Some(Snapshot::from_json(&json)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut slots = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                slots.push(stem.to_string());
            }
        }
        slots.sort();
        Ok(slots)
    }

    fn delete(&mut self, slot: &str) -> Result<bool> {
        let path = self.slot_path(slot)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
