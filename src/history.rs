// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Rename history for undo support

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::Result;

/// A single applied rename
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub original_path: PathBuf,
    pub new_path: PathBuf,
    pub suggested_name: String,
    pub undone: bool,
}

impl HistoryEntry {
    pub fn new(original_path: PathBuf, new_path: PathBuf, suggested_name: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            original_path,
            new_path,
            suggested_name,
            undone: false,
        }
    }
}

/// Append-only JSON lines log of renames
#[derive(Debug, Clone)]
pub struct History {
    path: PathBuf,
}

impl History {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn append(&self, entry: &HistoryEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }

    /// Read all entries, oldest first. Unparsable lines are skipped.
    pub fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!("Failed to parse history entry: {}", e);
                }
            }
        }

        Ok(entries)
    }

    /// Newest first
    pub fn get_recent(&self, count: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.read_all()?;
        entries.reverse();
        entries.truncate(count);
        Ok(entries)
    }

    pub fn mark_undone(&self, id: &str) -> Result<()> {
        let entries = self.read_all()?;

        let file = File::create(&self.path)?;
        let mut writer = std::io::BufWriter::new(file);

        for mut entry in entries {
            if entry.id == id {
                entry.undone = true;
            }
            writeln!(writer, "{}", serde_json::to_string(&entry)?)?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Entries not yet undone, oldest first
    pub fn get_undoable(&self) -> Result<Vec<HistoryEntry>> {
        let entries = self.read_all()?;
        Ok(entries.into_iter().filter(|e| !e.undone).collect())
    }

    /// Reverse the newest `count` renames. Returns the entries undone.
    pub fn undo_recent(&self, count: usize, dry_run: bool) -> Result<Vec<HistoryEntry>> {
        let mut undone = Vec::new();
        for entry in self.get_undoable()?.into_iter().rev().take(count) {
            if !entry.new_path.exists() {
                tracing::warn!("File not found (may have been moved/deleted): {:?}", entry.new_path);
                continue;
            }
            if entry.original_path.exists() {
                tracing::warn!("Original path is taken, skipping: {:?}", entry.original_path);
                continue;
            }
            if !dry_run {
                fs::rename(&entry.new_path, &entry.original_path)?;
                self.mark_undone(&entry.id)?;
            }
            undone.push(entry);
        }
        Ok(undone)
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_read_back_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path().join("history.jsonl"));
        for n in 0..3 {
            history
                .append(&HistoryEntry::new(
                    format!("/a/{}.jpg", n).into(),
                    format!("/a/name{}.jpg", n).into(),
                    format!("name{}", n),
                ))
                .unwrap();
        }

        let recent = history.get_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].suggested_name, "name2");
        assert_eq!(recent[1].suggested_name, "name1");
    }

    #[test]
    fn undo_moves_file_back_and_marks_entry() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path().join("history.jsonl"));
        let original = dir.path().join("IMG_1.jpg");
        let renamed = dir.path().join("cat.jpg");
        fs::write(&renamed, b"x").unwrap();
        history
            .append(&HistoryEntry::new(original.clone(), renamed.clone(), "cat".into()))
            .unwrap();

        let planned = history.undo_recent(1, true).unwrap();
        assert_eq!(planned.len(), 1);
        assert!(renamed.exists());

        let undone = history.undo_recent(1, false).unwrap();
        assert_eq!(undone.len(), 1);
        assert!(original.exists());
        assert!(!renamed.exists());
        assert!(history.get_undoable().unwrap().is_empty());
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        fs::write(&path, "garbage\n\n").unwrap();
        let history = History::new(path);
        assert!(history.read_all().unwrap().is_empty());
        history.clear().unwrap();
        assert!(!history.path().exists());
    }
}
