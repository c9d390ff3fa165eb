/// Document container that persisted history trees are spliced into.
///
/// The graph only needs to read, write, and register named parts. `RedbContainer`
/// provides that on top of a single redb database file with two tables:
/// - `parts`: part name → raw part bytes
/// - `manifest`: part name → bincode-serialized `ManifestEntry`
use std::path::Path;

use anyhow::{Context, Result};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

/// Parts table: part name → raw bytes.
const PARTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("parts");

/// Manifest table: part name → bincode-serialized ManifestEntry.
const MANIFEST_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("manifest");

/// One manifest line describing a part of the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub part: String,
    pub media_type: String,
}

/// Storage the revision graph is persisted into.
pub trait Container {
    /// Reads a part. Returns `None` if the container has no such part.
    fn read_part(&self, part: &str) -> Result<Option<Vec<u8>>>;

    /// Writes a part, replacing any previous content.
    fn write_part(&self, part: &str, bytes: &[u8]) -> Result<()>;

    /// Lists every registered part.
    fn manifest(&self) -> Result<Vec<ManifestEntry>>;

    /// Adds or replaces a manifest entry.
    fn register_part(&self, entry: &ManifestEntry) -> Result<()>;

    fn has_manifest_entry(&self, part: &str) -> Result<bool> {
        Ok(self.manifest()?.iter().any(|entry| entry.part == part))
    }
}

/// Container backed by a redb database file.
pub struct RedbContainer {
    db: Database,
}

impl std::fmt::Debug for RedbContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbContainer").finish()
    }
}

impl RedbContainer {
    /// Opens or creates the container at `path`.
    ///
    /// Creates the parent directory and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let db = Database::create(path)
            .with_context(|| format!("Failed to open container: {}", path.display()))?;

        // Ensure tables exist
        let write_txn = db
            .begin_write()
            .context("Failed to begin initial write transaction")?;
        {
            let _ = write_txn
                .open_table(PARTS_TABLE)
                .context("Failed to create parts table")?;
            let _ = write_txn
                .open_table(MANIFEST_TABLE)
                .context("Failed to create manifest table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initial transaction")?;

        Ok(Self { db })
    }

    /// Removes a part and its manifest entry. Returns whether the part existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write transaction fails.
    pub fn delete_part(&self, part: &str) -> Result<bool> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        let existed;
        {
            let mut parts = write_txn
                .open_table(PARTS_TABLE)
                .context("Failed to open parts table")?;
            existed = parts
                .remove(part)
                .context("Failed to remove part")?
                .is_some();
        }
        {
            let mut manifest = write_txn
                .open_table(MANIFEST_TABLE)
                .context("Failed to open manifest table")?;
            let _ = manifest.remove(part);
        }
        write_txn.commit().context("Failed to commit part removal")?;
        Ok(existed)
    }
}

impl Container for RedbContainer {
    fn read_part(&self, part: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(PARTS_TABLE)
            .context("Failed to open parts table")?;

        let bytes = table
            .get(part)
            .with_context(|| format!("Failed to read part `{part}`"))?
            .map(|guard| guard.value().to_vec());
        Ok(bytes)
    }

    fn write_part(&self, part: &str, bytes: &[u8]) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(PARTS_TABLE)
                .context("Failed to open parts table")?;
            table
                .insert(part, bytes)
                .with_context(|| format!("Failed to write part `{part}`"))?;
        }
        write_txn
            .commit()
            .context("Failed to commit write transaction")?;
        Ok(())
    }

    fn manifest(&self) -> Result<Vec<ManifestEntry>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(MANIFEST_TABLE)
            .context("Failed to open manifest table")?;

        let mut entries = Vec::new();
        for entry in table.iter().context("Failed to iterate manifest table")? {
            let (_, value_guard) = entry.context("Failed to read manifest entry")?;
            let manifest_entry: ManifestEntry = bincode::deserialize(value_guard.value())
                .context("Failed to deserialize manifest entry")?;
            entries.push(manifest_entry);
        }
        Ok(entries)
    }

    fn register_part(&self, entry: &ManifestEntry) -> Result<()> {
        let bytes = bincode::serialize(entry).context("Failed to serialize manifest entry")?;

        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(MANIFEST_TABLE)
                .context("Failed to open manifest table")?;
            table
                .insert(entry.part.as_str(), bytes.as_slice())
                .context("Failed to insert manifest entry")?;
        }
        write_txn.commit().context("Failed to commit manifest entry")?;
        Ok(())
    }

    fn has_manifest_entry(&self, part: &str) -> Result<bool> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(MANIFEST_TABLE)
            .context("Failed to open manifest table")?;
        Ok(table
            .get(part)
            .context("Failed to read manifest entry")?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_test_container() -> (RedbContainer, TempDir) {
        let dir = TempDir::new().expect("create temp dir");
        let container = RedbContainer::open(&dir.path().join("doc.redb")).expect("open container");
        (container, dir)
    }

    fn entry(part: &str) -> ManifestEntry {
        ManifestEntry {
            part: part.to_string(),
            media_type: "application/json".to_string(),
        }
    }

    #[test]
    fn test_open_creates_empty_container() {
        let (container, _dir) = open_test_container();
        assert!(container.manifest().expect("manifest").is_empty());
        assert!(container.read_part("undo").expect("read").is_none());
    }

    #[test]
    fn test_write_and_read_part() {
        let (container, _dir) = open_test_container();
        container.write_part("undo", b"{}").expect("write");
        assert_eq!(
            container.read_part("undo").expect("read").as_deref(),
            Some(b"{}".as_slice())
        );
    }

    #[test]
    fn test_write_part_overwrites() {
        let (container, _dir) = open_test_container();
        container.write_part("undo", b"original").expect("write");
        container.write_part("undo", b"updated").expect("overwrite");
        assert_eq!(
            container.read_part("undo").expect("read").as_deref(),
            Some(b"updated".as_slice())
        );
    }

    #[test]
    fn test_register_part_is_idempotent() {
        let (container, _dir) = open_test_container();
        assert!(!container.has_manifest_entry("undo").expect("lookup"));

        container.register_part(&entry("undo")).expect("register");
        container.register_part(&entry("undo")).expect("register again");
        container.register_part(&entry("redo")).expect("register");

        assert!(container.has_manifest_entry("undo").expect("lookup"));
        assert_eq!(container.manifest().expect("manifest").len(), 2);
    }

    #[test]
    fn test_delete_part_removes_manifest_entry() {
        let (container, _dir) = open_test_container();
        container.write_part("redo", b"[]").expect("write");
        container.register_part(&entry("redo")).expect("register");

        assert!(container.delete_part("redo").expect("delete"));
        assert!(!container.delete_part("redo").expect("delete again"));
        assert!(container.read_part("redo").expect("read").is_none());
        assert!(!container.has_manifest_entry("redo").expect("lookup"));
    }

    #[test]
    fn test_reopen_preserves_parts() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("nested").join("doc.redb");

        {
            let container = RedbContainer::open(&path).expect("open");
            container.write_part("undo", b"persistent").expect("write");
            container.register_part(&entry("undo")).expect("register");
        }

        {
            let container = RedbContainer::open(&path).expect("reopen");
            assert_eq!(
                container.read_part("undo").expect("read").as_deref(),
                Some(b"persistent".as_slice())
            );
            assert_eq!(container.manifest().expect("manifest"), vec![entry("undo")]);
        }
    }
}
