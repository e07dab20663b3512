//! Knowledge store: one JSON document per category
//!
//! Each file is a flat object of string -> string pairs. For image
//! categories the key is a country and the value a fingerprint; for the
//! capital category the key is a capital and the value its country.
//!
//! Nothing is cached between operations. Every lookup reads the file
//! fresh, every commit is load -> mutate -> save under a per-category
//! lock so concurrent commits to the same category cannot lose updates.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{OracleError, OracleResult};
use crate::types::Category;

/// Entries of one category in file order
pub type KnowledgeTable = IndexMap<String, String>;

#[derive(Clone)]
pub struct KnowledgeStore {
    data_dir: PathBuf,
    locks: Arc<HashMap<Category, Mutex<()>>>,
}

impl KnowledgeStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let locks = Category::ALL
            .into_iter()
            .map(|category| (category, Mutex::new(())))
            .collect();
        Self {
            data_dir: data_dir.into(),
            locks: Arc::new(locks),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path(&self, category: Category) -> PathBuf {
        self.data_dir.join(category.file_name())
    }

    /// Read a category's table. A missing or blank file is an empty table.
    pub async fn try_load(&self, category: Category) -> OracleResult<KnowledgeTable> {
        let path = self.path(category);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(KnowledgeTable::new()),
            Err(e) => return Err(OracleError::persistence(&path, e)),
        };

        if content.trim().is_empty() {
            return Ok(KnowledgeTable::new());
        }

        serde_json::from_str(&content).map_err(|e| OracleError::persistence(&path, e))
    }

    /// Read a category's table, degrading to empty on failure
    pub async fn load(&self, category: Category) -> KnowledgeTable {
        match self.try_load(category).await {
            Ok(table) => table,
            Err(e) => {
                tracing::error!("Error loading {} knowledge: {}", category, e);
                KnowledgeTable::new()
            }
        }
    }

    /// Rewrite a category's file wholesale
    ///
    /// Writes to a sibling temp file and renames it into place.
    pub async fn save(&self, category: Category, table: &KnowledgeTable) -> OracleResult<()> {
        let path = self.path(category);
        fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| OracleError::persistence(&self.data_dir, e))?;

        let json = serde_json::to_string_pretty(table).map_err(|e| OracleError::persistence(&path, e))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| OracleError::persistence(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| OracleError::persistence(&path, e))?;
        Ok(())
    }

    /// First key whose value equals `value`
    pub async fn find_key(&self, category: Category, value: &str) -> Option<String> {
        self.load(category)
            .await
            .into_iter()
            .find(|(_, v)| v == value)
            .map(|(k, _)| k)
    }

    /// Search several categories in order, first match wins
    pub async fn find_key_in(&self, categories: &[Category], value: &str) -> Option<(Category, String)> {
        for &category in categories {
            if let Some(key) = self.find_key(category, value).await {
                return Some((category, key));
            }
        }
        None
    }

    /// Insert or overwrite one entry. Returns the previous value, if any.
    ///
    /// If the existing file cannot be read the write is refused rather
    /// than replacing the unreadable table with a single entry.
    pub async fn commit(&self, category: Category, key: &str, value: &str) -> OracleResult<Option<String>> {
        let _guard = self.lock(category).lock().await;

        let mut table = self.try_load(category).await?;
        let previous = table.insert(key.to_string(), value.to_string());
        self.save(category, &table).await?;

        if let Some(old) = &previous {
            if old != value {
                tracing::warn!("Overwrote {} entry {:?}: {} -> {}", category, key, old, value);
            }
        }
        Ok(previous)
    }

    /// Merge many entries in one read-modify-write. Returns entries changed.
    pub async fn merge(&self, category: Category, entries: &KnowledgeTable) -> OracleResult<usize> {
        let _guard = self.lock(category).lock().await;

        let mut table = self.try_load(category).await?;
        let mut changed = 0;
        for (key, value) in entries {
            if table.get(key) != Some(value) {
                table.insert(key.clone(), value.clone());
                changed += 1;
            }
        }

        if changed > 0 {
            self.save(category, &table).await?;
        }
        Ok(changed)
    }

    /// Entry count for every category
    pub async fn counts(&self) -> Vec<(Category, usize)> {
        let mut counts = Vec::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            counts.push((category, self.load(category).await.len()));
        }
        counts
    }

    fn lock(&self, category: Category) -> &Mutex<()> {
        // Every category is inserted in `new`
        &self.locks[&category]
    }
}
