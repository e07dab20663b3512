//! Import knowledge files into the oracle's data directory
//!
//! Usage: import [--config <path>] <dirs...>
//!
//! Each directory is scanned (non-recursively) for files named after a
//! category: flag.json, shape.json, map.json, historical-country.json,
//! country-capital.json. Entries are merged, last write wins.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use trivia_oracle::{Category, Config, KnowledgeStore, KnowledgeTable};

#[tokio::main]
async fn main() -> Result<()> {
    let mut args: Vec<String> = std::env::args().collect();

    let explicit_config = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).cloned().context("Usage: --config <path>")?;
            args.drain(i..=i + 1);
            Some(PathBuf::from(path))
        }
        None => None,
    };

    if args.len() < 2 {
        eprintln!("Usage: {} [--config <path>] <knowledge-dirs...>", args[0]);
        eprintln!("Example: {} ./data", args[0]);
        std::process::exit(1);
    }

    let config = Config::load(&Config::resolve_path(explicit_config.as_deref()))?;
    let store = KnowledgeStore::new(config.data_dir.clone());
    println!("Importing into {:?}", store.data_dir());

    let mut total_files = 0;
    let mut total_changed = 0;

    for arg in &args[1..] {
        let dir = PathBuf::from(arg);
        if !dir.exists() {
            eprintln!("Warning: {} does not exist, skipping", arg);
            continue;
        }

        println!("\nProcessing: {:?}", dir);
        let (files, changed) = import_directory(&store, &dir).await?;
        total_files += files;
        total_changed += changed;
    }

    println!("\n========================================");
    println!("Import complete!");
    println!("  Files: {}", total_files);
    println!("  Entries added or changed: {}", total_changed);
    println!("========================================");

    Ok(())
}

async fn import_directory(store: &KnowledgeStore, dir: &Path) -> Result<(usize, usize)> {
    let mut files = 0;
    let mut changed = 0;

    for entry in walkdir::WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let Some(category) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| Category::ALL.into_iter().find(|c| c.file_name() == n))
        else {
            continue;
        };

        // Never merge a file into itself
        if let (Ok(source), Ok(target)) = (path.canonicalize(), store.path(category).canonicalize()) {
            if source == target {
                continue;
            }
        }

        match import_file(store, category, path).await {
            Ok(n) => {
                files += 1;
                changed += n;
                println!("  ✓ {} ({} changed)", category.file_name(), n);
            }
            Err(e) => {
                eprintln!("  ✗ {}: {:#}", category.file_name(), e);
            }
        }
    }

    Ok((files, changed))
}

async fn import_file(store: &KnowledgeStore, category: Category, path: &Path) -> Result<usize> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;

    let entries: KnowledgeTable = if content.trim().is_empty() {
        KnowledgeTable::new()
    } else {
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))?
    };

    Ok(store.merge(category, &entries).await?)
}
