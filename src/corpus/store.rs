//! Corpus persistence and resume merging.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{Corpus, PostRecord, SCHEMA_VERSION};

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(
        "{} has schema version {found}, newest supported is {}",
        .path.display(),
        SCHEMA_VERSION
    )]
    UnsupportedSchema { path: PathBuf, found: u32 },
}

/// Read and validate a corpus file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not a corpus, or was
/// written by a newer schema.
pub async fn load_corpus(path: &Path) -> Result<Corpus, CorpusError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let corpus: Corpus = serde_json::from_slice(&bytes).map_err(|source| CorpusError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if corpus.schema_version > SCHEMA_VERSION {
        return Err(CorpusError::UnsupportedSchema {
            path: path.to_path_buf(),
            found: corpus.schema_version,
        });
    }
    Ok(corpus)
}

/// Load a prior corpus to resume from.
///
/// Returns `Ok(None)` (and the caller starts fresh) when the file is missing,
/// undecodable, or belongs to a different author.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, or was written by
/// a newer schema.
pub async fn load_resume_corpus(
    path: &Path,
    handle: &str,
) -> Result<Option<Corpus>, CorpusError> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "No prior corpus to resume from");
        return Ok(None);
    }

    let corpus = match load_corpus(path).await {
        Ok(corpus) => corpus,
        Err(e @ CorpusError::Json { .. }) => {
            warn!("Ignoring undecodable prior corpus: {e}");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    if corpus.handle() != handle {
        warn!(
            path = %path.display(),
            existing_handle = %corpus.handle(),
            handle = %handle,
            "Prior corpus belongs to another author, starting fresh"
        );
        return Ok(None);
    }

    info!(
        path = %path.display(),
        known_posts = corpus.posts.len(),
        "Resuming from prior corpus"
    );
    Ok(Some(corpus))
}

/// Union two post lists by URL.
///
/// A URL present in both keeps the record from `fresh`, at the position where
/// the URL was first seen.
#[must_use]
pub fn merge_posts(prior: Vec<PostRecord>, fresh: Vec<PostRecord>) -> Vec<PostRecord> {
    let mut merged: Vec<PostRecord> = Vec::with_capacity(prior.len() + fresh.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for post in prior.into_iter().chain(fresh) {
        if let Some(&pos) = index.get(&post.url) {
            merged[pos] = post;
        } else {
            index.insert(post.url.clone(), merged.len());
            merged.push(post);
        }
    }

    merged
}

/// Write a corpus atomically.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub async fn save_corpus(path: &Path, corpus: &Corpus) -> Result<(), CorpusError> {
    write_json(path, corpus).await
}

/// Pretty-print `value` as JSON into `path`, replacing it atomically.
///
/// # Errors
///
/// Returns an error if serialization or any filesystem step fails.
pub async fn write_json<T: Serialize + Sync>(path: &Path, value: &T) -> Result<(), CorpusError> {
    let io_err = |source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut bytes = serde_json::to_vec_pretty(value).map_err(|source| CorpusError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    bytes.push(b'\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, &bytes).await.map_err(io_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn post(url: &str, title: &str) -> PostRecord {
        PostRecord::new(
            url,
            title.to_string(),
            String::new(),
            Vec::new(),
            Vec::new(),
            String::new(),
        )
    }

    #[test]
    fn test_merge_last_write_wins_keeps_position() {
        let prior = vec![post("https://a/1", "old"), post("https://a/2", "two")];
        let fresh = vec![post("https://a/3", "three"), post("https://a/1", "new")];

        let merged = merge_posts(prior, fresh);
        let urls: Vec<_> = merged.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a/1", "https://a/2", "https://a/3"]);
        assert_eq!(merged[0].title, "new");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let posts = vec![post("https://a/1", "one"), post("https://a/2", "two")];
        let merged = merge_posts(posts.clone(), posts.clone());
        assert_eq!(merged, posts);
        assert_eq!(merge_posts(merged.clone(), merged.clone()), merged);
    }

    #[test]
    fn test_merge_collapses_duplicates_within_one_side() {
        let prior = vec![post("https://a/1", "first"), post("https://a/1", "second")];
        let merged = merge_posts(prior, Vec::new());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "second");
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.json");

        let mut corpus = Corpus::empty("alice");
        corpus.posts.push(post("https://velog.io/@alice/a", "한글 제목"));
        save_corpus(&path, &corpus).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("한글 제목"), "non-ASCII must be written unescaped");

        let loaded = load_corpus(&path).await.unwrap();
        assert_eq!(loaded, corpus);
    }

    #[tokio::test]
    async fn test_resume_ignores_other_author() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        save_corpus(&path, &Corpus::empty("alice")).await.unwrap();

        assert!(load_resume_corpus(&path, "alice").await.unwrap().is_some());
        assert!(load_resume_corpus(&path, "bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resume_ignores_missing_and_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(load_resume_corpus(&missing, "alice").await.unwrap().is_none());

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "{not json").unwrap();
        assert!(load_resume_corpus(&corrupt, "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_newer_schema_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("future.json");
        let mut corpus = Corpus::empty("alice");
        corpus.schema_version = SCHEMA_VERSION + 1;
        save_corpus(&path, &corpus).await.unwrap();

        let err = load_corpus(&path).await.unwrap_err();
        assert!(matches!(err, CorpusError::UnsupportedSchema { found, .. } if found == SCHEMA_VERSION + 1));

        let err = load_resume_corpus(&path, "alice").await.unwrap_err();
        assert!(matches!(err, CorpusError::UnsupportedSchema { .. }));
    }
}
