//! Persisted crawl output.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::CORPUS_SOURCE;

pub mod store;

pub use store::{
    load_corpus, load_resume_corpus, merge_posts, save_corpus, write_json, CorpusError,
};

/// Current on-disk schema version. Bump on any incompatible format change.
pub const SCHEMA_VERSION: u32 = 1;

/// Author block of a corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub handle: String,
}

/// One harvested post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Raw publish-time string as shown on the page; may be relative.
    #[serde(default)]
    pub published_at: String,
    #[serde(default)]
    pub updated_at: String,
    /// Cleaned body text.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub code_langs: Vec<String>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub content_hash: String,
}

impl PostRecord {
    /// Build a record from extracted fields, filling the schema placeholders.
    #[must_use]
    pub fn new(
        url: &str,
        title: String,
        text: String,
        tags: Vec<String>,
        code_langs: Vec<String>,
        published_at: String,
    ) -> Self {
        Self {
            url: url.to_string(),
            title,
            tags,
            published_at,
            updated_at: String::new(),
            text,
            code_langs,
            likes: 0,
            comments: 0,
            series: None,
            content_hash: content_hash(url),
        }
    }
}

/// Content-addressed identifier for a post, derived from its URL.
#[must_use]
pub fn content_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// The complete crawl output for one author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corpus {
    pub source: String,
    pub author: Author,
    pub schema_version: u32,
    #[serde(default)]
    pub posts: Vec<PostRecord>,
}

impl Corpus {
    /// An empty corpus for `handle` at the current schema version.
    #[must_use]
    pub fn empty(handle: &str) -> Self {
        Self {
            source: CORPUS_SOURCE.to_string(),
            author: Author {
                handle: handle.to_string(),
            },
            schema_version: SCHEMA_VERSION,
            posts: Vec::new(),
        }
    }

    #[must_use]
    pub fn handle(&self) -> &str {
        &self.author.handle
    }

    /// URLs already present, used as the skip-list when resuming.
    #[must_use]
    pub fn urls(&self) -> std::collections::HashSet<String> {
        self.posts.iter().map(|p| p.url.clone()).collect()
    }
}
