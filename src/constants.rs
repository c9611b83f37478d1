//! Shared constants used across the application.

/// User agent string sent by both renderer backends.
pub const CRAWLER_USER_AGENT: &str = "SpecGuardBot/1.0 (+https://example.com)";

/// Identifier written to the `source` field of every corpus.
pub const CORPUS_SOURCE: &str = "velog";

/// Default base URL of the blogging platform.
pub const DEFAULT_BASE_URL: &str = "https://velog.io";
