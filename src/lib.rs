//! velog activity analyzer library.
//!
//! Harvests every post of one velog author through a rendering backend,
//! persists the corpus as JSON, and derives an activity and topic profile
//! from it. An HTTP API exposes list and detail views of the same crawl.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod analysis;
pub mod config;
pub mod constants;
pub mod corpus;
pub mod crawler;
pub mod renderer;
pub mod temporal;
pub mod web;
