//! ferry — parallel file moving with a shared multi-row progress display.
//!
//! Four independent operations: HTTP(S) downloads, object-storage uploads,
//! and tar.gz pack/unpack. Downloads and uploads run through a batch engine
//! that fans out one task per file and applies an abort or
//! contain-and-cleanup failure policy.

pub mod archive;
pub mod cli;
pub mod http;
pub mod logger;
pub mod progress;
pub mod storage;
pub mod transfer;
