pub mod access;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod metadata;
pub mod models;
pub mod storage;
pub mod web;

pub use access::{AccessPolicy, Decision, DenyReason};
pub use fingerprint::{Fingerprint, fingerprint};
pub use ingest::{IncomingFile, IngestError, IngestPipeline};
pub use metadata::{ExifStrategy, MetadataExtractor, extract};
