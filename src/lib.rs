//! Docspp — a distributed document-storage service in which many clients
//! concurrently read and modify natural-language text files at sentence
//! granularity.
//!
//! A single coordinating [`name_node`] resolves logical paths to one of a
//! dynamic set of [`storage_node`]s and enforces access control; clients
//! then exchange data directly with the resolving storage node. The
//! [`locktable`] module provides the sentence-granular reader-writer
//! locking each storage node uses to serialize concurrent access, and
//! [`sentence`] provides the segmentation algorithm shared by every
//! component that needs to reason about sentence boundaries.

pub mod config;
pub mod error;
pub mod holder;
pub mod locktable;
pub mod name_node;
pub mod protocol;
pub mod sentence;
pub mod storage_node;
