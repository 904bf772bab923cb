//! Storage driver abstraction for Stratus.
//!
//! This module provides a trait-based facade over heterogeneous object
//! storage backends, exposing one vocabulary (Driver, Container, Blob)
//! across all of them, plus a driver registry for dynamic backend
//! resolution and the two built-in backends that need no vendor SDK: the
//! local filesystem driver and an in-memory driver for testing.
//!
//! # Design Principles
//! - Driver isolation: no backend-specific logic leaks across drivers
//! - Synchronous operations: every call blocks the calling thread and
//!   spawns no background work
//! - Streaming: blob content moves through fixed-size blocks, never
//!   whole-file buffers
//! - Unified error semantics: consistent typed failures across backends

pub mod driver;
pub mod helpers;
pub mod local;
pub mod memory;
pub mod object;
pub mod registry;

pub use driver::{
    Capability, DownloadUrlOptions, Driver, FormPost, SignedPayload, UploadOptions,
    UploadUrlOptions,
};
pub use helpers::ChecksumAlgorithm;
pub use local::{LocalConfig, LocalDriver};
pub use memory::MemoryDriver;
pub use object::{Blob, Container};
pub use registry::{create_default_registry, DriverFactory, DriverRegistry};
