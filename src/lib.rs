//! quiver_asset - Cooperative asset loading and lifecycle manager
//!
//! # Features
//! - Named, typed asset cache with reference counting
//! - Automatic transitive dependency loading and unloading
//! - Immediate (owner-thread) and deferred (background + finalize) loaders
//! - Non-blocking driver loop: one bounded unit of work per `update`
//! - Suffix-based loader selection per asset type
//! - Pluggable file resolution and worker pool (mock variants for tests)
//!
//! # Quick Start
//!
//! ```ignore
//! use quiver_asset::{AnyLoader, AssetManager, FsResolver};
//!
//! let manager = AssetManager::new(FsResolver::new("assets"));
//! manager.set_loader::<Texture>(".png", AnyLoader::immediate(PngLoader::default()));
//! manager.load::<Texture>("hero.png")?;
//! while !manager.update()? {
//!     // interleave a frame of other work here
//! }
//! let hero = manager.get::<Texture>("hero.png")?;
//! ```
//!
//! Exactly one thread (the owner thread) may drive `update` and the other
//! mutating entry points; loaders and background jobs may call the
//! read-only accessors from anywhere.

// Core modules
pub mod loader;
pub mod manager;
pub mod worker;
mod registry;
mod task;

// Support modules
pub mod asset;
pub mod descriptor;
pub mod metrics;
pub mod resolver;

// Error types
mod error;
pub use error::{AssetError, Result};

// Re-export main types from the manager
pub use manager::{AssetManager, ErrorListener};

// Re-export identity and request types
pub use asset::Asset;
pub use descriptor::{AssetDescriptor, AssetKey, AssetType, DynParams, LoadedCallback};

// Re-export loader protocol types
pub use loader::{AnyLoader, DeferredLoader, ImmediateLoader};

// Re-export file resolution types
pub use resolver::{FileHandle, FileResolver, FsResolver, MemoryResolver};

// Re-export worker pool types
pub use worker::{Job, JobHandle, JobOutcome, JobYield, ManualWorker, SingleThreadWorker, WorkerPool};

// Re-export metrics types
pub use metrics::{LoadMetrics, MetricsHandle};
