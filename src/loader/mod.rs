//! Loader protocol and the per-type loader registry
//!
//! Two loader contracts exist. [`ImmediateLoader`] does all of its work
//! inline on the owner thread. [`DeferredLoader`] splits the load into a
//! background portion (dependency discovery and byte-level work on the
//! worker pool) and an owner-thread finalize step producing the value,
//! which is where owner-thread-only resources (GPU contexts, audio
//! devices) come into play.
//!
//! Loaders are registered per asset type under a filename suffix; lookup
//! picks the longest suffix matching the requested name, so a loader
//! registered for `".pvr.gz"` wins over one registered for `".gz"`, and
//! the empty suffix acts as a catch-all.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::asset::Asset;
use crate::descriptor::AssetDescriptor;
use crate::manager::AssetManager;
use crate::resolver::FileHandle;

/// A loader that runs entirely on the owner thread.
pub trait ImmediateLoader: Send + Sync + 'static {
    /// Report the assets that must be resident before [`load`] runs.
    ///
    /// [`load`]: ImmediateLoader::load
    fn dependencies(
        &self,
        _name: &str,
        _file: &FileHandle,
        _params: Option<&(dyn Any + Send + Sync)>,
    ) -> anyhow::Result<Vec<AssetDescriptor>> {
        Ok(Vec::new())
    }

    /// Produce the asset. All reported dependencies are resident and may
    /// be fetched through `manager`.
    fn load(
        &self,
        manager: &AssetManager,
        name: &str,
        file: &FileHandle,
        params: Option<&(dyn Any + Send + Sync)>,
    ) -> anyhow::Result<Arc<dyn Asset>>;
}

/// A loader whose expensive portion runs on the worker pool.
///
/// `dependencies` and `load_off_thread` execute on the worker thread and
/// must not touch owner-thread-only resources; partial results are kept
/// inside the loader (keyed by asset name) until `finalize` consumes them
/// on the owner thread.
pub trait DeferredLoader: Send + Sync + 'static {
    /// Report the assets that must be resident before the off-thread load
    /// runs. Executes on the worker thread.
    fn dependencies(
        &self,
        _name: &str,
        _file: &FileHandle,
        _params: Option<&(dyn Any + Send + Sync)>,
    ) -> anyhow::Result<Vec<AssetDescriptor>> {
        Ok(Vec::new())
    }

    /// The background portion of the load. Executes on the worker thread;
    /// dependencies are resident and may be fetched through `manager`.
    fn load_off_thread(
        &self,
        manager: &AssetManager,
        name: &str,
        file: &FileHandle,
        params: Option<&(dyn Any + Send + Sync)>,
    ) -> anyhow::Result<()>;

    /// Convert the background-prepared data into the final asset.
    /// Executes on the owner thread.
    fn finalize(
        &self,
        manager: &AssetManager,
        name: &str,
        file: &FileHandle,
        params: Option<&(dyn Any + Send + Sync)>,
    ) -> anyhow::Result<Arc<dyn Asset>>;

    /// Release partial off-thread state for a cancelled load.
    ///
    /// Called on the owner thread after any in-flight background job for
    /// the task has resolved; `finalize` will not run.
    fn on_unload(&self, _name: &str, _file: &FileHandle) {}
}

/// A registered loader of either kind.
///
/// The driver loop matches on the variant; there is no runtime type
/// inspection beyond this tag.
#[derive(Clone)]
pub enum AnyLoader {
    Immediate(Arc<dyn ImmediateLoader>),
    Deferred(Arc<dyn DeferredLoader>),
}

impl AnyLoader {
    pub fn immediate(loader: impl ImmediateLoader) -> Self {
        Self::Immediate(Arc::new(loader))
    }

    pub fn deferred(loader: impl DeferredLoader) -> Self {
        Self::Deferred(Arc::new(loader))
    }
}

impl std::fmt::Debug for AnyLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate(_) => f.write_str("AnyLoader::Immediate"),
            Self::Deferred(_) => f.write_str("AnyLoader::Deferred"),
        }
    }
}

/// Loaders keyed by asset type, then by filename suffix.
#[derive(Default)]
pub(crate) struct LoaderRegistry {
    by_type: HashMap<TypeId, Vec<(String, AnyLoader)>>,
}

impl LoaderRegistry {
    /// Register `loader` for the type under `suffix`, replacing any
    /// previous loader with the same suffix.
    pub(crate) fn insert(&mut self, type_id: TypeId, suffix: &str, loader: AnyLoader) {
        let entries = self.by_type.entry(type_id).or_default();
        if let Some(entry) = entries.iter_mut().find(|(s, _)| s == suffix) {
            entry.1 = loader;
        } else {
            entries.push((suffix.to_string(), loader));
        }
    }

    /// Pick the loader for `type_id` whose suffix is the longest match for
    /// `name`. `None` disables suffix filtering and returns the catch-all
    /// (or, failing that, any registered loader for the type).
    pub(crate) fn select(&self, type_id: TypeId, name: Option<&str>) -> Option<AnyLoader> {
        let entries = self.by_type.get(&type_id)?;
        match name {
            Some(name) => entries
                .iter()
                .filter(|(suffix, _)| suffix.is_empty() || name.ends_with(suffix.as_str()))
                .max_by_key(|(suffix, _)| suffix.len())
                .map(|(_, loader)| loader.clone()),
            None => entries
                .iter()
                .find(|(suffix, _)| suffix.is_empty())
                .or_else(|| entries.first())
                .map(|(_, loader)| loader.clone()),
        }
    }
}
