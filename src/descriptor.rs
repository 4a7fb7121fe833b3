//! Asset identity and load-request descriptors
//!
//! An asset is identified by its name together with its Rust type. The
//! descriptor carries everything a loader needs to start work: the name,
//! the type tag and optional loader-specific parameters.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::asset::Asset;
use crate::manager::AssetManager;

/// Runtime tag for an asset's Rust type.
///
/// Wraps the `TypeId` for identity checks and keeps the type name around
/// for error messages and diagnostics.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetType {
    id: TypeId,
    name: &'static str,
}

impl AssetType {
    /// The tag for asset type `T`.
    pub fn of<T: Asset>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// The underlying `TypeId`.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Human-readable type name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Identity of a cacheable resource: name plus type tag.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct AssetKey {
    pub name: String,
    pub asset_type: AssetType,
}

/// Opaque loader parameters, downcast by the loader that consumes them.
pub type DynParams = Arc<dyn Any + Send + Sync>;

/// Callback fired on the owner thread once a requested asset is resident.
///
/// Never fired for cancelled or failed requests.
pub type LoadedCallback = Box<dyn FnOnce(&AssetManager, &str) + Send>;

/// Describes one requested asset: name, type and optional parameters.
///
/// Dependency lists reported by loaders are vectors of descriptors.
#[derive(Clone)]
pub struct AssetDescriptor {
    pub name: String,
    pub asset_type: AssetType,
    pub params: Option<DynParams>,
}

impl AssetDescriptor {
    /// Create a descriptor for asset type `T` without parameters.
    pub fn new<T: Asset>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            asset_type: AssetType::of::<T>(),
            params: None,
        }
    }

    /// Create a descriptor carrying loader parameters.
    pub fn with_params<T: Asset>(name: impl Into<String>, params: DynParams) -> Self {
        Self {
            name: name.into(),
            asset_type: AssetType::of::<T>(),
            params: Some(params),
        }
    }

    /// The (name, type) identity of this descriptor.
    pub fn key(&self) -> AssetKey {
        AssetKey {
            name: self.name.clone(),
            asset_type: self.asset_type,
        }
    }

    pub(crate) fn params_ref(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.params.as_deref()
    }
}

impl fmt::Debug for AssetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetDescriptor")
            .field("name", &self.name)
            .field("type", &self.asset_type.name())
            .finish()
    }
}

/// A queued top-level request: descriptor plus completion callback.
pub(crate) struct LoadRequest {
    pub(crate) descriptor: AssetDescriptor,
    pub(crate) callback: Option<LoadedCallback>,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Texture;
    impl Asset for Texture {}

    struct Sound;
    impl Asset for Sound {}

    #[test]
    fn test_asset_type_identity() {
        assert_eq!(AssetType::of::<Texture>(), AssetType::of::<Texture>());
        assert_ne!(AssetType::of::<Texture>(), AssetType::of::<Sound>());
    }

    #[test]
    fn test_asset_type_name() {
        assert!(AssetType::of::<Texture>().name().contains("Texture"));
    }

    #[test]
    fn test_descriptor_params_downcast() {
        let desc =
            AssetDescriptor::with_params::<Texture>("a.png", Arc::new(7u32) as DynParams);
        let value = desc
            .params_ref()
            .and_then(|p| p.downcast_ref::<u32>())
            .copied();
        assert_eq!(value, Some(7));
    }
}
