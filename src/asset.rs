//! The `Asset` trait implemented by every cacheable resource type
//!
//! Loaded values are stored type-erased as `Arc<dyn Asset>` and recovered
//! through their concrete type at the `get` call sites.

use std::any::Any;
use std::sync::Arc;

/// A named, typed, cacheable resource.
///
/// Any `'static + Send + Sync` type can be an asset. Types owning external
/// resources (GPU buffers, audio voices, file locks) override [`dispose`]
/// to release them; the manager invokes it exactly once, on the owner
/// thread, when the reference count of the asset reaches zero.
///
/// [`dispose`]: Asset::dispose
pub trait Asset: Any + Send + Sync {
    /// Release resources held by this asset.
    ///
    /// Called exactly once when the asset leaves the registry. The default
    /// implementation does nothing; plain data assets rely on `Drop`.
    fn dispose(&self) {}
}

/// Recover the concrete type of a cached asset value.
pub(crate) fn downcast_arc<T: Asset>(value: Arc<dyn Asset>) -> Option<Arc<T>> {
    let any: Arc<dyn Any + Send + Sync> = value;
    any.downcast::<T>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Text(String);
    impl Asset for Text {}

    struct Blob;
    impl Asset for Blob {}

    #[test]
    fn test_downcast_roundtrip() {
        let asset: Arc<dyn Asset> = Arc::new(Text("hello".to_string()));
        let text = downcast_arc::<Text>(asset).unwrap();
        assert_eq!(text.0, "hello");
    }

    #[test]
    fn test_downcast_wrong_type() {
        let asset: Arc<dyn Asset> = Arc::new(Blob);
        assert!(downcast_arc::<Text>(asset).is_none());
    }
}
