//! Integration tests for deferred loaders: background work, owner-thread
//! finalize, dependency discovery off-thread, cancellation and failure
//! rollback.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use quiver_asset::{
    AnyLoader, Asset, AssetDescriptor, AssetError, AssetManager, DeferredLoader, FileHandle,
    ImmediateLoader, ManualWorker, MemoryResolver,
};

struct Sound {
    samples: Vec<u8>,
}
impl Asset for Sound {}

struct Texture(#[allow(dead_code)] Vec<u8>);
impl Asset for Texture {}

struct Atlas {
    texture_name: String,
}
impl Asset for Atlas {}

/// Decodes "wav" bytes on the worker thread, keeping the staging buffer
/// keyed by name until finalize consumes it on the owner thread.
#[derive(Default)]
struct SoundLoader {
    staging: Mutex<HashMap<String, Vec<u8>>>,
    off_thread_loads: Arc<AtomicUsize>,
    unloads: Arc<AtomicUsize>,
}

impl DeferredLoader for SoundLoader {
    fn load_off_thread(
        &self,
        _manager: &AssetManager,
        name: &str,
        file: &FileHandle,
        _params: Option<&(dyn Any + Send + Sync)>,
    ) -> anyhow::Result<()> {
        self.off_thread_loads.fetch_add(1, Ordering::SeqCst);
        self.staging.lock().insert(name.to_string(), file.read()?);
        Ok(())
    }

    fn finalize(
        &self,
        _manager: &AssetManager,
        name: &str,
        _file: &FileHandle,
        _params: Option<&(dyn Any + Send + Sync)>,
    ) -> anyhow::Result<Arc<dyn Asset>> {
        let samples = self
            .staging
            .lock()
            .remove(name)
            .ok_or_else(|| anyhow::anyhow!("no staged data for {name}"))?;
        Ok(Arc::new(Sound { samples }))
    }

    fn on_unload(&self, name: &str, _file: &FileHandle) {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        self.staging.lock().remove(name);
    }
}

struct TextureLoader;
impl ImmediateLoader for TextureLoader {
    fn load(
        &self,
        _manager: &AssetManager,
        _name: &str,
        file: &FileHandle,
        _params: Option<&(dyn Any + Send + Sync)>,
    ) -> anyhow::Result<Arc<dyn Asset>> {
        Ok(Arc::new(Texture(file.read()?)))
    }
}

/// Atlas pack files name their page texture on the first line; the
/// texture is a discovered dependency, fetched back out of the manager
/// during finalize.
#[derive(Default)]
struct AtlasLoader {
    staged: Mutex<HashMap<String, String>>,
}

impl DeferredLoader for AtlasLoader {
    fn dependencies(
        &self,
        _name: &str,
        file: &FileHandle,
        _params: Option<&(dyn Any + Send + Sync)>,
    ) -> anyhow::Result<Vec<AssetDescriptor>> {
        let text = file.read_to_string()?;
        Ok(text
            .lines()
            .take(1)
            .map(|line| AssetDescriptor::new::<Texture>(line.trim()))
            .collect())
    }

    fn load_off_thread(
        &self,
        _manager: &AssetManager,
        name: &str,
        file: &FileHandle,
        _params: Option<&(dyn Any + Send + Sync)>,
    ) -> anyhow::Result<()> {
        let text = file.read_to_string()?;
        let texture_name = text.lines().next().unwrap_or_default().trim().to_string();
        self.staged.lock().insert(name.to_string(), texture_name);
        Ok(())
    }

    fn finalize(
        &self,
        manager: &AssetManager,
        name: &str,
        _file: &FileHandle,
        _params: Option<&(dyn Any + Send + Sync)>,
    ) -> anyhow::Result<Arc<dyn Asset>> {
        let texture_name = self
            .staged
            .lock()
            .remove(name)
            .ok_or_else(|| anyhow::anyhow!("no staged atlas for {name}"))?;
        // The dependency is resident by contract; this must not fail.
        manager.get::<Texture>(&texture_name)?;
        Ok(Arc::new(Atlas { texture_name }))
    }
}

#[test]
fn deferred_end_to_end_with_worker_thread() {
    let resolver = Arc::new(MemoryResolver::new());
    resolver.insert("x.wav", vec![1u8, 2, 3]);
    let manager = AssetManager::new(resolver);
    let off_thread_loads = Arc::new(AtomicUsize::new(0));
    manager.set_loader::<Sound>(
        ".wav",
        AnyLoader::deferred(SoundLoader {
            off_thread_loads: off_thread_loads.clone(),
            ..Default::default()
        }),
    );

    manager.load::<Sound>("x.wav").unwrap();
    manager.finish_loading().unwrap();

    let sound = manager.get::<Sound>("x.wav").unwrap();
    assert_eq!(sound.samples, vec![1, 2, 3]);
    assert_eq!(manager.ref_count("x.wav"), 1);
    assert_eq!(off_thread_loads.load(Ordering::SeqCst), 1);
    manager.dispose().unwrap();
}

#[test]
fn deferred_dependency_discovery_and_cascade() {
    let resolver = Arc::new(MemoryResolver::new());
    resolver.insert_text("atlas.pack", "tex.png");
    resolver.insert("tex.png", vec![9u8; 16]);
    let manager = AssetManager::with_worker(resolver, Arc::new(ManualWorker::new()));
    manager.set_loader::<Atlas>(".pack", AnyLoader::deferred(AtlasLoader::default()));
    manager.set_loader::<Texture>(".png", AnyLoader::immediate(TextureLoader));

    manager.load::<Atlas>("atlas.pack").unwrap();
    manager.finish_loading().unwrap();

    assert_eq!(manager.dependencies("atlas.pack"), vec!["tex.png"]);
    assert_eq!(manager.ref_count("tex.png"), 1);
    let atlas = manager.get::<Atlas>("atlas.pack").unwrap();
    assert_eq!(atlas.texture_name, "tex.png");

    manager.unload("atlas.pack").unwrap();
    assert!(!manager.is_loaded("atlas.pack"));
    assert!(!manager.is_loaded("tex.png"));
    assert_eq!(manager.ref_count("tex.png"), 0);
}

#[test]
fn cancelled_deferred_load_runs_unload_hook() {
    let resolver = Arc::new(MemoryResolver::new());
    resolver.insert("x.wav", vec![1u8, 2, 3]);
    let manager = AssetManager::with_worker(resolver, Arc::new(ManualWorker::new()));
    let unloads = Arc::new(AtomicUsize::new(0));
    manager.set_loader::<Sound>(
        ".wav",
        AnyLoader::deferred(SoundLoader {
            unloads: unloads.clone(),
            ..Default::default()
        }),
    );

    manager.load::<Sound>("x.wav").unwrap();
    // Start the task, then submit its discovery job.
    assert!(!manager.update().unwrap());
    assert!(!manager.update().unwrap());

    manager.unload("x.wav").unwrap();
    manager.finish_loading().unwrap();

    assert!(!manager.contains("x.wav"));
    assert!(matches!(
        manager.get::<Sound>("x.wav"),
        Err(AssetError::NotLoaded { .. })
    ));
    assert_eq!(unloads.load(Ordering::SeqCst), 1);
}

#[test]
fn failure_without_listener_surfaces_from_update() {
    struct Failing;
    impl ImmediateLoader for Failing {
        fn load(
            &self,
            _manager: &AssetManager,
            _name: &str,
            _file: &FileHandle,
            _params: Option<&(dyn Any + Send + Sync)>,
        ) -> anyhow::Result<Arc<dyn Asset>> {
            anyhow::bail!("corrupt data")
        }
    }

    let resolver = Arc::new(MemoryResolver::new());
    resolver.insert_text("bad.txt", "x");
    let manager = AssetManager::with_worker(resolver, Arc::new(ManualWorker::new()));
    manager.set_loader::<Texture>(".txt", AnyLoader::immediate(Failing));

    manager.load::<Texture>("bad.txt").unwrap();
    let err = loop {
        match manager.update() {
            Ok(true) => panic!("load unexpectedly succeeded"),
            Ok(false) => continue,
            Err(err) => break err,
        }
    };
    assert!(matches!(err, AssetError::TaskFailed { .. }));
    assert!(err.to_string().contains("bad.txt"));
    assert!(!manager.contains("bad.txt"));
    assert!(manager.is_finished());
}

#[test]
fn failure_with_listener_is_routed_and_rolls_back_dependencies() {
    /// Discovers one dependency, then fails its own load step.
    struct FailingParent;
    impl ImmediateLoader for FailingParent {
        fn dependencies(
            &self,
            _name: &str,
            _file: &FileHandle,
            _params: Option<&(dyn Any + Send + Sync)>,
        ) -> anyhow::Result<Vec<AssetDescriptor>> {
            Ok(vec![AssetDescriptor::new::<Texture>("tex.png")])
        }

        fn load(
            &self,
            _manager: &AssetManager,
            _name: &str,
            _file: &FileHandle,
            _params: Option<&(dyn Any + Send + Sync)>,
        ) -> anyhow::Result<Arc<dyn Asset>> {
            anyhow::bail!("bad atlas")
        }
    }

    let resolver = Arc::new(MemoryResolver::new());
    resolver.insert_text("atlas.pack", "x");
    resolver.insert("tex.png", vec![1u8]);
    let manager = AssetManager::with_worker(resolver, Arc::new(ManualWorker::new()));
    manager.set_loader::<Atlas>(".pack", AnyLoader::immediate(FailingParent));
    manager.set_loader::<Texture>(".png", AnyLoader::immediate(TextureLoader));

    let failures = Arc::new(Mutex::new(Vec::new()));
    let failures_in_listener = failures.clone();
    manager.set_error_listener(move |descriptor, error| {
        failures_in_listener
            .lock()
            .push((descriptor.name.clone(), error.to_string()));
    });

    manager.load::<Atlas>("atlas.pack").unwrap();
    manager.finish_loading().unwrap();

    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "atlas.pack");
    // The injected dependency was rolled back with the failing branch.
    assert!(!manager.is_loaded("tex.png"));
    assert!(!manager.is_loaded("atlas.pack"));
    assert_eq!(manager.metrics().loads_failed(), 1);
}

#[test]
fn missing_file_fails_the_task() {
    let resolver = Arc::new(MemoryResolver::new());
    let manager = AssetManager::with_worker(resolver, Arc::new(ManualWorker::new()));
    manager.set_loader::<Texture>(".png", AnyLoader::immediate(TextureLoader));

    let seen = Arc::new(AtomicBool::new(false));
    let seen_in_listener = seen.clone();
    manager.set_error_listener(move |_, error| {
        assert!(matches!(error, AssetError::TaskFailed { .. }));
        seen_in_listener.store(true, Ordering::SeqCst);
    });

    manager.load::<Texture>("ghost.png").unwrap();
    manager.finish_loading().unwrap();
    assert!(seen.load(Ordering::SeqCst));
    assert!(!manager.contains("ghost.png"));
}

#[test]
fn finish_loading_asset_blocks_until_resident() {
    let resolver = Arc::new(MemoryResolver::new());
    resolver.insert("x.wav", vec![7u8]);
    let manager = AssetManager::new(resolver);
    manager.set_loader::<Sound>(".wav", AnyLoader::deferred(SoundLoader::default()));

    manager.load::<Sound>("x.wav").unwrap();
    let sound = manager.finish_loading_asset::<Sound>("x.wav").unwrap();
    assert_eq!(sound.samples, vec![7]);
    manager.dispose().unwrap();
}
