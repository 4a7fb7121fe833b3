//! The asset manager: cache, load queue, task stack and driver loop
//!
//! One owner thread drives `update` and owns every state transition;
//! deferred loaders run their expensive portion on the worker pool and
//! hand results back through job handles. All queue/stack/registry state
//! sits behind a single coarse mutex that is held only for bounded
//! bookkeeping, never across loader calls or blocking waits, so loader
//! code and background jobs are free to call back into manager accessors.
//!
//! # Example
//! ```ignore
//! let manager = AssetManager::new(FsResolver::new("assets"));
//! manager.set_loader::<Texture>(".png", AnyLoader::immediate(PngLoader::new()));
//! manager.load::<Texture>("hero.png")?;
//! manager.finish_loading()?;
//! let hero = manager.get::<Texture>("hero.png")?;
//! ```

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::asset::{downcast_arc, Asset};
use crate::descriptor::{AssetDescriptor, AssetKey, AssetType, DynParams, LoadRequest, LoadedCallback};
use crate::error::{AssetError, Result};
use crate::loader::{AnyLoader, LoaderRegistry};
use crate::metrics::MetricsHandle;
use crate::registry::Registry;
use crate::resolver::FileResolver;
use crate::task::{LoadingTask, StepOutcome};
use crate::worker::{SingleThreadWorker, WorkerPool};

/// Invoked with the failing request and its error when a load fails and a
/// listener is installed; without one, the error surfaces from `update`.
pub type ErrorListener = Arc<dyn Fn(&AssetDescriptor, &AssetError) + Send + Sync>;

struct ManagerState {
    registry: Registry,
    queue: VecDeque<LoadRequest>,
    stack: Vec<LoadingTask>,
    /// Per-batch dependency dedup, cleared after every injection.
    injected: HashSet<String>,
    loaded: usize,
    to_load: usize,
    peak_tasks: usize,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            registry: Registry::default(),
            queue: VecDeque::new(),
            stack: Vec::new(),
            injected: HashSet::new(),
            loaded: 0,
            to_load: 0,
            peak_tasks: 0,
        }
    }

    fn note_stack_depth(&mut self) {
        self.peak_tasks = self.peak_tasks.max(self.stack.len());
    }
}

struct Shared {
    state: Mutex<ManagerState>,
    loaders: RwLock<LoaderRegistry>,
    resolver: Box<dyn FileResolver>,
    worker: Arc<dyn WorkerPool>,
    listener: Mutex<Option<ErrorListener>>,
    metrics: MetricsHandle,
    disposed: AtomicBool,
}

/// Loads and caches named, typed assets.
///
/// Cheap to clone; clones share the same cache. Requests deduplicate via
/// reference counting: loading a resident name bumps its count instead of
/// running the loader again, and `unload` decrements until the value is
/// disposed at zero.
#[derive(Clone)]
pub struct AssetManager {
    shared: Arc<Shared>,
}

impl AssetManager {
    /// Create a manager with the default single-thread worker pool.
    pub fn new(resolver: impl FileResolver + 'static) -> Self {
        Self::with_worker(resolver, Arc::new(SingleThreadWorker::new()))
    }

    /// Create a manager driving deferred loads through `worker`.
    pub fn with_worker(resolver: impl FileResolver + 'static, worker: Arc<dyn WorkerPool>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ManagerState::new()),
                loaders: RwLock::new(LoaderRegistry::default()),
                resolver: Box::new(resolver),
                worker,
                listener: Mutex::new(None),
                metrics: MetricsHandle::new(),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn resolver(&self) -> &dyn FileResolver {
        self.shared.resolver.as_ref()
    }

    pub(crate) fn worker(&self) -> &Arc<dyn WorkerPool> {
        &self.shared.worker
    }

    /// Load/cache counters for this manager.
    pub fn metrics(&self) -> &MetricsHandle {
        &self.shared.metrics
    }

    // ---- loader registration ------------------------------------------

    /// Register `loader` for asset type `T` under a filename suffix.
    ///
    /// The empty suffix acts as a catch-all; among several registered
    /// suffixes the longest one matching the requested name wins.
    pub fn set_loader<T: Asset>(&self, suffix: &str, loader: AnyLoader) {
        self.shared
            .loaders
            .write()
            .insert(AssetType::of::<T>().id(), suffix, loader);
    }

    /// The loader that would serve a request for `name` of type `T`.
    pub fn loader_for<T: Asset>(&self, name: Option<&str>) -> Option<AnyLoader> {
        self.shared.loaders.read().select(AssetType::of::<T>().id(), name)
    }

    /// Install the error listener; load failures are routed to it instead
    /// of surfacing from `update`.
    pub fn set_error_listener(
        &self,
        listener: impl Fn(&AssetDescriptor, &AssetError) + Send + Sync + 'static,
    ) {
        *self.shared.listener.lock() = Some(Arc::new(listener));
    }

    /// Remove the error listener; failures surface from `update` again.
    pub fn clear_error_listener(&self) {
        *self.shared.listener.lock() = None;
    }

    // ---- requests -----------------------------------------------------

    /// Queue a load of `name` as asset type `T`.
    ///
    /// Fails fast with [`AssetError::NoLoader`] when no loader can serve
    /// the request, and with [`AssetError::TypeConflict`] when `name` is
    /// already queued, loading or resident under a different type. The
    /// actual work happens in subsequent [`update`](Self::update) calls.
    pub fn load<T: Asset>(&self, name: &str) -> Result<()> {
        self.load_with::<T>(name, None, None)
    }

    /// Queue a load with loader parameters and/or a completion callback.
    ///
    /// The callback fires on the owner thread once the asset is resident;
    /// it never fires for cancelled or failed requests.
    pub fn load_with<T: Asset>(
        &self,
        name: &str,
        params: Option<DynParams>,
        callback: Option<LoadedCallback>,
    ) -> Result<()> {
        self.ensure_live()?;
        let asset_type = AssetType::of::<T>();
        if self
            .shared
            .loaders
            .read()
            .select(asset_type.id(), Some(name))
            .is_none()
        {
            return Err(AssetError::NoLoader {
                name: name.to_string(),
                type_name: asset_type.name(),
            });
        }

        let mut state = self.shared.state.lock();
        self.check_type_agreement(&state, name, asset_type)?;

        // A fresh batch: previous counters no longer contribute to progress.
        if state.queue.is_empty() && state.stack.is_empty() {
            state.loaded = 0;
            state.to_load = 0;
            state.peak_tasks = 0;
        }
        state.to_load += 1;
        state.queue.push_back(LoadRequest {
            descriptor: AssetDescriptor {
                name: name.to_string(),
                asset_type,
                params,
            },
            callback,
        });
        debug!("queued load of {name:?} as {}", asset_type.name());
        Ok(())
    }

    fn check_type_agreement(
        &self,
        state: &ManagerState,
        name: &str,
        requested: AssetType,
    ) -> Result<()> {
        let existing = state
            .registry
            .asset_type(name)
            .or_else(|| {
                state
                    .queue
                    .iter()
                    .find(|r| r.descriptor.name == name)
                    .map(|r| r.descriptor.asset_type)
            })
            .or_else(|| {
                state
                    .stack
                    .iter()
                    .find(|t| t.name() == name)
                    .map(|t| t.descriptor.asset_type)
            });
        match existing {
            Some(existing) if existing != requested => Err(AssetError::TypeConflict {
                name: name.to_string(),
                existing: existing.name(),
                requested: requested.name(),
            }),
            _ => Ok(()),
        }
    }

    /// Decrement the reference count of `name`, disposing at zero.
    ///
    /// Unloading the key of an in-flight task cancels it cooperatively;
    /// unloading a queued key removes the request outright. Unknown names
    /// fail with [`AssetError::NotLoaded`].
    pub fn unload(&self, name: &str) -> Result<()> {
        self.ensure_live()?;
        let mut state = self.shared.state.lock();

        if let Some(task) = state.stack.iter().find(|t| t.name() == name) {
            task.cancel();
            debug!("requested cancellation of in-flight load {name:?}");
            return Ok(());
        }

        if let Some(index) = state.queue.iter().position(|r| r.descriptor.name == name) {
            state.queue.remove(index);
            state.to_load = state.to_load.saturating_sub(1);
            debug!("dropped queued load {name:?}");
            return Ok(());
        }

        if !state.registry.contains(name) {
            return Err(AssetError::NotLoaded {
                name: name.to_string(),
            });
        }
        if state.registry.release(name) {
            debug!("unloaded {name:?}");
        } else {
            debug!("decremented reference count of {name:?}");
        }
        Ok(())
    }

    // ---- accessors ----------------------------------------------------

    /// Fetch a resident asset, failing with [`AssetError::NotLoaded`] if
    /// it is absent or resident under a different type.
    pub fn get<T: Asset>(&self, name: &str) -> Result<Arc<T>> {
        self.try_get::<T>(name).ok_or_else(|| AssetError::NotLoaded {
            name: name.to_string(),
        })
    }

    /// Fetch a resident asset, or `None`.
    pub fn try_get<T: Asset>(&self, name: &str) -> Option<Arc<T>> {
        let value = self.shared.state.lock().registry.value(name)?;
        downcast_arc::<T>(value)
    }

    /// All resident assets of type `T`, as `(name, value)` pairs.
    pub fn get_all<T: Asset>(&self) -> Vec<(String, Arc<T>)> {
        let asset_type = AssetType::of::<T>();
        let state = self.shared.state.lock();
        state
            .registry
            .iter()
            .filter(|(_, ty, _)| *ty == asset_type)
            .filter_map(|(name, _, value)| {
                downcast_arc::<T>(value.clone()).map(|v| (name.to_string(), v))
            })
            .collect()
    }

    /// Identity of every resident asset, across all types.
    pub fn resident(&self) -> Vec<AssetKey> {
        let state = self.shared.state.lock();
        state
            .registry
            .iter()
            .map(|(name, asset_type, _)| AssetKey {
                name: name.to_string(),
                asset_type,
            })
            .collect()
    }

    /// Whether `name` is resident, queued or currently loading.
    pub fn contains(&self, name: &str) -> bool {
        let state = self.shared.state.lock();
        state.registry.contains(name)
            || state.queue.iter().any(|r| r.descriptor.name == name)
            || state.stack.iter().any(|t| t.name() == name)
    }

    /// Whether `name` is resident, queued or loading with type `T`.
    pub fn contains_as<T: Asset>(&self, name: &str) -> bool {
        let asset_type = AssetType::of::<T>();
        let state = self.shared.state.lock();
        state.registry.asset_type(name) == Some(asset_type)
            || state
                .queue
                .iter()
                .any(|r| r.descriptor.name == name && r.descriptor.asset_type == asset_type)
            || state
                .stack
                .iter()
                .any(|t| t.name() == name && t.descriptor.asset_type == asset_type)
    }

    /// Whether `name` is resident.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.shared.state.lock().registry.contains(name)
    }

    /// Whether `name` is resident as type `T`.
    pub fn is_loaded_as<T: Asset>(&self, name: &str) -> bool {
        self.shared.state.lock().registry.asset_type(name) == Some(AssetType::of::<T>())
    }

    /// Reference count of `name`; zero when not resident.
    pub fn ref_count(&self, name: &str) -> u32 {
        self.shared.state.lock().registry.ref_count(name)
    }

    /// Overwrite the reference count of a resident asset.
    pub fn set_ref_count(&self, name: &str, count: u32) -> Result<()> {
        if self.shared.state.lock().registry.set_ref_count(name, count) {
            Ok(())
        } else {
            Err(AssetError::NotLoaded {
                name: name.to_string(),
            })
        }
    }

    /// Names of the direct dependencies of `name`.
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        self.shared.state.lock().registry.dependencies(name)
    }

    /// The type `name` is resident under, if any.
    pub fn asset_type(&self, name: &str) -> Option<AssetType> {
        self.shared.state.lock().registry.asset_type(name)
    }

    /// Number of requests not yet resident (queued plus in-flight).
    pub fn queued_count(&self) -> usize {
        let state = self.shared.state.lock();
        state.queue.len() + state.stack.len()
    }

    /// Number of resident assets.
    pub fn loaded_count(&self) -> usize {
        self.shared.state.lock().registry.len()
    }

    /// Debug dump of resident assets, reference counts and pending work.
    pub fn diagnostics(&self) -> String {
        let state = self.shared.state.lock();
        let mut out = state.registry.diagnostics();
        if !state.queue.is_empty() {
            let queued: Vec<&str> = state.queue.iter().map(|r| r.descriptor.name.as_str()).collect();
            out.push_str(&format!("queued: {queued:?}\n"));
        }
        if !state.stack.is_empty() {
            let loading: Vec<&str> = state.stack.iter().map(|t| t.name()).collect();
            out.push_str(&format!("loading: {loading:?}\n"));
        }
        out
    }

    // ---- driver loop --------------------------------------------------

    /// Perform one bounded unit of loading work.
    ///
    /// Returns `Ok(true)` once the queue and the task stack are both
    /// empty. Never blocks on background jobs; deferred work still in
    /// flight is simply polled again on the next call. Task failures
    /// surface here (or go to the error listener, when installed) after
    /// the failing branch has been rolled back.
    pub fn update(&self) -> Result<bool> {
        self.ensure_live()?;
        self.shared.worker.drive();
        self.update_once()
    }

    /// Call [`update`](Self::update) until done or `millis` elapsed.
    ///
    /// The deadline never aborts in-flight work; on expiry the current
    /// status is returned and loading resumes with the next call.
    pub fn update_for(&self, millis: u64) -> Result<bool> {
        let deadline = Instant::now() + Duration::from_millis(millis);
        loop {
            if self.update()? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::yield_now();
        }
    }

    /// Block the calling thread until every queued load has finished.
    pub fn finish_loading(&self) -> Result<()> {
        while !self.update()? {
            thread::yield_now();
        }
        Ok(())
    }

    /// Block until `name` is resident and return it.
    pub fn finish_loading_asset<T: Asset>(&self, name: &str) -> Result<Arc<T>> {
        loop {
            if let Some(asset) = self.try_get::<T>(name) {
                return Ok(asset);
            }
            if self.update()? && self.try_get::<T>(name).is_none() {
                return Err(AssetError::NotLoaded {
                    name: name.to_string(),
                });
            }
            thread::yield_now();
        }
    }

    /// Whether the queue and the task stack are both empty.
    pub fn is_finished(&self) -> bool {
        let state = self.shared.state.lock();
        state.queue.is_empty() && state.stack.is_empty()
    }

    /// Overall load progress in `[0, 1]`.
    ///
    /// Counts finished top-level requests, refined by how far the active
    /// task's dependency chain has collapsed relative to its peak depth.
    pub fn progress(&self) -> f32 {
        let state = self.shared.state.lock();
        if state.to_load == 0 {
            return 1.0;
        }
        let mut fractional = state.loaded as f32;
        if state.peak_tasks > 0 {
            fractional +=
                (state.peak_tasks - state.stack.len().min(state.peak_tasks)) as f32
                    / state.peak_tasks as f32;
        }
        (fractional / state.to_load as f32).min(1.0)
    }

    fn update_once(&self) -> Result<bool> {
        let mut state = self.shared.state.lock();
        if state.stack.is_empty() {
            let Some(request) = state.queue.pop_front() else {
                return Ok(true);
            };
            if state.registry.contains(&request.descriptor.name) {
                return self.finish_resident(state, request);
            }
            return match self.spawn_task(request.descriptor.clone(), request.callback) {
                Ok(task) => {
                    debug!("starting load of {:?}", request.descriptor.name);
                    state.stack.push(task);
                    state.note_stack_depth();
                    Ok(false)
                }
                Err(error) => self.handle_task_failure(
                    state,
                    request.descriptor,
                    Vec::new(),
                    anyhow::Error::new(error),
                ),
            };
        }

        // Step the most-nested task with the lock released, so loaders and
        // callbacks can reach back into the manager.
        let mut task = match state.stack.pop() {
            Some(task) => task,
            None => return Ok(true),
        };
        drop(state);
        let step = task.step(self);
        let state = self.shared.state.lock();
        match step {
            Ok(StepOutcome::Pending) => self.keep_waiting(state, task),
            Ok(StepOutcome::InjectDeps(deps)) => self.inject_and_resume(state, task, deps),
            Ok(StepOutcome::Loaded(asset)) => self.complete_task(state, task, asset),
            Ok(StepOutcome::Cancelled) => self.discard_cancelled(state, task),
            Err(source) => {
                let descriptor = task.descriptor.clone();
                let dependencies = std::mem::take(&mut task.dependencies);
                self.handle_task_failure(state, descriptor, dependencies, source)
            }
        }
    }

    fn finish_resident(
        &self,
        mut state: MutexGuard<'_, ManagerState>,
        request: LoadRequest,
    ) -> Result<bool> {
        let name = request.descriptor.name.clone();
        state.registry.bump(&name);
        state.loaded += 1;
        self.shared.metrics.record_cache_hit();
        debug!("{name:?} already resident, bumped reference count");
        let done = state.queue.is_empty() && state.stack.is_empty();
        let callback = request.callback;
        drop(state);
        if let Some(callback) = callback {
            callback(self, &name);
        }
        Ok(done)
    }

    fn keep_waiting(
        &self,
        mut state: MutexGuard<'_, ManagerState>,
        task: LoadingTask,
    ) -> Result<bool> {
        state.stack.push(task);
        Ok(false)
    }

    fn inject_and_resume(
        &self,
        mut state: MutexGuard<'_, ManagerState>,
        task: LoadingTask,
        deps: Vec<AssetDescriptor>,
    ) -> Result<bool> {
        let parent = task.name().to_string();
        let descriptor = task.descriptor.clone();
        state.stack.push(task);
        match self.inject_dependencies(&mut state, &parent, &deps) {
            Ok(()) => Ok(false),
            // The task sits on the stack; the stack drain in the failure
            // path releases its dependency list, so none is passed here.
            Err(source) => self.handle_task_failure(state, descriptor, Vec::new(), source),
        }
    }

    /// Record edges and bring each unseen dependency in: residents get a
    /// reference-count bump, the rest become child tasks above the parent.
    fn inject_dependencies(
        &self,
        state: &mut ManagerState,
        parent: &str,
        deps: &[AssetDescriptor],
    ) -> anyhow::Result<()> {
        let result = (|| {
            for dep in deps {
                if !state.injected.insert(dep.name.clone()) {
                    continue;
                }
                // Same agreement rule as `load_with`: the name must not be
                // registered, queued or in flight under another type.
                self.check_type_agreement(state, &dep.name, dep.asset_type)
                    .map_err(anyhow::Error::new)?;
                state.registry.add_edge(parent, &dep.name);
                if state.registry.contains(&dep.name) {
                    state.registry.bump(&dep.name);
                    self.shared.metrics.record_cache_hit();
                } else {
                    let task = self.spawn_task(dep.clone(), None).map_err(anyhow::Error::new)?;
                    debug!("injecting dependency {:?} of {parent:?}", dep.name);
                    state.stack.push(task);
                    state.note_stack_depth();
                }
            }
            Ok(())
        })();
        state.injected.clear();
        result
    }

    fn complete_task(
        &self,
        mut state: MutexGuard<'_, ManagerState>,
        mut task: LoadingTask,
        asset: Arc<dyn Asset>,
    ) -> Result<bool> {
        let name = task.name().to_string();
        if state.registry.contains(&name) {
            // Duplicate completion: the same name was injected twice within
            // one dependency chain before either copy was resident.
            asset.dispose();
            state.registry.bump(&name);
        } else {
            state.registry.add(&name, task.descriptor.asset_type, asset);
        }
        if state.stack.is_empty() {
            state.loaded += 1;
            state.peak_tasks = 0;
        }
        let elapsed = task.started_at.elapsed();
        self.shared.metrics.record_load();
        self.shared.metrics.record_load_time(name.clone(), elapsed);
        debug!("loaded {name:?} in {elapsed:?}");
        let done = state.queue.is_empty() && state.stack.is_empty();
        let callback = task.callback.take();
        drop(state);
        if let Some(callback) = callback {
            callback(self, &name);
        }
        Ok(done)
    }

    fn discard_cancelled(
        &self,
        mut state: MutexGuard<'_, ManagerState>,
        task: LoadingTask,
    ) -> Result<bool> {
        debug!("discarded cancelled load {:?}", task.name());
        self.shared.metrics.record_cancellation();
        for dep in &task.dependencies {
            state.registry.release(&dep.name);
        }
        state.registry.remove_edges(task.name());
        if state.stack.is_empty() {
            state.loaded += 1;
            state.peak_tasks = 0;
        }
        Ok(state.queue.is_empty() && state.stack.is_empty())
    }

    /// Roll back the failing branch: release whatever it injected, clear
    /// the remaining stack, then hand the error to the listener or caller.
    fn handle_task_failure(
        &self,
        mut state: MutexGuard<'_, ManagerState>,
        descriptor: AssetDescriptor,
        dependencies: Vec<AssetDescriptor>,
        source: anyhow::Error,
    ) -> Result<bool> {
        warn!("load of {:?} failed: {source:#}", descriptor.name);
        self.shared.metrics.record_failure();
        for dep in &dependencies {
            state.registry.release(&dep.name);
        }
        state.registry.remove_edges(&descriptor.name);
        let abandoned: Vec<LoadingTask> = state.stack.drain(..).collect();
        for task in abandoned.iter().rev() {
            for dep in &task.dependencies {
                state.registry.release(&dep.name);
            }
            state.registry.remove_edges(task.name());
        }
        state.injected.clear();
        state.to_load = state.to_load.saturating_sub(1);
        let done = state.queue.is_empty();

        let error = AssetError::TaskFailed {
            name: descriptor.name.clone(),
            source,
        };
        let listener = self.shared.listener.lock().clone();
        drop(state);
        match listener {
            Some(listener) => {
                listener(&descriptor, &error);
                Ok(done)
            }
            None => Err(error),
        }
    }

    fn spawn_task(
        &self,
        descriptor: AssetDescriptor,
        callback: Option<LoadedCallback>,
    ) -> Result<LoadingTask> {
        let loader = self
            .shared
            .loaders
            .read()
            .select(descriptor.asset_type.id(), Some(&descriptor.name))
            .ok_or_else(|| AssetError::NoLoader {
                name: descriptor.name.clone(),
                type_name: descriptor.asset_type.name(),
            })?;
        Ok(LoadingTask::new(descriptor, callback, loader))
    }

    // ---- lifecycle ----------------------------------------------------

    /// Unload everything, roots first, after draining in-flight work.
    pub fn clear(&self) -> Result<()> {
        self.ensure_live()?;
        self.shared.state.lock().queue.clear();
        while !self.update()? {
            thread::yield_now();
        }
        let mut state = self.shared.state.lock();
        while !state.registry.is_empty() {
            let roots = state.registry.roots();
            if roots.is_empty() {
                // Only possible with hand-edited edges; drop what is left.
                state.registry.drain_dispose();
                break;
            }
            for root in roots {
                state.registry.release(&root);
            }
        }
        state.loaded = 0;
        state.to_load = 0;
        state.peak_tasks = 0;
        Ok(())
    }

    /// Clear the cache and shut down the worker pool. Idempotent; the
    /// manager rejects further requests afterwards.
    pub fn dispose(&self) -> Result<()> {
        if self.shared.disposed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.clear()?;
        self.shared.disposed.store(true, Ordering::Release);
        self.shared.worker.shutdown();
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        if self.shared.disposed.load(Ordering::Acquire) {
            return Err(AssetError::Disposed);
        }
        Ok(())
    }
}

impl fmt::Debug for AssetManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("AssetManager")
            .field("resident", &state.registry.len())
            .field("queued", &state.queue.len())
            .field("loading", &state.stack.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{FileHandle, MemoryResolver};
    use crate::worker::ManualWorker;
    use std::any::Any;

    struct Text(#[allow(dead_code)] String);
    impl Asset for Text {}

    struct TextLoader;
    impl crate::loader::ImmediateLoader for TextLoader {
        fn load(
            &self,
            _manager: &AssetManager,
            _name: &str,
            file: &FileHandle,
            _params: Option<&(dyn Any + Send + Sync)>,
        ) -> anyhow::Result<Arc<dyn Asset>> {
            Ok(Arc::new(Text(file.read_to_string()?)))
        }
    }

    fn manager_with_text_loader() -> (AssetManager, Arc<MemoryResolver>) {
        let resolver = Arc::new(MemoryResolver::new());
        resolver.insert_text("a.txt", "alpha");
        let manager =
            AssetManager::with_worker(resolver.clone(), Arc::new(ManualWorker::new()));
        manager.set_loader::<Text>(".txt", AnyLoader::immediate(TextLoader));
        (manager, resolver)
    }

    #[test]
    fn test_load_without_loader_fails_fast() {
        let manager =
            AssetManager::with_worker(MemoryResolver::new(), Arc::new(ManualWorker::new()));
        let err = manager.load::<Text>("a.txt").unwrap_err();
        assert!(matches!(err, AssetError::NoLoader { .. }));
    }

    #[test]
    fn test_get_missing_is_not_loaded() {
        let (manager, _) = manager_with_text_loader();
        assert!(matches!(
            manager.get::<Text>("a.txt"),
            Err(AssetError::NotLoaded { .. })
        ));
        assert!(manager.try_get::<Text>("a.txt").is_none());
    }

    #[test]
    fn test_simple_load_drain() {
        let (manager, _) = manager_with_text_loader();
        manager.load::<Text>("a.txt").unwrap();
        assert!(!manager.is_finished());
        manager.finish_loading().unwrap();
        assert!(manager.is_finished());
        assert_eq!(manager.ref_count("a.txt"), 1);
        assert!(manager.is_loaded_as::<Text>("a.txt"));
        assert!(manager.contains_as::<Text>("a.txt"));
    }

    #[test]
    fn test_unload_unknown_name() {
        let (manager, _) = manager_with_text_loader();
        assert!(matches!(
            manager.unload("nope.txt"),
            Err(AssetError::NotLoaded { .. })
        ));
    }

    #[test]
    fn test_dispose_rejects_further_requests() {
        let (manager, _) = manager_with_text_loader();
        manager.dispose().unwrap();
        assert!(matches!(
            manager.load::<Text>("a.txt"),
            Err(AssetError::Disposed)
        ));
        // Second dispose is a no-op.
        manager.dispose().unwrap();
    }
}
