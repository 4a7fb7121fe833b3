//! Per-asset loading state machine
//!
//! A task exists only while work for one request is outstanding. The
//! driver loop steps the top-of-stack task once per `update`; a step
//! never blocks on the worker pool, it only polls job handles.
//!
//! Background jobs never touch manager state. Discovery results travel
//! back through the job handle and the owner thread performs dependency
//! injection at the next poll.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::asset::Asset;
use crate::descriptor::{AssetDescriptor, LoadedCallback};
use crate::loader::{AnyLoader, DeferredLoader, ImmediateLoader};
use crate::manager::AssetManager;
use crate::resolver::FileHandle;
use crate::worker::{JobHandle, JobYield};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    DiscoveringDependencies,
    WaitingOnDependencies,
    Working,
}

/// What one step of a task produced.
pub(crate) enum StepOutcome {
    /// Nothing to do yet; revisit on a later update.
    Pending,
    /// Dependencies discovered; the driver injects them, pushing child
    /// tasks above this one.
    InjectDeps(Vec<AssetDescriptor>),
    /// The final value; the task is done.
    Loaded(Arc<dyn Asset>),
    /// Cancel flag observed and all in-flight jobs resolved; discard.
    Cancelled,
}

pub(crate) struct LoadingTask {
    pub(crate) descriptor: AssetDescriptor,
    pub(crate) callback: Option<LoadedCallback>,
    pub(crate) dependencies: Vec<AssetDescriptor>,
    pub(crate) started_at: Instant,
    loader: AnyLoader,
    file: Option<FileHandle>,
    phase: Phase,
    deps_job: Option<JobHandle>,
    load_job: Option<JobHandle>,
    async_done: bool,
    cancel: Arc<AtomicBool>,
}

impl LoadingTask {
    pub(crate) fn new(
        descriptor: AssetDescriptor,
        callback: Option<LoadedCallback>,
        loader: AnyLoader,
    ) -> Self {
        Self {
            descriptor,
            callback,
            dependencies: Vec::new(),
            started_at: Instant::now(),
            loader,
            file: None,
            phase: Phase::DiscoveringDependencies,
            deps_job: None,
            load_job: None,
            async_done: false,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Request cooperative cancellation; observed at the next step.
    pub(crate) fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Advance the state machine by one bounded step.
    ///
    /// Called by the driver with the manager state lock released, so
    /// loader code is free to call back into manager accessors. Errors
    /// are returned to the driver for rollback; nothing is handled here.
    pub(crate) fn step(&mut self, manager: &AssetManager) -> anyhow::Result<StepOutcome> {
        if self.is_cancelled() {
            return Ok(self.step_cancelled());
        }
        match self.loader.clone() {
            AnyLoader::Immediate(loader) => self.step_immediate(manager, &*loader),
            AnyLoader::Deferred(loader) => self.step_deferred(manager, loader),
        }
    }

    fn step_immediate(
        &mut self,
        manager: &AssetManager,
        loader: &dyn ImmediateLoader,
    ) -> anyhow::Result<StepOutcome> {
        let file = self.ensure_file(manager)?;
        let name = self.descriptor.name.clone();
        match self.phase {
            Phase::DiscoveringDependencies => {
                let deps = loader.dependencies(&name, &file, self.params())?;
                if deps.is_empty() {
                    let asset = loader.load(manager, &name, &file, self.params())?;
                    return Ok(StepOutcome::Loaded(asset));
                }
                self.dependencies = dedup_by_name(deps);
                self.phase = Phase::WaitingOnDependencies;
                Ok(StepOutcome::InjectDeps(self.dependencies.clone()))
            }
            // The driver revisits this task only once every injected child
            // has popped, so dependencies are resident here.
            Phase::WaitingOnDependencies | Phase::Working => {
                let asset = loader.load(manager, &name, &file, self.params())?;
                Ok(StepOutcome::Loaded(asset))
            }
        }
    }

    fn step_deferred(
        &mut self,
        manager: &AssetManager,
        loader: Arc<dyn DeferredLoader>,
    ) -> anyhow::Result<StepOutcome> {
        let file = self.ensure_file(manager)?;
        let name = self.descriptor.name.clone();
        match self.phase {
            Phase::DiscoveringDependencies => {
                if self.deps_job.is_none() {
                    self.deps_job = Some(self.submit_discovery(manager, &loader, &file));
                    return Ok(StepOutcome::Pending);
                }
                let Some(outcome) = self.deps_job.as_ref().and_then(|job| job.take()) else {
                    return Ok(StepOutcome::Pending);
                };
                match outcome? {
                    JobYield::Dependencies(deps) => {
                        self.dependencies = dedup_by_name(deps);
                        self.phase = Phase::WaitingOnDependencies;
                        Ok(StepOutcome::InjectDeps(self.dependencies.clone()))
                    }
                    JobYield::OffThreadDone => {
                        // No dependencies: the discovery job already ran the
                        // off-thread portion, finalize right away.
                        self.async_done = true;
                        let asset = loader.finalize(manager, &name, &file, self.params())?;
                        Ok(StepOutcome::Loaded(asset))
                    }
                    JobYield::Cancelled => Ok(StepOutcome::Cancelled),
                }
            }
            Phase::WaitingOnDependencies => {
                if self.async_done {
                    let asset = loader.finalize(manager, &name, &file, self.params())?;
                    return Ok(StepOutcome::Loaded(asset));
                }
                self.phase = Phase::Working;
                self.load_job = Some(self.submit_off_thread_load(manager, &loader, &file));
                Ok(StepOutcome::Pending)
            }
            Phase::Working => {
                let Some(outcome) = self.load_job.as_ref().and_then(|job| job.take()) else {
                    return Ok(StepOutcome::Pending);
                };
                match outcome? {
                    JobYield::Cancelled => Ok(StepOutcome::Cancelled),
                    _ => {
                        let asset = loader.finalize(manager, &name, &file, self.params())?;
                        Ok(StepOutcome::Loaded(asset))
                    }
                }
            }
        }
    }

    fn step_cancelled(&mut self) -> StepOutcome {
        // Let in-flight background work drain before discarding, so the
        // loader's partial state is stable when the unload hook runs.
        for job in [&self.deps_job, &self.load_job].into_iter().flatten() {
            if !job.is_done() {
                return StepOutcome::Pending;
            }
        }
        if let AnyLoader::Deferred(loader) = &self.loader {
            if self.deps_job.is_some() || self.load_job.is_some() {
                if let Some(file) = &self.file {
                    loader.on_unload(&self.descriptor.name, file);
                }
            }
        }
        StepOutcome::Cancelled
    }

    fn submit_discovery(
        &self,
        manager: &AssetManager,
        loader: &Arc<dyn DeferredLoader>,
        file: &FileHandle,
    ) -> JobHandle {
        let worker = manager.worker().clone();
        let loader = loader.clone();
        let manager = manager.clone();
        let file = file.clone();
        let descriptor = self.descriptor.clone();
        let cancel = self.cancel.clone();
        worker.submit(Box::new(move || {
            if cancel.load(Ordering::Acquire) {
                return Ok(JobYield::Cancelled);
            }
            let deps = loader.dependencies(&descriptor.name, &file, descriptor.params_ref())?;
            if deps.is_empty() {
                loader.load_off_thread(&manager, &descriptor.name, &file, descriptor.params_ref())?;
                Ok(JobYield::OffThreadDone)
            } else {
                Ok(JobYield::Dependencies(deps))
            }
        }))
    }

    fn submit_off_thread_load(
        &self,
        manager: &AssetManager,
        loader: &Arc<dyn DeferredLoader>,
        file: &FileHandle,
    ) -> JobHandle {
        let worker = manager.worker().clone();
        let loader = loader.clone();
        let manager = manager.clone();
        let file = file.clone();
        let descriptor = self.descriptor.clone();
        let cancel = self.cancel.clone();
        worker.submit(Box::new(move || {
            if cancel.load(Ordering::Acquire) {
                return Ok(JobYield::Cancelled);
            }
            loader.load_off_thread(&manager, &descriptor.name, &file, descriptor.params_ref())?;
            Ok(JobYield::OffThreadDone)
        }))
    }

    fn ensure_file(&mut self, manager: &AssetManager) -> anyhow::Result<FileHandle> {
        if let Some(file) = &self.file {
            return Ok(file.clone());
        }
        let file = manager
            .resolver()
            .resolve(&self.descriptor.name)
            .map_err(anyhow::Error::new)?;
        self.file = Some(file.clone());
        Ok(file)
    }

    fn params(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.descriptor.params_ref()
    }
}

/// Drop duplicate descriptors within one task's dependency list; the
/// first occurrence of a name wins.
fn dedup_by_name(deps: Vec<AssetDescriptor>) -> Vec<AssetDescriptor> {
    let mut seen = std::collections::HashSet::new();
    deps.into_iter()
        .filter(|d| seen.insert(d.name.clone()))
        .collect()
}
