//! The load coordinator: triggers a named load at most once, caches its
//! result in the [`TreeContext`](crate::store::TreeContext) of its scope,
//! and re-exposes it until explicitly reloaded.
//!
//! Which source a [`Loader::load`] resolves from is decided in order:
//!
//! 1. Outside of [`Mode::Csr`], a value already cached under the same
//!    name is adopted as is.
//! 2. A pending load already registered under the same name is joined
//!    rather than started again.
//! 3. On the client, a [data marker](crate::marker) of the same name is
//!    consumed without invoking the loader.
//! 4. Otherwise the loader is invoked, with the argument of the latest
//!    reload if one was given, or the default argument.
//!
//! The loader runs on a spawned task, so it carries on to completion even
//! when nothing waits on it any longer, e.g. after the collector gave up.

use std::{
    fmt,
    future::Future,
    sync::{Arc, Weak},
};

use any_spawner::Executor;
use futures::{
    channel::oneshot,
    future::{self, BoxFuture},
    FutureExt,
};
use leptos::prelude::{ArcReadSignal, ArcRwSignal, Update};
use parking_lot::{Mutex, RwLock};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    config::Mode,
    error::LoadError,
    scope::LoadScope,
    store::{PendingEntry, PendingOp},
    suspense::AdapterState,
};

type Fetcher<T, V> = Arc<dyn Fn(V) -> BoxFuture<'static, T> + Send + Sync>;
type Completion<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// The per-instance state of a loader.
pub(crate) struct LoadRecord<T, V> {
    pub(crate) value: Option<T>,
    pub(crate) initialized: bool,
    pub(crate) hydrated: bool,
    pub(crate) argument: Option<V>,
    pub(crate) in_flight: Option<PendingOp>,
    // bumped on reload so a superseded load cannot settle this record
    pub(crate) generation: u64,
}

impl<T, V> Default for LoadRecord<T, V> {
    fn default() -> Self {
        Self {
            value: None,
            initialized: false,
            hydrated: false,
            argument: None,
            in_flight: None,
            generation: 0,
        }
    }
}

/// The reload trigger of a [`Loader`].
///
/// This only holds on to the loader weakly; once the loader is gone,
/// triggering it does nothing.
pub struct Dispatch<V> {
    inner: Arc<dyn Fn(Option<V>) + Send + Sync>,
}

impl<V> Clone for Dispatch<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> Dispatch<V> {
    pub fn new(f: impl Fn(Option<V>) + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(f) }
    }

    /// Reload with the default argument.
    pub fn reload(&self) {
        (self.inner)(None)
    }

    /// Reload with `argument`, which also becomes the argument of any
    /// subsequent load until the next reload.
    pub fn reload_with(&self, argument: V) {
        (self.inner)(Some(argument))
    }

    pub fn call(&self, argument: Option<V>) {
        (self.inner)(argument)
    }
}

impl<V> fmt::Debug for Dispatch<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dispatch")
    }
}

/// A slot the [`Dispatch`] of a loader is placed into once it is built,
/// for views far away from the loader to reload it.
pub struct DispatchSlot<V> {
    inner: Arc<RwLock<Option<Dispatch<V>>>>,
}

impl<V> Clone for DispatchSlot<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> Default for DispatchSlot<V> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
        }
    }
}

impl<V> DispatchSlot<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Dispatch<V>> {
        self.inner.read().clone()
    }

    /// Reload the loader in this slot, returning whether there was one.
    pub fn reload(&self) -> bool {
        self.get().map(|dispatch| dispatch.reload()).is_some()
    }

    pub fn reload_with(&self, argument: V) -> bool {
        self.get()
            .map(|dispatch| dispatch.reload_with(argument))
            .is_some()
    }

    fn fill(&self, dispatch: Dispatch<V>) {
        *self.inner.write() = Some(dispatch);
    }
}

impl<V> fmt::Debug for DispatchSlot<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchSlot")
            .field("filled", &self.inner.read().is_some())
            .finish()
    }
}

/// Loads the value named `name` for the view tree.
///
/// Names must be unique among the loaders active within one scope, as
/// loaders sharing a name share their cached value.
pub struct Loader<T, V = ()> {
    inner: Arc<LoaderInner<T, V>>,
}

impl<T, V> Clone for Loader<T, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub(crate) struct LoaderInner<T, V> {
    name: String,
    mode: Mode,
    scope: LoadScope,
    fetcher: Fetcher<T, V>,
    default_arg: V,
    on_complete: Option<Completion<T>>,
    record: RwLock<LoadRecord<T, V>>,
    adapter: Mutex<AdapterState>,
    refresh: ArcRwSignal<usize>,
}

/// Configures a [`Loader`] before it is built.
pub struct LoaderBuilder<T, V> {
    name: String,
    fetcher: Fetcher<T, V>,
    mode: Mode,
    default_arg: V,
    on_complete: Option<Completion<T>>,
    slot: Option<DispatchSlot<V>>,
    scope: Option<LoadScope>,
}

impl<T, V> LoaderBuilder<T, V>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn default_arg(mut self, argument: V) -> Self {
        self.default_arg = argument;
        self
    }

    /// Invoked with the value whenever a load settles.
    pub fn on_complete(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(f));
        self
    }

    /// Place the reload trigger into `slot` once built.
    pub fn dispatch_slot(mut self, slot: &DispatchSlot<V>) -> Self {
        self.slot = Some(slot.clone());
        self
    }

    /// Resolve against `scope` instead of the one provided as context.
    pub fn scope(mut self, scope: LoadScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn build(self) -> Loader<T, V> {
        let scope = self.scope.unwrap_or_else(LoadScope::current);
        let loader = Loader {
            inner: Arc::new(LoaderInner {
                adapter: Mutex::new(AdapterState::new(self.mode)),
                name: self.name,
                mode: self.mode,
                scope,
                fetcher: self.fetcher,
                default_arg: self.default_arg,
                on_complete: self.on_complete,
                record: RwLock::new(LoadRecord::default()),
                refresh: ArcRwSignal::new(0),
            }),
        };
        if let Some(slot) = self.slot {
            slot.fill(loader.dispatch());
        }
        let _ = loader.adopt_cached();
        loader
    }
}

impl<T, V> Loader<T, V>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Begin configuring a loader named `name` that invokes `fetcher`
    /// with `V::default()` unless told otherwise.
    pub fn builder<F, Fut>(name: impl Into<String>, fetcher: F) -> LoaderBuilder<T, V>
    where
        V: Default,
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Self::builder_with_arg(name, V::default(), fetcher)
    }

    pub fn builder_with_arg<F, Fut>(
        name: impl Into<String>,
        default_arg: V,
        fetcher: F,
    ) -> LoaderBuilder<T, V>
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        LoaderBuilder {
            name: name.into(),
            fetcher: Arc::new(move |argument| fetcher(argument).boxed()),
            mode: Mode::default(),
            default_arg,
            on_complete: None,
            slot: None,
            scope: None,
        }
    }

    /// A loader with every option left at its default.
    pub fn new<F, Fut>(name: impl Into<String>, fetcher: F) -> Self
    where
        V: Default,
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Self::builder(name, fetcher).build()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    pub fn scope(&self) -> &LoadScope {
        &self.inner.scope
    }

    pub fn value(&self) -> Option<T> {
        self.inner.record.read().value.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.record.read().initialized
    }

    /// Whether the value was taken from a data marker.
    pub fn is_hydrated(&self) -> bool {
        self.inner.record.read().hydrated
    }

    /// Bumped every time the view of this loader needs to be rendered
    /// again.
    pub fn refresh(&self) -> ArcReadSignal<usize> {
        self.inner.refresh.read_only()
    }

    pub(crate) fn adapter_state(&self) -> &Mutex<AdapterState> {
        &self.inner.adapter
    }

    pub(crate) fn request_render(&self) {
        self.inner.refresh.update(|n| *n += 1);
    }

    pub(crate) fn generation(&self) -> u64 {
        self.inner.record.read().generation
    }

    /// The reload trigger of this loader.
    pub fn dispatch(&self) -> Dispatch<V> {
        let weak: Weak<LoaderInner<T, V>> = Arc::downgrade(&self.inner);
        Dispatch::new(move |argument| {
            if let Some(inner) = weak.upgrade() {
                Loader { inner }.reload(argument);
            }
        })
    }

    // Take the value cached under this name, unless running client-only.
    // An unreadable entry is left for the loader to replace.
    pub(crate) fn adopt_cached(&self) -> Option<PendingOp> {
        let inner = &self.inner;
        if inner.mode == Mode::Csr {
            return None;
        }
        let cached = inner.scope.context().cache().get(&inner.name)?;
        match self.decode(cached.clone()) {
            Ok(value) => {
                tracing::trace!(name = %inner.name, "adopting cached value");
                self.complete(self.generation(), value, None);
                Some(future::ready(Ok(cached)).boxed().shared())
            }
            Err(error) => {
                tracing::warn!(name = %inner.name, %error, "ignoring cached value");
                None
            }
        }
    }

    fn decode(&self, value: Value) -> Result<T, LoadError> {
        serde_json::from_value(value).map_err(|e| LoadError::decode(&self.inner.name, e))
    }

    /// Start, join or hydrate the load, returning the operation that
    /// settles with its value.
    ///
    /// Calling this again before the load settles returns the same
    /// operation, and a value cached in the meantime by another loader of
    /// the same name is adopted rather than loaded again.
    pub fn load(&self) -> PendingOp {
        let inner = &self.inner;
        if let Some(op) = inner.record.read().in_flight.clone() {
            return op;
        }
        if let Some(op) = self.adopt_cached() {
            return op;
        }

        let context = inner.scope.context();
        let mut record = inner.record.write();
        if let Some(op) = &record.in_flight {
            return op.clone();
        }

        if let Some(entry) = context.pending().get(&inner.name) {
            tracing::trace!(name = %inner.name, "joining pending load");
            record.in_flight = Some(entry.operation.clone());
            return entry.operation;
        }
        if !inner.scope.is_server() && inner.mode != Mode::Csr {
            if let Some(value) = inner.scope.markers().take(&inner.name) {
                let generation = record.generation;
                drop(record);
                return self.hydrate(generation, value);
            }
        }

        let argument = record
            .argument
            .clone()
            .unwrap_or_else(|| inner.default_arg.clone());
        let generation = record.generation;
        let (sender, receiver) = oneshot::channel();
        let op: PendingOp = {
            let name = inner.name.clone();
            receiver
                .map(move |result| result.unwrap_or(Err(LoadError::Abandoned { name })))
                .boxed()
                .shared()
        };
        record.in_flight = Some(op.clone());
        context.pending().insert(
            inner.name.clone(),
            PendingEntry {
                operation: op.clone(),
                streamed: inner.mode == Mode::Streaming,
            },
        );
        drop(record);

        tracing::debug!(
            name = %inner.name,
            mode = ?inner.mode,
            side = ?inner.scope.side(),
            "starting load",
        );
        let fetch = (inner.fetcher)(argument);
        let this = self.clone();
        Executor::spawn(async move {
            let value = fetch.await;
            let result = serde_json::to_value(&value)
                .map_err(|e| LoadError::encode(&this.inner.name, e));
            this.complete(generation, value, result.as_ref().ok().cloned());
            let _ = sender.send(result);
        });
        op
    }

    fn hydrate(&self, generation: u64, value: Value) -> PendingOp {
        let result = match self.decode(value.clone()) {
            Ok(decoded) => {
                tracing::debug!(name = %self.inner.name, "hydrating from data marker");
                self.inner.record.write().hydrated = true;
                self.complete(generation, decoded, Some(value.clone()));
                Ok(value)
            }
            Err(error) => {
                tracing::warn!(name = %self.inner.name, %error, "unreadable data marker");
                Err(error)
            }
        };
        let op = future::ready(result).boxed().shared();
        let mut record = self.inner.record.write();
        if record.generation == generation && !record.initialized {
            record.in_flight = Some(op.clone());
        }
        op
    }

    /// Adopt the outcome of the operation in flight should it have
    /// settled, which covers a load joined from another loader.
    pub(crate) fn poll_in_flight(&self) -> Option<Result<(), LoadError>> {
        let (generation, settled) = {
            let record = self.inner.record.read();
            let op = record.in_flight.as_ref()?;
            (record.generation, op.peek()?.clone())
        };
        match settled.and_then(|value| Ok((self.decode(value.clone())?, value))) {
            Ok((decoded, value)) => {
                self.complete(generation, decoded, Some(value));
                Some(Ok(()))
            }
            Err(error) => Some(Err(error)),
        }
    }

    // Settle this loader with `value`, mirroring `encoded` into the cache.
    fn complete(&self, generation: u64, value: T, encoded: Option<Value>) {
        let inner = &self.inner;
        {
            let mut record = inner.record.write();
            if record.generation != generation {
                tracing::trace!(name = %inner.name, "discarding superseded load");
                return;
            }
            if record.initialized {
                return;
            }
            record.value = Some(value.clone());
            record.initialized = true;
            record.in_flight = None;
        }
        match encoded {
            Some(encoded) => inner.scope.context().settle(&inner.name, encoded),
            None => {
                inner.scope.context().pending().remove(&inner.name);
            }
        }
        tracing::debug!(name = %inner.name, "load settled");
        if let Some(on_complete) = &inner.on_complete {
            on_complete(&value);
        }
    }

    /// Drop the value and load again on the next render, with `argument`
    /// if given, otherwise with the default argument.
    pub fn reload(&self, argument: Option<V>) {
        let inner = &self.inner;
        {
            let mut record = inner.record.write();
            record.value = None;
            record.initialized = false;
            record.hydrated = false;
            record.argument = argument;
            record.in_flight = None;
            record.generation += 1;
        }
        inner.scope.context().invalidate(&inner.name);
        inner.adapter.lock().hide();
        tracing::debug!(name = %inner.name, "reload requested");
        self.request_render();
    }
}

impl<T, V> fmt::Debug for Loader<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.inner.record.read();
        f.debug_struct("Loader")
            .field("name", &self.inner.name)
            .field("mode", &self.inner.mode)
            .field("side", &self.inner.scope.side())
            .field("initialized", &record.initialized)
            .field("hydrated", &record.hydrated)
            .field("generation", &record.generation)
            .finish()
    }
}
