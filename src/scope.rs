use std::{collections::HashSet, sync::Arc};

use leptos::prelude::{provide_context, use_context};
use parking_lot::{Mutex, RwLock};

use crate::{marker::MarkerSet, store::TreeContext};

/// Which end of the process boundary a render happens on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// The initiating side, which produces values and registers pending
    /// loads for the collector to discover.
    Server,
    /// The receiving side, which may hydrate values from data markers.
    Client,
}

/// The request scope loaders resolve against.
///
/// This is provided as a context at the root of the view tree, either by
/// the [`Collector`](crate::collector::Collector) for each of its passes,
/// or through a [`ContextBridge`](crate::bridge::ContextBridge) for the
/// final render and on the client.
#[derive(Clone, Debug)]
pub struct LoadScope {
    inner: Arc<LoadScopeInner>,
}

#[derive(Debug)]
struct LoadScopeInner {
    context: TreeContext,
    side: Side,
    markers: MarkerSet,
    // names already cached before the current render pass
    source: RwLock<HashSet<String>>,
    emitted: Mutex<HashSet<String>>,
}

impl LoadScope {
    fn new(context: TreeContext, side: Side, markers: MarkerSet) -> Self {
        Self {
            inner: Arc::new(LoadScopeInner {
                context,
                side,
                markers,
                source: RwLock::new(HashSet::new()),
                emitted: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn server(context: TreeContext) -> Self {
        Self::new(context, Side::Server, MarkerSet::new())
    }

    pub fn client(context: TreeContext, markers: MarkerSet) -> Self {
        Self::new(context, Side::Client, markers)
    }

    /// The scope provided to the current reactive owner.
    ///
    /// Without one an empty client scope is returned, which is only of
    /// use for isolated loaders as nothing else will share it.
    pub fn current() -> Self {
        use_context::<LoadScope>()
            .unwrap_or_else(|| Self::client(TreeContext::new(), MarkerSet::new()))
    }

    pub fn provide(&self) {
        provide_context(self.clone());
    }

    pub fn context(&self) -> &TreeContext {
        &self.inner.context
    }

    pub fn side(&self) -> Side {
        self.inner.side
    }

    pub fn is_server(&self) -> bool {
        self.inner.side == Side::Server
    }

    pub fn markers(&self) -> &MarkerSet {
        &self.inner.markers
    }

    /// Whether `name` was already cached when the source snapshot was
    /// last taken.
    pub fn was_cached_before(&self, name: &str) -> bool {
        self.inner.source.read().contains(name)
    }

    /// Reserve the data marker for `name`, returning whether no marker
    /// was emitted for it within this scope so far.
    pub fn claim_marker(&self, name: &str) -> bool {
        self.inner.emitted.lock().insert(name.to_string())
    }

    pub(crate) fn snapshot_source(&self) {
        *self.inner.source.write() = self.inner.context.cache().names();
    }
}
