use crate::{
    marker::MarkerSet,
    scope::LoadScope,
    store::{Snapshot, TreeContext},
};

/// Carries what the [`Collector`](crate::collector::Collector) gathered
/// into the render that produces the final output, and on the client,
/// what the server delivered into the bootstrap.
///
/// One bridge is created per incoming request on the server, and once at
/// startup on the client.  It is only ever added to.
#[derive(Clone, Debug)]
pub struct ContextBridge {
    scope: LoadScope,
}

impl ContextBridge {
    pub fn server() -> Self {
        Self {
            scope: LoadScope::server(TreeContext::new()),
        }
    }

    /// A client bridge able to hydrate from the `markers` found in the
    /// delivered document.
    pub fn client(markers: MarkerSet) -> Self {
        Self {
            scope: LoadScope::client(TreeContext::new(), markers),
        }
    }

    /// Merge `context` into the bridge, or do nothing without one.
    ///
    /// Everything cached after the merge counts as known before the
    /// upcoming render, so no data marker is emitted for it.
    pub fn set_tree_context(&self, context: Option<&TreeContext>) {
        let Some(context) = context else {
            return;
        };
        self.scope.context().merge(context);
        self.scope.snapshot_source();
        tracing::debug!(
            cached = self.scope.context().cache().len(),
            pending = self.scope.context().pending().len(),
            side = ?self.scope.side(),
            "tree context merged",
        );
    }

    /// Merge a snapshot delivered by the server.
    pub fn hydrate(&self, snapshot: Snapshot) {
        self.set_tree_context(Some(&TreeContext::from_snapshot(snapshot)));
    }

    pub fn scope(&self) -> &LoadScope {
        &self.scope
    }

    pub fn context(&self) -> &TreeContext {
        self.scope.context()
    }

    /// Provide the bridged scope to the current reactive owner.
    pub fn provide(&self) {
        self.scope.provide();
    }
}
