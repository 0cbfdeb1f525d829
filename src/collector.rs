//! Resolves every load a view tree triggers before the server produces
//! its final output.
//!
//! The collector walks the tree under a fresh [`TreeContext`], waits on
//! the loads the pass registered as pending, then walks it again to
//! discover loaders that only appear once their parents have resolved,
//! until a pass reveals no new names or the timeout elapses.  A pass
//! builds the in-order HTML stream of the tree without draining it, which
//! has every `<Suspense/>` boundary run through its content once.  The
//! resulting context is then handed to the final render through a
//! [`ContextBridge`](crate::bridge::ContextBridge):
//!
//! ```
//! # #[cfg(feature = "ssr")]
//! # async fn handler() {
//! use std::time::Duration;
//! use futures::StreamExt;
//! use leptos::prelude::*;
//! use leptos_load_ssr::{expect_value, Collector, ContextBridge, Loader};
//!
//! fn app() -> impl IntoView {
//!     let greeting = Loader::new("greeting", |_: ()| async { "Hello".to_string() });
//!     greeting.view(|| "loading...", || expect_value::<String>())
//! }
//!
//! let context = Collector::default()
//!     .with_timeout(Duration::from_millis(500))
//!     .collect(app)
//!     .await;
//! let bridge = ContextBridge::server();
//! bridge.set_tree_context(context.as_ref());
//! bridge.provide();
//! let html = app().to_html_stream_in_order().collect::<String>().await;
//! # }
//! ```
//!
//! Loads still pending when the timeout elapses are not cancelled; they
//! stay registered as pending, their boundaries render the fallback, and
//! they carry on settling into the context in the background.

use std::time::Duration;

use leptos::prelude::IntoView;

use crate::{config::CollectorConfig, store::TreeContext};

#[cfg(feature = "ssr")]
mod ssr {
    pub use std::collections::HashSet;

    pub use futures::future;
    pub use leptos::prelude::{Owner, RenderHtml};
    pub use tokio::time::{timeout_at, Instant};

    pub use crate::scope::LoadScope;
}

#[cfg(feature = "ssr")]
use ssr::*;

/// The outcome of [`Collector::run`].
#[derive(Clone, Debug)]
pub struct CollectReport {
    pub context: TreeContext,
    pub passes: usize,
    pub timed_out: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Collector {
    config: CollectorConfig,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(timeout);
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.config = self.config.streaming(streaming);
        self
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Collect the tree context for the view produced by `app`, or `None`
    /// outside of server-side rendering.
    pub async fn collect<F, IV>(&self, app: F) -> Option<TreeContext>
    where
        F: Fn() -> IV,
        IV: IntoView,
    {
        self.run(app).await.map(|report| report.context)
    }

    #[cfg(not(feature = "ssr"))]
    pub async fn run<F, IV>(&self, _app: F) -> Option<CollectReport>
    where
        F: Fn() -> IV,
        IV: IntoView,
    {
        None
    }

    /// Like [`collect`](Self::collect), also reporting how many passes
    /// were rendered and whether the timeout cut the wait short.
    #[cfg(feature = "ssr")]
    pub async fn run<F, IV>(&self, app: F) -> Option<CollectReport>
    where
        F: Fn() -> IV,
        IV: IntoView,
    {
        let context = TreeContext::new();
        let owner = Owner::current()
            .map(|owner| owner.child())
            .unwrap_or_else(Owner::new);
        let scope = LoadScope::server(context.clone());
        owner.with(|| scope.provide());

        let deadline = self.config.timeout().map(|timeout| Instant::now() + timeout);
        let mut known = HashSet::new();
        let mut passes = 0;
        let mut timed_out = false;

        loop {
            passes += 1;
            let pass = owner.child();
            pass.with(|| drop(app().to_html_stream_in_order()));
            drop(pass);

            let waiting = context.pending().operations(self.config.streaming);
            tracing::debug!(pass = passes, waiting = waiting.len(), "collector pass rendered");
            let settled = future::join_all(waiting.into_iter().map(|(_, op)| op));
            match deadline {
                Some(deadline) => {
                    if timeout_at(deadline, settled).await.is_err() {
                        tracing::warn!(
                            pass = passes,
                            pending = ?context.pending().names(),
                            "collector timed out",
                        );
                        timed_out = true;
                        break;
                    }
                }
                None => {
                    settled.await;
                }
            }

            let seen = context.known_names();
            if seen.is_subset(&known) {
                break;
            }
            known = seen;
        }

        tracing::debug!(
            passes,
            timed_out,
            cached = context.cache().len(),
            pending = context.pending().len(),
            "collector finished",
        );
        Some(CollectReport {
            context,
            passes,
            timed_out,
        })
    }
}
