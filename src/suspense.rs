//! Bridges a [`Loader`] to the `<Suspense/>` boundary of its view.
//!
//! The content of the boundary is a [`Suspend`] that either awaits the
//! load, leaving the fallback in place until it settles, or renders the
//! children with the value and reload trigger provided as context.  The
//! content tracks the [refresh](Loader::refresh) signal of the loader, so
//! a reload renders it again.
//!
//! Two transient phases sit in front of that:
//!
//! - a loader in [`Mode::Csr`] renders its fallback for exactly one pass
//!   after being mounted, whatever data may be available, so that what
//!   the client paints first matches what the server rendered;
//! - after a reload, the loader renders nothing for one pass, such that
//!   its children are mounted from scratch rather than carried over.
//!
//! On the server, a loader in [`Mode::Ssr`] whose value is still missing
//! renders its fallback rather than holding up the output, as the
//! collector already waited on it as long as it was allowed to.
//!
//! The first time the value is rendered, a [data marker](crate::marker)
//! is emitted in front of the children when streaming, unless the value
//! was already known before the render began or another loader of the
//! same name emitted one.  On the client this only happens when hydrating
//! from a marker, to reproduce the server markup.

use any_spawner::Executor;
use leptos::{prelude::*, tachys::reactive_graph::OwnedView};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::Mode, context::provide_loaded, coordinator::Loader, error::LoadError,
    marker::DataMarker, scope::Side,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    FallbackForced,
    Hidden,
    Visible,
}

#[derive(Debug)]
enum MarkerLatch {
    Armed,
    // every render of the generation that claimed the marker repeats it
    Emitting { generation: u64, marker: DataMarker },
    Spent,
}

#[derive(Debug)]
pub(crate) struct AdapterState {
    phase: Phase,
    marker: MarkerLatch,
}

impl AdapterState {
    pub(crate) fn new(mode: Mode) -> Self {
        Self {
            phase: match mode {
                Mode::Csr => Phase::FallbackForced,
                Mode::Streaming | Mode::Ssr => Phase::Visible,
            },
            marker: MarkerLatch::Armed,
        }
    }

    pub(crate) fn hide(&mut self) {
        self.phase = Phase::Hidden;
    }

    // Leave any transient phase, returning the one left.
    pub(crate) fn advance(&mut self) -> Phase {
        std::mem::replace(&mut self.phase, Phase::Visible)
    }
}

impl<T, V> Loader<T, V>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// The view of this loader: `children` rendered with the loaded value
    /// within reach of [`use_value`](crate::use_value), or `fallback`
    /// while the value is not ready.
    ///
    /// Unless running client-only, the load is started right away rather
    /// than once the boundary renders, such that a walk over the tree
    /// discovers it.
    pub fn view<F, FV, C, CV>(&self, fallback: F, children: C) -> impl IntoView
    where
        F: Fn() -> FV + Clone + Send + Sync + 'static,
        FV: IntoView + 'static,
        C: Fn() -> CV + Clone + Send + Sync + 'static,
        CV: IntoView + 'static,
    {
        if self.mode() != Mode::Csr && !self.is_initialized() {
            let _ = self.load();
        }

        let this = self.clone();
        let refresh = self.refresh();
        let boundary_fallback = fallback.clone();
        let content = move || {
            refresh.track();
            let phase = this.adapter_state().lock().advance();
            let this = this.clone();
            let fallback = fallback.clone();
            let children = children.clone();
            Suspend::new(async move {
                match phase {
                    Phase::FallbackForced => {
                        this.render_again();
                        return fallback().into_any();
                    }
                    Phase::Hidden => {
                        this.render_again();
                        return ().into_any();
                    }
                    Phase::Visible => {}
                }
                match this.attempt().await {
                    Ok(Some(value)) => this.render_loaded(value, children),
                    Ok(None) => fallback().into_any(),
                    Err(error) => {
                        tracing::warn!(name = %this.name(), %error, "load failed");
                        fallback().into_any()
                    }
                }
            })
        };

        view! { <Suspense fallback=move || boundary_fallback()>{content}</Suspense> }
    }

    // The value to render, or `None` where the fallback stays in place.
    pub(crate) async fn attempt(&self) -> Result<Option<T>, LoadError> {
        let on_server = self.scope().is_server();
        if self.mode() == Mode::Csr && on_server {
            return Ok(None);
        }
        loop {
            if let Some(value) = self.value() {
                return Ok(Some(value));
            }
            let op = self.load();
            if let Some(Err(error)) = self.poll_in_flight() {
                return Err(error);
            }
            if self.is_initialized() {
                continue;
            }
            if self.mode() == Mode::Ssr && on_server {
                return Ok(None);
            }
            // the outcome is read back from the record, as a reload may
            // have superseded this operation in the meantime
            let _ = op.await;
            if let Some(Err(error)) = self.poll_in_flight() {
                return Err(error);
            }
        }
    }

    fn render_loaded<C, CV>(&self, value: T, children: C) -> AnyView
    where
        C: Fn() -> CV + Send + Sync + 'static,
        CV: IntoView + 'static,
    {
        let marker = self.take_marker(&value);
        let owner = Owner::new();
        let view = owner.with(|| {
            provide_loaded(value, self.dispatch());
            view! {
                {marker.map(DataMarker::view)}
                {children()}
            }
        });
        OwnedView::new_with_owner(view, owner).into_any()
    }

    // Leave the transient phase on the next tick.
    fn render_again(&self) {
        let this = self.clone();
        Executor::spawn(async move { this.request_render() });
    }

    // Decided once per loader on the first render with a value; renders
    // of the same generation repeat the decision.
    fn take_marker(&self, value: &T) -> Option<DataMarker> {
        let generation = self.generation();
        let mut state = self.adapter_state().lock();
        match &state.marker {
            MarkerLatch::Armed => {}
            MarkerLatch::Emitting {
                generation: claimed,
                marker,
            } => return (*claimed == generation).then(|| marker.clone()),
            MarkerLatch::Spent => return None,
        }
        let marker = self.due_marker(value);
        state.marker = match &marker {
            Some(marker) => MarkerLatch::Emitting {
                generation,
                marker: marker.clone(),
            },
            None => MarkerLatch::Spent,
        };
        marker
    }

    fn due_marker(&self, value: &T) -> Option<DataMarker> {
        if self.mode() != Mode::Streaming {
            return None;
        }
        let scope = self.scope();
        let due = match scope.side() {
            Side::Server => true,
            Side::Client => self.is_hydrated(),
        };
        if !due || scope.was_cached_before(self.name()) || !scope.claim_marker(self.name()) {
            return None;
        }
        match serde_json::to_value(value) {
            Ok(value) => Some(DataMarker::new(self.name(), value)),
            Err(error) => {
                tracing::warn!(name = %self.name(), %error, "cannot embed data marker");
                None
            }
        }
    }
}
