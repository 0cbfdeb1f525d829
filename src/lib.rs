//! This crate provides helpers to load named data exactly once for a view
//! tree that may be rendered in three different ways: only on the client
//! (CSR), fully on the server before being sent out (SSR), or on the
//! server as an incrementally flushed stream.  The same [`Loader`] serves
//! all three, such that a value loaded on the server is cached, carried
//! over to the client, and picked up there without being loaded again.
//!
//! ## Use case
//!
//! A view that needs data not available up front would typically suspend
//! until that data arrives, leaving its nearest suspense boundary showing
//! a fallback in the meantime.  Under CSR this is all there is to it, but
//! once the server gets involved, a number of complications follow:
//!
//! - the server must know which loads the tree triggers, including those
//!   nested under views that only appear once an outer load resolved, so
//!   that it can wait on them before rendering the final output;
//! - two views asking for the same data during one render must share a
//!   single load rather than each starting their own;
//! - whatever the server loaded must reach the client, otherwise the
//!   client loads it all over again and hydrates against different markup.
//!
//! The [`Collector`] addresses the first by rendering the tree repeatedly
//! under a fresh [`TreeContext`] until no new loads show up (or a timeout
//! elapses), the pending-load table of that context addresses the second,
//! and the [`ContextBridge`] together with [data markers](marker) address
//! the last.
//!
//! # Example
//!
//! ```
//! use leptos::prelude::*;
//! use leptos_load_ssr::{expect_dispatch, expect_value, Loader, Mode};
//!
//! #[component]
//! fn Item(id: u32) -> impl IntoView {
//!     // a nested loader, only discovered once "list" resolved
//!     let item = Loader::new(format!("item/{id}"), move |_: ()| async move {
//!         format!("Item {id}")
//!     });
//!     item.view(|| "Loading item...", || view! { <li>{expect_value::<String>()}</li> })
//! }
//!
//! #[component]
//! fn App() -> impl IntoView {
//!     let list = Loader::builder("list", |_: ()| async { vec![1u32, 2, 3] })
//!         .mode(Mode::Ssr)
//!         .build();
//!     list.view(|| "Loading list...", || {
//!         let items = expect_value::<Vec<u32>>();
//!         view! {
//!             <ul>{items.into_iter().map(|id| view! { <Item id=id /> }).collect_view()}</ul>
//!         }
//!     })
//! }
//!
//! // anywhere below "list", `expect_dispatch::<()>().reload()` loads it again.
//! # let _ = expect_dispatch::<()>;
//! ```
//!
//! On the server, the view is first handed to the [`Collector`], and the
//! context it gathered is then merged into the [`ContextBridge`] for the
//! request before the final render; refer to the [`collector`] module for
//! the complete sequence.
//!
//! # Feature Flags
#![cfg_attr(
    feature = "document-features",
    cfg_attr(doc, doc = ::document_features::document_features!())
)]

pub mod bridge;
pub mod collector;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod marker;
pub mod scope;
pub mod store;
mod suspense;

#[cfg(test)]
mod tests;

pub use bridge::ContextBridge;
pub use collector::{CollectReport, Collector};
pub use config::{CollectorConfig, Mode};
pub use context::{expect_dispatch, expect_value, use_dispatch, use_value};
pub use coordinator::{Dispatch, DispatchSlot, Loader, LoaderBuilder};
pub use error::{ContextError, LoadError};
pub use marker::{DataMarker, MarkerSet};
pub use scope::{LoadScope, Side};
pub use store::{Snapshot, TreeContext};
