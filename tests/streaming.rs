use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use leptos::prelude::*;
use leptos_load_ssr::{expect_value, Loader, Mode};

#[cfg(feature = "ssr")]
mod ssr {
    use leptos::prelude::{IntoView, Owner, RenderHtml};

    pub use futures::StreamExt;
    pub use leptos_load_ssr::{
        marker::marker_id, Collector, ContextBridge, DataMarker, MarkerSet, Snapshot,
    };

    pub fn init_renderer() -> Owner {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        let _ = any_spawner::Executor::init_tokio();
        let owner = Owner::new();
        owner.set();
        owner
    }

    pub async fn render(view: impl IntoView) -> String {
        view.to_html_stream_in_order()
            .collect::<String>()
            .await
            .replace("<!>", "")
    }
}
#[cfg(feature = "ssr")]
use ssr::*;

fn feed_loader(calls: Arc<AtomicUsize>) -> Loader<String> {
    Loader::builder("feed", move |_: ()| {
        calls.fetch_add(1, Ordering::SeqCst);
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            "Feed".to_string()
        }
    })
    .mode(Mode::Streaming)
    .build()
}

// A shell resolved before anything is sent, followed by a feed that is
// revealed as the output streams.
fn app(calls: Arc<AtomicUsize>) -> impl IntoView {
    let shell = Loader::builder("shell", {
        let calls = calls.clone();
        move |_: ()| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                "Shell".to_string()
            }
        }
    })
    .mode(Mode::Ssr)
    .build();
    let feed = feed_loader(calls);

    view! {
        {shell.view(|| "loading shell", || view! { <h1>{expect_value::<String>()}</h1> })}
        {feed.view(|| "loading feed", || view! { <p>{expect_value::<String>()}</p> })}
    }
}

// Two views of the same streamed name side by side.
fn twin_feeds(calls: Arc<AtomicUsize>) -> impl IntoView {
    let first = feed_loader(calls.clone());
    let second = feed_loader(calls);
    view! {
        {first.view(|| "loading", || view! { <p>{expect_value::<String>()}</p> })}
        {second.view(|| "loading", || view! { <p>{expect_value::<String>()}</p> })}
    }
}

#[cfg(feature = "ssr")]
#[tokio::test]
async fn stream_then_hydrate() -> anyhow::Result<()> {
    let _server = init_renderer();
    let server_calls = Arc::new(AtomicUsize::new(0));

    let report = Collector::default()
        .streaming(true)
        .run(|| app(server_calls.clone()))
        .await
        .ok_or_else(|| anyhow::anyhow!("collector unavailable under ssr"))?;
    assert_eq!(report.passes, 2);
    assert!(report.context.cache().contains("shell"));
    assert!(report
        .context
        .pending()
        .get("feed")
        .is_some_and(|entry| entry.streamed));
    // what the bootstrap carries is taken before the feed resolves
    let bootstrap = report.context.snapshot().to_json()?;

    let bridge = ContextBridge::server();
    bridge.set_tree_context(Some(&report.context));
    bridge.provide();
    let html = render(app(server_calls.clone())).await;
    let marker = DataMarker::new("feed", serde_json::json!("Feed")).to_html();
    assert!(html.starts_with("<h1>Shell</h1>"));
    assert!(html.ends_with(&format!("{marker}<p>Feed</p>")));
    assert!(!html.contains(&marker_id("shell")));
    assert_eq!(server_calls.load(Ordering::SeqCst), 2);

    let client = Owner::new();
    client.set();
    let client_calls = Arc::new(AtomicUsize::new(0));
    let bridge = ContextBridge::client(MarkerSet::from_html(&html));
    bridge.hydrate(Snapshot::from_json(&bootstrap)?);
    bridge.provide();

    // the first paint reproduces the server output, marker included
    assert_eq!(render(app(client_calls.clone())).await, html);
    assert_eq!(client_calls.load(Ordering::SeqCst), 0);
    assert!(bridge.scope().markers().is_empty());
    assert_eq!(
        bridge.context().cache().get("feed"),
        Some(serde_json::json!("Feed")),
    );
    Ok(())
}

#[cfg(feature = "ssr")]
#[tokio::test]
async fn value_known_before_render_has_no_marker() -> anyhow::Result<()> {
    let _server = init_renderer();
    let calls = Arc::new(AtomicUsize::new(0));

    // without streaming, the collector waits on the feed as well
    let context = Collector::default()
        .collect(|| app(calls.clone()))
        .await
        .ok_or_else(|| anyhow::anyhow!("collector unavailable under ssr"))?;
    assert!(context.pending().is_empty());

    let bridge = ContextBridge::server();
    bridge.set_tree_context(Some(&context));
    bridge.provide();
    assert_eq!(
        render(app(calls.clone())).await,
        "<h1>Shell</h1><p>Feed</p>",
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[cfg(feature = "ssr")]
#[tokio::test]
async fn one_marker_per_name() -> anyhow::Result<()> {
    let _server = init_renderer();
    let server_calls = Arc::new(AtomicUsize::new(0));
    ContextBridge::server().provide();

    let html = render(twin_feeds(server_calls.clone())).await;
    assert_eq!(html.matches(&marker_id("feed")).count(), 1);
    assert_eq!(server_calls.load(Ordering::SeqCst), 1);

    let client = Owner::new();
    client.set();
    let client_calls = Arc::new(AtomicUsize::new(0));
    ContextBridge::client(MarkerSet::from_html(&html)).provide();

    // the second view takes the value the first one hydrated
    assert_eq!(render(twin_feeds(client_calls.clone())).await, html);
    assert_eq!(client_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[cfg(feature = "ssr")]
#[tokio::test]
async fn same_name_reached_after_settling() -> anyhow::Result<()> {
    let _server = init_renderer();
    ContextBridge::server().provide();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = {
        let calls = calls.clone();
        move |_: ()| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                "once".to_string()
            }
        }
    };
    let outer = Loader::builder("shared", fetch.clone())
        .mode(Mode::Streaming)
        .build();
    // built before anything loaded, only reached once `outer` settled and
    // its pending entry is gone
    let inner = Loader::builder("shared", fetch)
        .mode(Mode::Streaming)
        .build();

    let view = outer.view(
        || "outer loading",
        move || {
            view! {
                <p>{expect_value::<String>()}</p>
                {inner.view(|| "inner loading", || view! { <p>{expect_value::<String>()}</p> })}
            }
        },
    );
    let html = render(view).await;
    assert!(html.ends_with("<p>once</p><p>once</p>"));
    assert_eq!(html.matches(&marker_id("shared")).count(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[cfg(feature = "ssr")]
#[tokio::test]
async fn client_loads_without_marker() -> anyhow::Result<()> {
    let _owner = init_renderer();
    let calls = Arc::new(AtomicUsize::new(0));
    ContextBridge::client(MarkerSet::new()).provide();

    assert_eq!(render(app(calls.clone())).await, "<h1>Shell</h1><p>Feed</p>");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}
