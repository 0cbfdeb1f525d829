use futures::{future, FutureExt};
use serde_json::json;

use crate::store::{PendingEntry, PendingOp, Snapshot, TreeContext};

fn settled_op(value: serde_json::Value) -> PendingOp {
    future::ready(Ok(value)).boxed().shared()
}

#[test]
fn settle_retires_pending() {
    let context = TreeContext::new();
    context.pending().insert(
        "list",
        PendingEntry {
            operation: settled_op(json!([1, 2, 3])),
            streamed: false,
        },
    );
    assert!(context.pending().contains("list"));
    assert!(!context.cache().contains("list"));

    context.settle("list", json!([1, 2, 3]));
    assert!(!context.pending().contains("list"));
    assert_eq!(context.cache().get("list"), Some(json!([1, 2, 3])));
}

#[test]
fn operations_skip_streamed() {
    let context = TreeContext::new();
    context.pending().insert(
        "shell",
        PendingEntry {
            operation: settled_op(json!(1)),
            streamed: false,
        },
    );
    context.pending().insert(
        "feed",
        PendingEntry {
            operation: settled_op(json!(2)),
            streamed: true,
        },
    );
    assert_eq!(context.pending().operations(false).len(), 2);
    let waiting = context.pending().operations(true);
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].0, "shell");
}

#[test]
fn merge_is_additive() {
    let target = TreeContext::new();
    target.cache().insert("kept", json!("old"));
    target.pending().insert(
        "resolved_elsewhere",
        PendingEntry {
            operation: settled_op(json!(null)),
            streamed: false,
        },
    );

    let incoming = TreeContext::new();
    incoming.cache().insert("added", json!("new"));
    incoming.cache().insert("resolved_elsewhere", json!(42));
    incoming.pending().insert(
        "slow",
        PendingEntry {
            operation: future::pending().boxed().shared(),
            streamed: false,
        },
    );

    target.merge(&incoming);
    assert_eq!(target.cache().get("kept"), Some(json!("old")));
    assert_eq!(target.cache().get("added"), Some(json!("new")));
    assert_eq!(target.cache().get("resolved_elsewhere"), Some(json!(42)));
    assert!(!target.pending().contains("resolved_elsewhere"));
    assert!(target.pending().contains("slow"));

    // merging a context into itself changes nothing
    target.merge(&target.clone());
    assert_eq!(target.cache().len(), 3);
}

#[test]
fn snapshot_carries_only_the_cache() -> anyhow::Result<()> {
    let context = TreeContext::new();
    context.cache().insert("list", json!([1, 2]));
    context.pending().insert(
        "slow",
        PendingEntry {
            operation: future::pending().boxed().shared(),
            streamed: true,
        },
    );

    let json = context.snapshot().to_json()?;
    assert_eq!(json, r#"{"cache":{"list":[1,2]}}"#);

    let restored = TreeContext::from_snapshot(Snapshot::from_json(&json)?);
    assert_eq!(restored.cache().get("list"), Some(json!([1, 2])));
    assert!(restored.pending().is_empty());
    Ok(())
}

#[test]
fn known_names_cover_both_tables() {
    let context = TreeContext::new();
    context.cache().insert("a", json!(1));
    context.pending().insert(
        "b",
        PendingEntry {
            operation: future::pending().boxed().shared(),
            streamed: false,
        },
    );
    let names = context.known_names();
    assert_eq!(names.len(), 2);
    assert!(names.contains("a") && names.contains("b"));

    context.invalidate("a");
    context.invalidate("b");
    assert!(context.known_names().is_empty());
}
