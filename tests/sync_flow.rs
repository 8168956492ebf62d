use firebase_rtdb_sync::core::{
    AckStatus, Operation, OperationSource, OverwriteVisibility, Tree, WriteTree,
};
use firebase_rtdb_sync::path::Path;
use firebase_rtdb_sync::query::{QueryLimit, QueryParams};
use firebase_rtdb_sync::view::{
    variant_filter_from_query_params, CacheNode, EventType, IndexedVariant, ViewCache,
    ViewProcessor,
};
use firebase_rtdb_sync::CompoundWrite;
use serde_json::{json, Value};

fn empty_view() -> ViewCache {
    ViewCache::new(
        CacheNode::new(IndexedVariant::new(Value::Null), false, false),
        CacheNode::new(IndexedVariant::new(Value::Null), false, false),
    )
}

fn complete_view(local: Value, server: Value) -> ViewCache {
    ViewCache::new(
        CacheNode::new(IndexedVariant::new(local), true, false),
        CacheNode::new(IndexedVariant::new(server), true, false),
    )
}

#[test]
fn optimistic_write_then_server_confirmation() {
    let processor = ViewProcessor::new(variant_filter_from_query_params(&QueryParams::default()));
    let mut writes = WriteTree::new();

    // An initialized but empty view, as after an empty initial load.
    let view = complete_view(Value::Null, Value::Null);

    // The user sets a value locally.
    writes.add_overwrite(
        Path::new("messages/m1"),
        json!({"text": "hello"}),
        1,
        OverwriteVisibility::Visible,
    );
    let user_op = Operation::overwrite(
        OperationSource::user(),
        Path::new("messages/m1"),
        json!({"text": "hello"}),
    );
    let writes_ref = writes.child_writes(Path::root());
    let (cache, changes) = processor.apply_operation(&view, &user_op, &writes_ref, None);

    assert_eq!(
        cache.local_snap().variant(),
        &json!({"messages": {"m1": {"text": "hello"}}})
    );
    assert!(changes.iter().any(|c| c.event_type == EventType::ChildAdded));
    assert!(changes.iter().any(|c| c.event_type == EventType::Value));

    // The server confirms with the full state; the event cache already shows
    // it, so nothing fires.
    let server_op = Operation::overwrite(
        OperationSource::server(),
        Path::root(),
        json!({"messages": {"m1": {"text": "hello"}}}),
    );
    let (cache, changes) = processor.apply_operation(&cache, &server_op, &writes_ref, None);
    assert!(cache.local_snap().fully_initialized());
    assert!(changes.is_empty());

    // Acknowledge the write: the ledger entry is retired and the view settles
    // on the identical server state with no further events.
    assert!(writes.remove_write(1));
    let mut affected = Tree::new();
    affected.set_value(true);
    let ack = Operation::ack_user_write(Path::new("messages/m1"), affected, AckStatus::Confirm);
    let writes_ref = writes.child_writes(Path::root());
    let (cache, changes) = processor.apply_operation(&cache, &ack, &writes_ref, None);

    assert_eq!(
        cache.local_snap().variant(),
        &json!({"messages": {"m1": {"text": "hello"}}})
    );
    assert!(changes.is_empty());
}

#[test]
fn rejected_write_is_reverted_to_server_state() {
    let processor = ViewProcessor::new(variant_filter_from_query_params(&QueryParams::default()));
    let mut writes = WriteTree::new();

    let server_state = json!({"score": 10});
    let view = complete_view(server_state.clone(), server_state.clone());

    // Optimistically bump the score.
    writes.add_overwrite(
        Path::new("score"),
        json!(11),
        1,
        OverwriteVisibility::Visible,
    );
    let user_op = Operation::overwrite(OperationSource::user(), Path::new("score"), json!(11));
    let writes_ref = writes.child_writes(Path::root());
    let (cache, _) = processor.apply_operation(&view, &user_op, &writes_ref, None);
    assert_eq!(cache.local_snap().variant(), &json!({"score": 11}));

    // The server rejects it: the write leaves the ledger and a revert
    // operation rolls the event cache back.
    assert!(writes.remove_write(1));
    let mut affected = Tree::new();
    affected.set_value(true);
    let revert = Operation::ack_user_write(Path::new("score"), affected, AckStatus::Revert);
    let writes_ref = writes.child_writes(Path::root());
    let (cache, changes) = processor.apply_operation(&cache, &revert, &writes_ref, None);

    assert_eq!(cache.local_snap().variant(), &json!({"score": 10}));
    assert!(changes.iter().any(|c| c.event_type == EventType::Value));
}

#[test]
fn pending_merge_layers_over_later_server_data() {
    let processor = ViewProcessor::new(variant_filter_from_query_params(&QueryParams::default()));
    let mut writes = WriteTree::new();

    // A local update touches two children.
    let merge = CompoundWrite::from_child_merge([
        ("name", json!("updated")),
        ("tags/a", json!(true)),
    ]);
    writes.add_merge(Path::new("item"), merge.clone(), 1);
    let user_op = Operation::merge(OperationSource::user(), Path::new("item"), merge);
    let writes_ref = writes.child_writes(Path::root());
    let (cache, _) = processor.apply_operation(&empty_view(), &user_op, &writes_ref, None);

    // Server data arrives afterwards; pending merge entries win, everything
    // else comes from the server.
    let server_op = Operation::overwrite(
        OperationSource::server(),
        Path::root(),
        json!({"item": {"name": "stale", "size": 3}}),
    );
    let (cache, _) = processor.apply_operation(&cache, &server_op, &writes_ref, None);

    assert_eq!(
        cache.local_snap().variant(),
        &json!({"item": {"name": "updated", "size": 3, "tags": {"a": true}}})
    );
    assert_eq!(
        cache.server_snap().variant(),
        &json!({"item": {"name": "stale", "size": 3}})
    );
}

#[test]
fn limited_view_tracks_window_membership() {
    let mut params = QueryParams::default();
    params.set_limit(QueryLimit::First(2)).unwrap();
    let processor = ViewProcessor::new(variant_filter_from_query_params(&params));

    let writes = WriteTree::new();
    let writes_ref = writes.child_writes(Path::root());
    let view = ViewCache::new(
        CacheNode::new(IndexedVariant::with_params(Value::Null, params.clone()), false, false),
        CacheNode::new(IndexedVariant::with_params(Value::Null, params.clone()), false, false),
    );

    let server_op = Operation::overwrite(
        OperationSource::server(),
        Path::root(),
        json!({"a": 1, "b": 2, "c": 3, "d": 4}),
    );
    let (cache, changes) = processor.apply_operation(&view, &server_op, &writes_ref, None);

    // Only the first two children survive the window.
    assert_eq!(cache.local_snap().variant(), &json!({"a": 1, "b": 2}));
    assert!(cache.local_snap().filtered() || cache.server_snap().filtered());

    let added: Vec<&str> = changes
        .iter()
        .filter(|c| c.event_type == EventType::ChildAdded)
        .map(|c| c.child_key.as_str())
        .collect();
    assert_eq!(added, vec!["a", "b"]);
}

#[test]
fn purged_writes_stop_shadowing_server_data() {
    let processor = ViewProcessor::new(variant_filter_from_query_params(&QueryParams::default()));
    let mut writes = WriteTree::new();

    writes.add_overwrite(
        Path::new("config"),
        json!("local"),
        1,
        OverwriteVisibility::Visible,
    );
    assert_eq!(
        writes.shadowing_write(&Path::new("config")),
        Some(json!("local"))
    );

    let purged = writes.purge_all_writes();
    assert_eq!(purged.len(), 1);
    assert!(writes.shadowing_write(&Path::new("config")).is_none());

    // Server data now flows straight through.
    let view = complete_view(json!({"config": "local"}), json!({"config": "remote"}));
    let server_op = Operation::overwrite(
        OperationSource::server(),
        Path::new("config"),
        json!("remote"),
    );
    let writes_ref = writes.child_writes(Path::root());
    let (cache, _) = processor.apply_operation(&view, &server_op, &writes_ref, None);
    assert_eq!(cache.local_snap().variant(), &json!({"config": "remote"}));
}
