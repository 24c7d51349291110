//! Integration tests for render scheduling
//!
//! Covers coalescing, no-op elision, failure propagation, timeouts and
//! destruction against the in-memory host.

use livemsg::runtime::error::{HostError, RenderError, TranslateError};
use livemsg::runtime::host::SendOptions;
use livemsg::runtime::message::Embed;
use livemsg::runtime::{HostNode, InstanceState, MemoryHost};
use livemsg::{Runtime, RuntimeConfig};
use std::time::Duration;

fn text(value: &str) -> Vec<HostNode> {
    vec![HostNode::text(value)]
}

fn setup() -> (MemoryHost, Runtime) {
    let host = MemoryHost::new();
    let runtime = Runtime::new(RuntimeConfig::default(), host.clone()).unwrap();
    (host, runtime)
}

#[tokio::test]
async fn test_initial_send_and_render() {
    let (host, runtime) = setup();
    let instance = runtime.send(text("hello"), SendOptions::default()).await.unwrap();

    assert_eq!(instance.state(), InstanceState::Active);
    assert_eq!(host.message(instance.message_id()).unwrap().content, "hello");

    instance.render(text("world")).await.unwrap();
    assert_eq!(host.message(instance.message_id()).unwrap().content, "world");
    assert_eq!(host.edit_count(instance.message_id()), 1);
}

#[tokio::test]
async fn test_overlapping_renders_settle_on_last() {
    let (host, runtime) = setup();
    let instance = runtime.send(text("start"), SendOptions::default()).await.unwrap();

    let first = instance.request_render(text("x")).unwrap();
    let second = instance.request_render(text("y")).unwrap();
    instance.await_settled().await;

    let message = host.message(instance.message_id()).unwrap();
    assert_eq!(message.content, "y");
    assert!(!message.content.contains('x'));
    assert!(host.edit_count(instance.message_id()) <= 2);
    assert_eq!(first.await, Ok(()));
    assert_eq!(second.await, Ok(()));
}

#[tokio::test]
async fn test_burst_collapses_to_two_edits() {
    let (host, runtime) = setup();
    let instance = runtime.send(text("0"), SendOptions::default()).await.unwrap();

    let pending: Vec<_> = (1..=10)
        .map(|i| instance.request_render(text(&i.to_string())).unwrap())
        .collect();
    instance.await_settled().await;

    assert_eq!(host.message(instance.message_id()).unwrap().content, "10");
    assert_eq!(host.edit_count(instance.message_id()), 2);
    for render in pending {
        assert_eq!(render.await, Ok(()));
    }
    assert!(instance.is_settled());
}

#[tokio::test]
async fn test_unchanged_render_issues_no_edit() {
    let (host, runtime) = setup();
    let instance = runtime.send(text("same"), SendOptions::default()).await.unwrap();

    instance.render(text("same")).await.unwrap();
    instance.render(vec![HostNode::text("sa"), HostNode::text("me")]).await.unwrap();

    assert_eq!(host.edit_count(instance.message_id()), 0);
}

#[tokio::test]
async fn test_rendering_nothing_clears_previous_content() {
    let (host, runtime) = setup();
    let snapshot = vec![
        HostNode::text("A"),
        HostNode::Embed(Embed::titled("A embed")),
        HostNode::button("a", "A"),
    ];
    let instance = runtime.send(snapshot, SendOptions::default()).await.unwrap();

    instance.render(Vec::new()).await.unwrap();

    let message = host.message(instance.message_id()).unwrap();
    assert!(message.is_empty());
    assert!(!message.content.contains('A'));
}

#[tokio::test]
async fn test_translation_error_leaves_committed_state() {
    let (host, runtime) = setup();
    let instance = runtime.send(text("kept"), SendOptions::default()).await.unwrap();

    let duplicate = vec![HostNode::button("dup", "1"), HostNode::button("dup", "2")];
    let err = instance.request_render(duplicate).err().unwrap();
    assert_eq!(
        err,
        RenderError::Translate(TranslateError::DuplicateIdentifier("dup".to_string()))
    );

    assert_eq!(host.message(instance.message_id()).unwrap().content, "kept");
    assert_eq!(
        instance.committed_message().unwrap().content,
        "kept".to_string()
    );
    assert!(instance.is_settled());
}

#[tokio::test]
async fn test_failed_edit_reaches_caller_and_does_not_block() {
    let (host, runtime) = setup();
    let instance = runtime.send(text("a"), SendOptions::default()).await.unwrap();

    host.fail_next_edits(1);
    let err = instance.render(text("b")).await.unwrap_err();
    assert!(matches!(
        err,
        RenderError::HostOperationFailed(HostError::OperationFailed { .. })
    ));
    assert_eq!(host.message(instance.message_id()).unwrap().content, "a");

    instance.render(text("c")).await.unwrap();
    assert_eq!(host.message(instance.message_id()).unwrap().content, "c");
}

#[tokio::test]
async fn test_failed_in_flight_edit_still_commits_coalesced_render() {
    let (host, runtime) = setup();
    let instance = runtime.send(text("a"), SendOptions::default()).await.unwrap();

    host.fail_next_edits(1);
    let doomed = instance.request_render(text("b")).unwrap();
    let follow_up = instance.request_render(text("c")).unwrap();

    assert!(doomed.await.is_err());
    assert_eq!(follow_up.await, Ok(()));
    assert_eq!(host.message(instance.message_id()).unwrap().content, "c");
}

#[tokio::test]
async fn test_destroy_deletes_once_and_rejects_renders() {
    let (host, runtime) = setup();
    let instance = runtime.send(text("bye"), SendOptions::default()).await.unwrap();
    let id = instance.message_id().clone();

    instance.destroy().await.unwrap();
    instance.destroy().await.unwrap();

    assert_eq!(instance.state(), InstanceState::Destroyed);
    assert_eq!(host.delete_count(&id), 1);
    assert!(host.message(&id).is_none());
    assert!(runtime.active_instances().is_empty());
    assert!(instance.current_snapshot().is_empty());

    let err = instance.request_render(text("again")).err().unwrap();
    assert!(matches!(err, RenderError::InstanceDestroyed(_)));
}

#[tokio::test]
async fn test_destroy_fails_pending_render() {
    let (host, runtime) = setup();
    let instance = runtime.send(text("a"), SendOptions::default()).await.unwrap();

    let in_flight = instance.request_render(text("b")).unwrap();
    let pending = instance.request_render(text("c")).unwrap();
    let destroyed = instance.destroy();

    assert_eq!(in_flight.await, Ok(()));
    assert!(matches!(pending.await, Err(RenderError::InstanceDestroyed(_))));
    assert_eq!(destroyed.await, Ok(()));

    assert_eq!(host.edit_count(instance.message_id()), 1);
    assert_eq!(host.delete_count(instance.message_id()), 1);
}

#[tokio::test]
async fn test_pending_snapshot_visible_while_in_flight() {
    let (_host, runtime) = setup();
    let instance = runtime.send(text("a"), SendOptions::default()).await.unwrap();

    let _first = instance.request_render(text("b")).unwrap();
    let _second = instance.request_render(text("c")).unwrap();
    let pending = instance.pending_snapshot().unwrap();
    assert!(matches!(&pending[0], HostNode::Text(value) if value == "c"));

    instance.await_settled().await;
    assert!(instance.pending_snapshot().is_none());
    assert!(matches!(&instance.current_snapshot()[0], HostNode::Text(value) if value == "c"));
}

#[tokio::test]
async fn test_edit_timeout_reaches_caller_and_coalesced_render_still_commits() {
    let host = MemoryHost::new();
    let config = RuntimeConfig {
        host_timeout_ms: Some(20),
        ..RuntimeConfig::default()
    };
    let runtime = Runtime::new(config, host.clone()).unwrap();
    let instance = runtime.send(text("a"), SendOptions::default()).await.unwrap();

    host.delay_next_edits(1, Duration::from_secs(5));
    let slow = instance.request_render(text("b")).unwrap();
    let follow_up = instance.request_render(text("c")).unwrap();

    assert_eq!(
        slow.await,
        Err(RenderError::HostOperationFailed(HostError::Timeout {
            operation: "edit"
        }))
    );
    assert_eq!(follow_up.await, Ok(()));
    assert_eq!(host.message(instance.message_id()).unwrap().content, "c");
    assert_eq!(host.edit_count(instance.message_id()), 1);
    assert_eq!(instance.committed_message().unwrap().content, "c");
}

#[tokio::test]
async fn test_deactivate_fails_pending_render() {
    let (host, runtime) = setup();
    let instance = runtime.send(text("a"), SendOptions::default()).await.unwrap();

    let in_flight = instance.request_render(text("b")).unwrap();
    let pending = instance.request_render(text("c")).unwrap();
    let deactivated = instance.deactivate();

    assert_eq!(in_flight.await, Ok(()));
    assert!(matches!(
        pending.await,
        Err(RenderError::InstanceDeactivated(_))
    ));
    assert_eq!(deactivated.await, Ok(()));

    let id = instance.message_id();
    assert_eq!(host.message(id).unwrap().content, "b");
    assert_eq!(host.edit_count(id), 1);
    assert_eq!(host.disable_count(id), 1);
}

#[tokio::test]
async fn test_destroy_retries_after_failed_delete() {
    let (host, runtime) = setup();
    let instance = runtime.send(text("bye"), SendOptions::default()).await.unwrap();
    let id = instance.message_id().clone();
    host.fail_next_deletes(1);

    assert!(matches!(
        instance.destroy().await,
        Err(RenderError::HostOperationFailed(_))
    ));
    assert_eq!(instance.state(), InstanceState::Destroyed);
    assert!(host.message(&id).is_some(), "failed delete leaves the message");

    instance.destroy().await.unwrap();
    assert!(host.message(&id).is_none());

    instance.destroy().await.unwrap();
    assert_eq!(host.delete_count(&id), 1);
}
