//! Coordinator state machine tests over the in-memory backend
//!
//! The test itself plays the far end through raw `MemoryLink` endpoints so it
//! can close or write to the remote stream at exactly the right moment.

use bluchat_core::{AppEvent, AppEventReceiver, ChatError, ConnectionState, LinkErrorKind};
use bluchat_core::{ChannelConfig, LinkConfig, PeerIdentity, ServiceRecord};
use bluchat_link::{LinkBackend, MemoryHub};
use bluchat_runtime::{CoordinatorBuilder, RunningCoordinator};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Duration};

async fn next_event(events: &mut AppEventReceiver) -> AppEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn assert_quiet(events: &mut AppEventReceiver) {
    let extra = timeout(Duration::from_millis(50), events.recv()).await;
    assert!(extra.is_err(), "unexpected event: {extra:?}");
}

fn spawn_on(hub: &MemoryHub, address: &str, label: &str) -> (RunningCoordinator, AppEventReceiver) {
    let mut coordinator = CoordinatorBuilder::new(hub.device(address, label))
        .spawn()
        .expect("Failed to spawn coordinator");
    let events = coordinator
        .take_events()
        .expect("Failed to get app event receiver");
    (coordinator, events)
}

/// Connect the coordinator to a raw endpoint at "remote" and return the far end
async fn connect_to_raw_remote(
    hub: &MemoryHub,
    coordinator: &RunningCoordinator,
    events: &mut AppEventReceiver,
) -> bluchat_link::Transport {
    let service = ServiceRecord::default();
    let mut endpoint = hub
        .device("remote", "Remote")
        .bind(&service)
        .await
        .expect("Failed to bind remote endpoint");

    coordinator
        .handle()
        .connect(PeerIdentity::new("remote", "Remote"))
        .await
        .unwrap();
    assert!(matches!(next_event(events).await, AppEvent::Connecting { .. }));

    let remote = endpoint.accept().await.expect("Failed to accept");
    match next_event(events).await {
        AppEvent::Connected { peer } => assert_eq!(peer.label(), "Remote"),
        other => panic!("expected Connected, got {other:?}"),
    }
    remote
}

#[tokio::test]
async fn test_send_while_idle_is_rejected() {
    let hub = MemoryHub::new();
    let (coordinator, mut events) = spawn_on(&hub, "me", "Me");
    let handle = coordinator.handle();

    let result = handle.send("hello").await;
    assert!(matches!(result, Err(ChatError::NotConnected)));
    assert_eq!(handle.state().await.unwrap(), ConnectionState::Idle);
    assert_eq!(hub.stats().streams_opened, 0);
    assert_quiet(&mut events).await;

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_send_while_connecting_is_rejected() {
    let hub = MemoryHub::new();
    hub.stall("slow");
    let (coordinator, mut events) = spawn_on(&hub, "me", "Me");
    let handle = coordinator.handle();

    handle.connect(PeerIdentity::new("slow", "Slow")).await.unwrap();
    assert!(matches!(next_event(&mut events).await, AppEvent::Connecting { .. }));

    let result = handle.send("hello").await;
    assert!(matches!(result, Err(ChatError::NotConnected)));
    assert_eq!(handle.state().await.unwrap().name(), "Connecting");
    assert_quiet(&mut events).await;

    coordinator.shutdown().await.unwrap();
    assert_eq!(hub.stats().open_streams(), 0);
}

#[tokio::test]
async fn test_second_connect_supersedes_first() {
    let hub = MemoryHub::new();
    hub.stall("peer-a");

    // peer-b listens through its own coordinator
    let (listener, mut listener_events) = spawn_on(&hub, "peer-b", "B");
    listener.handle().start_listening().await.unwrap();
    assert_eq!(next_event(&mut listener_events).await, AppEvent::Listening);
    timeout(Duration::from_secs(1), async {
        while !hub.is_bound("peer-b", &ServiceRecord::default()) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("peer-b should bind");

    let (client, mut events) = spawn_on(&hub, "me", "Me");
    let handle = client.handle();
    handle.connect(PeerIdentity::new("peer-a", "A")).await.unwrap();
    handle.connect(PeerIdentity::new("peer-b", "B")).await.unwrap();

    match next_event(&mut events).await {
        AppEvent::Connecting { peer } => assert_eq!(peer.label(), "A"),
        other => panic!("expected Connecting to A, got {other:?}"),
    }
    match next_event(&mut events).await {
        AppEvent::Connecting { peer } => assert_eq!(peer.label(), "B"),
        other => panic!("expected Connecting to B, got {other:?}"),
    }
    match next_event(&mut events).await {
        AppEvent::Connected { peer } => assert_eq!(peer.label(), "B"),
        other => panic!("expected Connected to B, got {other:?}"),
    }
    assert_quiet(&mut events).await;

    match next_event(&mut listener_events).await {
        AppEvent::Connected { peer } => assert_eq!(peer.label(), "Me"),
        other => panic!("expected Connected to Me, got {other:?}"),
    }

    client.shutdown().await.unwrap();
    listener.shutdown().await.unwrap();
    assert_eq!(hub.stats().open_streams(), 0);
    assert_eq!(hub.stats().open_endpoints(), 0);
}

#[tokio::test]
async fn test_read_failure_yields_single_disconnect() {
    let hub = MemoryHub::new();
    let (coordinator, mut events) = spawn_on(&hub, "me", "Me");
    let remote = connect_to_raw_remote(&hub, &coordinator, &mut events).await;

    drop(remote);

    match next_event(&mut events).await {
        AppEvent::Disconnected { peer, .. } => assert_eq!(peer.label(), "Remote"),
        other => panic!("expected Disconnected, got {other:?}"),
    }
    assert_eq!(coordinator.handle().state().await.unwrap(), ConnectionState::Idle);
    assert_quiet(&mut events).await;
    assert_eq!(hub.stats().open_streams(), 0);

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_send_delivers_bytes_and_reports_sent() {
    let hub = MemoryHub::new();
    let (coordinator, mut events) = spawn_on(&hub, "me", "Me");
    let remote = connect_to_raw_remote(&hub, &coordinator, &mut events).await;
    let (mut stream, _) = remote.into_parts();

    coordinator.handle().send("hello").await.unwrap();
    let sent = next_event(&mut events).await;
    assert_eq!(sent.text().as_deref(), Some("hello"));

    let mut buf = [0u8; 5];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello");

    stream.write_all(b"back").await.unwrap();
    match next_event(&mut events).await {
        AppEvent::MessageReceived { peer, data } => {
            assert_eq!(peer.label(), "Remote");
            assert_eq!(data, b"back");
        }
        other => panic!("expected MessageReceived, got {other:?}"),
    }

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_teardown_twice_is_safe_and_silent() {
    let hub = MemoryHub::new();
    let (coordinator, mut events) = spawn_on(&hub, "me", "Me");
    let remote = connect_to_raw_remote(&hub, &coordinator, &mut events).await;
    let handle = coordinator.handle();

    handle.teardown().await.unwrap();
    handle.teardown().await.unwrap();

    assert_eq!(handle.state().await.unwrap(), ConnectionState::Idle);
    assert_quiet(&mut events).await;

    drop(remote);
    let stats = hub.stats();
    assert_eq!(stats.open_streams(), 0);
    assert_eq!(stats.streams_opened, stats.streams_closed);

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_replaced_session_events_are_discarded() {
    let hub = MemoryHub::new();
    let (coordinator, mut events) = spawn_on(&hub, "me", "Me");
    let remote = connect_to_raw_remote(&hub, &coordinator, &mut events).await;
    let (mut stream, _) = remote.into_parts();

    coordinator.handle().start_listening().await.unwrap();
    assert_eq!(next_event(&mut events).await, AppEvent::Listening);

    // The old session is closed; anything the remote still writes goes nowhere.
    let _ = stream.write_all(b"stale").await;
    assert_quiet(&mut events).await;
    assert_eq!(
        coordinator.handle().state().await.unwrap(),
        ConnectionState::Listening
    );

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bind_failure_returns_to_idle() {
    let hub = MemoryHub::new();
    let _occupied = hub
        .device("me", "Me")
        .bind(&ServiceRecord::default())
        .await
        .unwrap();

    let (coordinator, mut events) = spawn_on(&hub, "me", "Me");
    coordinator.handle().start_listening().await.unwrap();
    assert_eq!(next_event(&mut events).await, AppEvent::Listening);

    match next_event(&mut events).await {
        AppEvent::TransientError { error } => {
            assert_eq!(error.kind(), LinkErrorKind::BindFailed);
            assert!(error.to_string().starts_with("server socket listen failed"));
        }
        other => panic!("expected TransientError, got {other:?}"),
    }
    assert_eq!(coordinator.handle().state().await.unwrap(), ConnectionState::Idle);

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_handle_after_shutdown_reports_stopped() {
    let hub = MemoryHub::new();
    let (coordinator, _events) = spawn_on(&hub, "me", "Me");
    let handle = coordinator.handle();

    coordinator.shutdown().await.unwrap();

    assert!(handle.is_closed());
    assert!(matches!(
        handle.start_listening().await,
        Err(ChatError::CoordinatorStopped)
    ));
}

#[tokio::test]
async fn test_builder_rejects_invalid_config() {
    let hub = MemoryHub::new();

    let result = CoordinatorBuilder::new(hub.device("me", "Me"))
        .with_link_config(LinkConfig::default().with_read_buffer_size(0))
        .spawn();
    assert!(matches!(result, Err(ChatError::Config { .. })));

    let channels = ChannelConfig {
        event_buffer_size: 0,
        ..ChannelConfig::default()
    };
    let result = CoordinatorBuilder::new(hub.device("me", "Me"))
        .with_channel_config(channels)
        .spawn();
    assert!(matches!(result, Err(ChatError::Config { .. })));
}

#[tokio::test]
async fn test_small_read_buffer_splits_messages() {
    let hub = MemoryHub::new();
    let mut coordinator = CoordinatorBuilder::new(hub.device("me", "Me"))
        .with_link_config(LinkConfig::default().with_read_buffer_size(4))
        .spawn()
        .unwrap();
    let mut events = coordinator.take_events().unwrap();
    let remote = connect_to_raw_remote(&hub, &coordinator, &mut events).await;
    let (mut stream, _) = remote.into_parts();

    stream.write_all(b"abcdefgh").await.unwrap();

    let mut received = Vec::new();
    while received.len() < 8 {
        match next_event(&mut events).await {
            AppEvent::MessageReceived { data, .. } => {
                assert!(data.len() <= 4);
                received.extend(data);
            }
            other => panic!("expected MessageReceived, got {other:?}"),
        }
    }
    assert_eq!(received, b"abcdefgh");

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_teardown_while_send_is_blocked() {
    let hub = MemoryHub::new();
    let (coordinator, mut events) = spawn_on(&hub, "me", "Me");
    // The remote end stays open but never reads.
    let _remote = connect_to_raw_remote(&hub, &coordinator, &mut events).await;
    let handle = coordinator.handle();

    let sender = handle.clone();
    let blocked = tokio::spawn(async move { sender.send_bytes(vec![0u8; 256 * 1024]).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    timeout(Duration::from_secs(2), handle.teardown())
        .await
        .expect("teardown should not wait on the write")
        .unwrap();
    assert_eq!(handle.state().await.unwrap(), ConnectionState::Idle);

    let result = timeout(Duration::from_secs(2), blocked)
        .await
        .expect("abandoned send should return")
        .unwrap();
    match result {
        Err(ChatError::Link(error)) => assert_eq!(error.kind(), LinkErrorKind::WriteFailed),
        other => panic!("expected WriteFailed, got {other:?}"),
    }
    assert_quiet(&mut events).await;

    coordinator.shutdown().await.unwrap();
}
