//! Input operator tests (stagelink-engine)
//!
//! - Art-Net composite of two universes over loopback
//! - Arrival order does not matter
//! - Stale universes are evicted and read back as zeros
//! - PSN partial updates keep earlier fields
//! - Invalid configuration and bind failures are reported, not fatal

use glam::Vec3;
use stagelink_core::artnet::encode_dmx;
use stagelink_core::psn::{DataPacket, PacketHeader, TrackerUpdate};
use stagelink_engine::config::{ArtNetInputConfig, PsnInputConfig, SacnInputConfig};
use stagelink_engine::{
    ArtNetInput, DirtyWatch, Input, PsnInput, SacnInput, Severity, StatusLog,
};
use stagelink_test_utils::{find_available_udp_port, wait_until, TestSender, DEFAULT_TIMEOUT};
use std::sync::Arc;
use std::time::Duration;

fn artnet_config(port: u16) -> ArtNetInputConfig {
    ArtNetInputConfig {
        local_ip: "127.0.0.1".into(),
        port,
        start_universe: 1,
        universe_count: 2,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_artnet_two_universe_composite() {
    let port = find_available_udp_port();
    let config = artnet_config(port);
    let mut input = ArtNetInput::new(Arc::new(StatusLog::new()));

    // First pull binds; nothing received yet
    let empty = input.pull(&config).await;
    assert_eq!(empty, vec![0u8; 1024]);
    assert!(input.is_running());

    let sender = TestSender::new().await;
    sender
        .send(&encode_dmx(1, 2, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]).unwrap(), port)
        .await;

    let store = input.store().clone();
    assert!(wait_until(|| store.contains(2), DEFAULT_TIMEOUT).await);

    let out = input.pull(&config).await;
    assert_eq!(out.len(), 1024);
    assert!(out[..512].iter().all(|&b| b == 0));
    assert_eq!(&out[512..522], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    assert!(out[522..].iter().all(|&b| b == 0));

    input.stop().await;
    assert!(!input.is_running());
}

#[tokio::test]
async fn test_artnet_arrival_order_does_not_matter() {
    let port = find_available_udp_port();
    let config = ArtNetInputConfig {
        universe_count: 3,
        ..artnet_config(port)
    };
    let mut input = ArtNetInput::new(Arc::new(StatusLog::new()));
    input.pull(&config).await;

    let sender = TestSender::new().await;
    for universe in [3u16, 1, 2] {
        sender
            .send(&encode_dmx(1, universe, &[universe as u8; 4]).unwrap(), port)
            .await;
    }

    let store = input.store().clone();
    assert!(wait_until(|| store.len() == 3, DEFAULT_TIMEOUT).await);

    let out = input.pull(&config).await;
    assert_eq!(out[0], 1);
    assert_eq!(out[512], 2);
    assert_eq!(out[1024], 3);

    input.stop().await;
}

#[tokio::test]
async fn test_stale_universe_evicted_on_pull() {
    let port = find_available_udp_port();
    let config = ArtNetInputConfig {
        timeout_secs: 0.2,
        ..artnet_config(port)
    };
    let mut input = ArtNetInput::new(Arc::new(StatusLog::new()));
    input.pull(&config).await;

    let sender = TestSender::new().await;
    sender.send(&encode_dmx(1, 1, &[255; 512]).unwrap(), port).await;
    let store = input.store().clone();
    assert!(wait_until(|| store.contains(1), DEFAULT_TIMEOUT).await);

    let mut watch = DirtyWatch::new(input.dirty().clone());
    assert_eq!(input.pull(&config).await[0], 255);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let out = input.pull(&config).await;
    assert!(out.iter().all(|&b| b == 0));
    assert!(!store.contains(1));
    assert!(watch.take());

    input.stop().await;
}

#[tokio::test]
async fn test_zero_timeout_keeps_universes() {
    let port = find_available_udp_port();
    let config = ArtNetInputConfig {
        timeout_secs: 0.0,
        ..artnet_config(port)
    };
    let mut input = ArtNetInput::new(Arc::new(StatusLog::new()));
    input.pull(&config).await;

    let sender = TestSender::new().await;
    sender.send(&encode_dmx(1, 1, &[9; 8]).unwrap(), port).await;
    let store = input.store().clone();
    assert!(wait_until(|| store.contains(1), DEFAULT_TIMEOUT).await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(input.pull(&config).await[0], 9);
    input.stop().await;
}

#[tokio::test]
async fn test_sacn_unicast_without_multicast() {
    let port = find_available_udp_port();
    let config = SacnInputConfig {
        local_ip: "127.0.0.1".into(),
        port,
        start_universe: 1,
        universe_count: 1,
        multicast: false,
        ..Default::default()
    };
    let mut input = SacnInput::new(Arc::new(StatusLog::new()));
    input.pull(&config).await;
    assert!(input.subscriptions().joined().is_empty());

    let packet = stagelink_core::sacn::DataPacket::new(
        [7; 16],
        stagelink_core::sacn::SourceName::new("test"),
        1,
        0,
        &[10, 20, 30],
    );
    let sender = TestSender::new().await;
    sender.send(&packet.encode().unwrap(), port).await;

    let store = input.store().clone();
    assert!(wait_until(|| store.contains(1), DEFAULT_TIMEOUT).await);
    assert_eq!(&input.pull(&config).await[..3], &[10, 20, 30]);

    input.stop().await;
}

#[tokio::test]
async fn test_psn_position_only_update_over_udp() {
    let port = find_available_udp_port();
    let config = PsnInputConfig {
        local_ip: "127.0.0.1".into(),
        port,
        multicast_group: String::new(),
        ..Default::default()
    };
    let mut input = PsnInput::new(Arc::new(StatusLog::new()));
    assert!(input.pull(&config).await.is_empty());

    let sender = TestSender::new().await;
    let full = DataPacket::new(
        PacketHeader::new(0, 0, 1),
        vec![TrackerUpdate::pose(3, Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 1.0, 0.0))],
    );
    sender.send(&full.encode().unwrap(), port).await;
    let store = input.store().clone();
    assert!(wait_until(|| store.contains(3), DEFAULT_TIMEOUT).await);

    let partial = DataPacket::new(
        PacketHeader::new(1, 1, 1),
        vec![TrackerUpdate {
            position: Some(Vec3::new(5.0, 0.0, 2.0)),
            ..TrackerUpdate::new(3)
        }],
    );
    sender.send(&partial.encode().unwrap(), port).await;
    assert!(
        wait_until(
            || store.get(3).map(|pose| pose.position.x) == Some(5.0),
            DEFAULT_TIMEOUT
        )
        .await
    );

    let trackers = input.pull(&config).await;
    assert_eq!(trackers.len(), 1);
    let (id, pose) = trackers[0];
    assert_eq!(id, 3);
    assert_eq!(pose.position, Vec3::new(5.0, 0.0, -2.0));
    assert_eq!(pose.axis_angle, Vec3::new(0.0, 1.0, 0.0));

    input.stop().await;
}

#[tokio::test]
async fn test_invalid_config_returns_empty_and_warns() {
    let log = Arc::new(StatusLog::new());
    let mut input = ArtNetInput::new(log.clone());
    let config = ArtNetInputConfig {
        local_ip: "not an address".into(),
        ..Default::default()
    };

    assert!(input.pull(&config).await.is_empty());
    assert!(input.pull(&config).await.is_empty());
    assert!(!input.is_running());
    // Reported once, not once per tick
    assert_eq!(log.count(Severity::Warning), 1);
}

#[tokio::test]
async fn test_oversized_timeout_rejected_without_panic() {
    let log = Arc::new(StatusLog::new());
    let mut input = ArtNetInput::new(log.clone());
    let config = ArtNetInputConfig {
        timeout_secs: 1e20,
        ..artnet_config(find_available_udp_port())
    };

    assert!(input.pull(&config).await.is_empty());
    assert!(!input.is_running());
    assert_eq!(log.count(Severity::Warning), 1);
}

#[tokio::test]
async fn test_bind_failure_reported_once() {
    let log = Arc::new(StatusLog::new());
    let mut input = ArtNetInput::new(log.clone());
    // Not a local address on any test machine
    let config = ArtNetInputConfig {
        local_ip: "192.0.2.1".into(),
        port: find_available_udp_port(),
        ..Default::default()
    };

    let out = input.pull(&config).await;
    assert_eq!(out.len(), 512);
    input.pull(&config).await;
    assert!(!input.is_running());
    assert_eq!(log.count(Severity::Error), 1);
}

#[tokio::test]
async fn test_rebinds_when_port_changes() {
    let first = find_available_udp_port();
    let mut input = ArtNetInput::new(Arc::new(StatusLog::new()));
    input.pull(&artnet_config(first)).await;
    assert_eq!(input.local_addr().map(|a| a.port()), Some(first));

    let second = find_available_udp_port();
    input.pull(&artnet_config(second)).await;
    assert_eq!(input.local_addr().map(|a| a.port()), Some(second));

    let sender = TestSender::new().await;
    sender.send(&encode_dmx(1, 1, &[1]).unwrap(), second).await;
    let store = input.store().clone();
    assert!(wait_until(|| store.contains(1), DEFAULT_TIMEOUT).await);

    input.stop().await;
}
