//! Output operator tests (stagelink-engine)
//!
//! - Art-Net, sACN and PSN outputs feed the matching inputs over loopback
//! - Sequence numbers advance once per frame
//! - Closing an sACN output terminates its streams
//! - Discovery announcements reach a discovery listener
//! - Send failures degrade connectivity without stopping the output

use glam::Vec3;
use stagelink_core::artnet::ArtDmx;
use stagelink_core::psn::TrackerPose;
use stagelink_engine::config::{
    ArtNetInputConfig, ArtNetOutputConfig, PsnInputConfig, PsnOutputConfig, SacnDiscoveryConfig, SacnInputConfig,
    SacnOutputConfig,
};
use stagelink_engine::{
    ArtNetInput, ArtNetOutput, Connectivity, Input, Output, PsnInput, PsnOutput, SacnDiscovery, SacnInput,
    SacnOutput, Severity, StatusLog,
};
use stagelink_test_utils::{find_available_udp_port, wait_until, TestReceiver, DEFAULT_TIMEOUT};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn artnet_out(port: u16) -> ArtNetOutputConfig {
    ArtNetOutputConfig {
        local_ip: "127.0.0.1".into(),
        target_ip: "127.0.0.1".into(),
        port,
        max_fps: 0.0,
        broadcast: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_artnet_output_to_input() {
    let port = find_available_udp_port();
    let in_config = ArtNetInputConfig {
        local_ip: "127.0.0.1".into(),
        port,
        start_universe: 0,
        universe_count: 2,
        ..Default::default()
    };
    let mut input = ArtNetInput::new(Arc::new(StatusLog::new()));
    input.pull(&in_config).await;

    let mut output = ArtNetOutput::new(Arc::new(StatusLog::new()));
    let frame: Vec<i32> = (0..1024).map(|i| if i == 600 { 300 } else { -1 }).collect();
    output.send(&artnet_out(port), &frame).await;
    assert_eq!(output.connectivity(), Connectivity::Connected);

    let store = input.store().clone();
    assert!(wait_until(|| store.len() == 2, DEFAULT_TIMEOUT).await);
    let channels = input.pull(&in_config).await;
    // Values were clamped to 0..=255 before encoding
    assert_eq!(channels[600], 255);
    assert_eq!(channels[599], 0);

    output.close().await;
    input.stop().await;
}

#[tokio::test]
async fn test_artnet_sequence_shared_within_frame() {
    let receiver = TestReceiver::bind().await;
    let mut output = ArtNetOutput::new(Arc::new(StatusLog::new()));
    let config = artnet_out(receiver.port());

    output.send(&config, &vec![1; 1024]).await;
    output.send(&config, &vec![2; 1024]).await;

    let datagrams = receiver.recv_many(4, DEFAULT_TIMEOUT).await;
    assert_eq!(datagrams.len(), 4);
    let sequences: Vec<u8> = datagrams
        .iter()
        .map(|d| ArtDmx::decode(d).unwrap().sequence)
        .collect();
    assert_eq!(sequences, vec![1, 1, 2, 2]);
}

#[tokio::test]
async fn test_pacing_spaces_frames() {
    let receiver = TestReceiver::bind().await;
    let mut output = ArtNetOutput::new(Arc::new(StatusLog::new()));
    let config = ArtNetOutputConfig {
        max_fps: 20.0,
        ..artnet_out(receiver.port())
    };

    let start = Instant::now();
    for _ in 0..5 {
        output.send(&config, &[1, 2, 3]).await;
    }
    // Four full periods between five frames
    assert!(start.elapsed() >= Duration::from_millis(190));
    assert_eq!(receiver.recv_many(5, DEFAULT_TIMEOUT).await.len(), 5);
}

#[tokio::test]
async fn test_very_slow_rate_sends_first_frame() {
    let receiver = TestReceiver::bind().await;
    let mut output = ArtNetOutput::new(Arc::new(StatusLog::new()));
    let config = ArtNetOutputConfig {
        max_fps: 1e-30,
        ..artnet_out(receiver.port())
    };
    config.validate().unwrap();

    // The first slot is immediate however long the period is
    tokio::time::timeout(DEFAULT_TIMEOUT, output.send(&config, &[9, 9]))
        .await
        .unwrap();
    assert_eq!(output.connectivity(), Connectivity::Connected);
    assert_eq!(receiver.recv_many(1, DEFAULT_TIMEOUT).await.len(), 1);
}

#[tokio::test]
async fn test_send_failure_degrades_connectivity() {
    let log = Arc::new(StatusLog::new());
    let mut output = ArtNetOutput::new(log.clone());
    // Broadcast target without SO_BROADCAST is refused by the OS
    let config = ArtNetOutputConfig {
        target_ip: "255.255.255.255".into(),
        ..artnet_out(6454)
    };

    output.send(&config, &[1; 512]).await;
    assert_eq!(output.connectivity(), Connectivity::Degraded);
    assert_eq!(log.count(Severity::Warning), 1);

    // The output keeps going; a valid target recovers it
    let receiver = TestReceiver::bind().await;
    output.send(&artnet_out(receiver.port()), &[1; 512]).await;
    assert_eq!(output.connectivity(), Connectivity::Connected);
    assert!(receiver.recv(DEFAULT_TIMEOUT).await.is_some());
}

#[tokio::test]
async fn test_sacn_unicast_output_to_input_and_termination() {
    let port = find_available_udp_port();
    let in_config = SacnInputConfig {
        local_ip: "127.0.0.1".into(),
        port,
        start_universe: 5,
        universe_count: 1,
        multicast: false,
        ..Default::default()
    };
    let out_config = SacnOutputConfig {
        local_ip: "127.0.0.1".into(),
        target_ip: "127.0.0.1".into(),
        port,
        multicast: false,
        start_universe: 5,
        max_fps: 0.0,
        discovery: false,
        ..Default::default()
    };

    let mut input = SacnInput::new(Arc::new(StatusLog::new()));
    input.pull(&in_config).await;

    let mut output = SacnOutput::new(Arc::new(StatusLog::new()));
    output.send(&out_config, &[50, 60, 70]).await;

    let store = input.store().clone();
    assert!(wait_until(|| store.contains(5), DEFAULT_TIMEOUT).await);
    assert_eq!(&input.pull(&in_config).await[..4], &[50, 60, 70, 0]);

    output.close().await;
    assert!(wait_until(|| !store.contains(5), DEFAULT_TIMEOUT).await);

    input.stop().await;
}

#[tokio::test]
async fn test_sacn_sync_packet_follows_frame() {
    let receiver = TestReceiver::bind().await;
    let config = SacnOutputConfig {
        local_ip: "127.0.0.1".into(),
        target_ip: "127.0.0.1".into(),
        port: receiver.port(),
        multicast: false,
        max_fps: 0.0,
        sync_enabled: true,
        sync_universe: 900,
        discovery: false,
        ..Default::default()
    };
    let mut output = SacnOutput::new(Arc::new(StatusLog::new()));
    output.send(&config, &[1; 512]).await;

    let datagrams = receiver.recv_many(2, DEFAULT_TIMEOUT).await;
    assert_eq!(datagrams.len(), 2);
    match stagelink_core::sacn::Packet::decode(&datagrams[0]).unwrap() {
        stagelink_core::sacn::Packet::Data(data) => assert_eq!(data.sync_address, 900),
        other => panic!("expected data, got {:?}", other),
    }
    match stagelink_core::sacn::Packet::decode(&datagrams[1]).unwrap() {
        stagelink_core::sacn::Packet::Sync(sync) => {
            assert_eq!(sync.sync_address, 900);
            assert_eq!(sync.cid, output.cid());
        }
        other => panic!("expected sync, got {:?}", other),
    }
}

#[tokio::test]
async fn test_discovery_reaches_listener() {
    let port = find_available_udp_port();
    let discovery_config = SacnDiscoveryConfig {
        local_ip: "127.0.0.1".into(),
        port,
        ..Default::default()
    };
    let mut discovery = SacnDiscovery::new(Arc::new(StatusLog::new()));
    assert!(discovery.pull(&discovery_config).await.is_empty());

    let out_config = SacnOutputConfig {
        local_ip: "127.0.0.1".into(),
        target_ip: "127.0.0.1".into(),
        port,
        multicast: false,
        start_universe: 20,
        max_fps: 0.0,
        source_name: "Console".into(),
        ..Default::default()
    };
    let mut output = SacnOutput::new(Arc::new(StatusLog::new()));
    output.send(&out_config, &vec![0; 1024]).await;

    let directory = discovery.directory().clone();
    assert!(wait_until(|| !directory.is_empty(), DEFAULT_TIMEOUT).await);

    let sources = discovery.pull(&discovery_config).await;
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].name, "Console");
    assert_eq!(sources[0].universes, vec![20, 21]);
    assert_eq!(sources[0].cid, output.cid());

    discovery.stop().await;
}

#[tokio::test]
async fn test_psn_output_to_input() {
    let port = find_available_udp_port();
    let in_config = PsnInputConfig {
        local_ip: "127.0.0.1".into(),
        port,
        multicast_group: String::new(),
        start_tracker: 0,
        tracker_count: 16,
        ..Default::default()
    };
    let out_config = PsnOutputConfig {
        local_ip: "127.0.0.1".into(),
        target_ip: "127.0.0.1".into(),
        port,
        start_tracker: 2,
        max_fps: 0.0,
        system_name: "Rig".into(),
        tracker_names: vec!["Left".into(), "Right".into()],
        ..Default::default()
    };

    let mut input = PsnInput::new(Arc::new(StatusLog::new()));
    input.pull(&in_config).await;

    let poses = [
        TrackerPose::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 0.5, 0.0)),
        TrackerPose::new(Vec3::new(-1.0, 0.0, 0.5), Vec3::new(0.0, 0.0, 0.25)),
    ];
    let mut output = PsnOutput::new(Arc::new(StatusLog::new()));
    output.send(&out_config, &poses).await;
    assert_eq!(output.connectivity(), Connectivity::Connected);

    let names = input.names().clone();
    assert!(wait_until(|| names.get(3).is_some(), DEFAULT_TIMEOUT).await);
    let store = input.store().clone();
    assert!(wait_until(|| store.len() == 2, DEFAULT_TIMEOUT).await);

    // Z is flipped out and back, so scene coordinates survive the trip
    let trackers = input.pull(&in_config).await;
    assert_eq!(trackers[0].0, 2);
    assert_eq!(trackers[0].1.position, poses[0].position);
    assert_eq!(trackers[1].0, 3);
    assert_eq!(trackers[1].1.axis_angle, poses[1].axis_angle);
    assert_eq!(names.system_name().as_deref(), Some("Rig"));
    assert_eq!(names.get(2).as_deref(), Some("Left"));

    input.stop().await;
}
