//! sACN (E1.31) input

use async_trait::async_trait;
use stagelink_core::sacn::Packet;
use stagelink_core::{DecodeError, Protocol};
use stagelink_transport::MulticastSubscriptions;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::debug;

use super::{Ingested, Listener, ListenerState};
use crate::compositor::compose_universes;
use crate::config::SacnInputConfig;
use crate::dirty::DirtySignal;
use crate::reaper::StalenessReaper;
use crate::status::{StatusReporter, StatusSink};
use crate::store::UniverseStore;
use crate::traits::Input;

/// Write one sACN datagram into `store`.
///
/// Only start code 0 (plain DMX) from non-preview streams on universes
/// 1-63999 is stored; a stream-terminated packet removes its universe at once.
pub fn ingest(store: &UniverseStore, datagram: &[u8]) -> Result<Ingested, DecodeError> {
    let Packet::Data(packet) = Packet::decode(datagram)? else {
        return Ok(Ingested::Ignored);
    };
    if !Protocol::Sacn.id_range().contains(&u32::from(packet.universe)) {
        return Ok(Ingested::Ignored);
    }

    if packet.options.stream_terminated {
        store.remove(packet.universe);
        return Ok(Ingested::Removed(packet.universe));
    }
    if packet.start_code != 0x00 || packet.options.preview {
        return Ok(Ingested::Ignored);
    }

    store.update(packet.universe, |frame| frame.fill_from(packet.data));
    Ok(Ingested::Universe(packet.universe))
}

/// Receives E1.31 data packets, joining one multicast group per universe
pub struct SacnInput {
    listener: Listener,
    store: Arc<UniverseStore>,
    status: StatusReporter,
    subscriptions: MulticastSubscriptions,
}

impl SacnInput {
    pub fn new(status: Arc<dyn StatusSink>) -> Self {
        Self {
            listener: Listener::new(),
            store: Arc::new(UniverseStore::new(Arc::new(DirtySignal::new()))),
            status: StatusReporter::new("sacn-in", status),
            subscriptions: MulticastSubscriptions::new(Ipv4Addr::UNSPECIFIED),
        }
    }

    pub fn store(&self) -> &Arc<UniverseStore> {
        &self.store
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn subscriptions(&self) -> &MulticastSubscriptions {
        &self.subscriptions
    }

    fn update_membership(&mut self, config: &SacnInputConfig) {
        let Some(socket) = self.listener.socket() else {
            return;
        };
        let report = if config.multicast {
            self.subscriptions
                .reconcile(socket.as_ref(), config.start_universe, config.universe_count)
        } else {
            self.subscriptions.leave_all(socket.as_ref())
        };
        if !report.failed.is_empty() {
            self.status.warn(format!(
                "Could not join {} multicast group(s); unicast traffic is still received",
                report.failed.len()
            ));
        }
    }
}

#[async_trait]
impl Input for SacnInput {
    type Config = SacnInputConfig;
    type Output = Vec<u8>;

    async fn pull(&mut self, config: &SacnInputConfig) -> Vec<u8> {
        let addr = match config.validate().and_then(|_| config.bind_addr()) {
            Ok(addr) => addr,
            Err(e) => {
                self.status.warn(format!("Invalid configuration: {}", e));
                return Vec::new();
            }
        };

        let store = self.store.clone();
        let handler = move || {
            Arc::new(move |datagram: &[u8], from: SocketAddr| {
                if let Err(e) = ingest(&store, datagram) {
                    debug!("Dropped sACN datagram from {}: {}", from, e);
                }
            })
        };

        match self.listener.ensure(addr, handler, &mut self.status).await {
            ListenerState::Running { fresh } => {
                if fresh {
                    // New socket, no memberships yet
                    self.subscriptions = MulticastSubscriptions::new(*addr.ip());
                }
                self.update_membership(config);
            }
            ListenerState::Down => {}
        }

        StalenessReaper::from_secs(config.timeout_secs).sweep(&self.store);
        compose_universes(&self.store, config.start_universe, config.universe_count)
    }

    fn dirty(&self) -> &Arc<DirtySignal> {
        self.store.dirty()
    }

    fn is_running(&self) -> bool {
        self.listener.is_running()
    }

    async fn stop(&mut self) {
        if let Some(socket) = self.listener.socket() {
            self.subscriptions.leave_all(socket.as_ref());
        }
        self.subscriptions.clear();
        self.listener.stop().await;
    }
}
