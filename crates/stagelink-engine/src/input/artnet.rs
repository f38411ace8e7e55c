//! Art-Net input

use async_trait::async_trait;
use stagelink_core::artnet::ArtDmx;
use stagelink_core::DecodeError;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

use super::{Ingested, Listener};
use crate::compositor::compose_universes;
use crate::config::ArtNetInputConfig;
use crate::dirty::DirtySignal;
use crate::reaper::StalenessReaper;
use crate::status::{StatusReporter, StatusSink};
use crate::store::UniverseStore;
use crate::traits::Input;

/// Write one ArtDmx datagram into `store`
pub fn ingest(store: &UniverseStore, datagram: &[u8]) -> Result<Ingested, DecodeError> {
    let dmx = ArtDmx::decode(datagram)?;
    let universe = dmx.universe & 0x7fff;
    store.update(universe, |frame| frame.fill_from(dmx.data));
    Ok(Ingested::Universe(universe))
}

/// Receives ArtDmx and exposes universes as one flat channel array
pub struct ArtNetInput {
    listener: Listener,
    store: Arc<UniverseStore>,
    status: StatusReporter,
}

impl ArtNetInput {
    pub fn new(status: Arc<dyn StatusSink>) -> Self {
        Self {
            listener: Listener::new(),
            store: Arc::new(UniverseStore::new(Arc::new(DirtySignal::new()))),
            status: StatusReporter::new("artnet-in", status),
        }
    }

    pub fn store(&self) -> &Arc<UniverseStore> {
        &self.store
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl Input for ArtNetInput {
    type Config = ArtNetInputConfig;
    type Output = Vec<u8>;

    async fn pull(&mut self, config: &ArtNetInputConfig) -> Vec<u8> {
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
                    debug!("Dropped Art-Net datagram from {}: {}", from, e);
                }
            })
        };
        self.listener.ensure(addr, handler, &mut self.status).await;

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
        self.listener.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagelink_core::artnet::encode_dmx;

    fn store() -> UniverseStore {
        UniverseStore::new(Arc::new(DirtySignal::new()))
    }

    #[test]
    fn test_ingest_zero_fills_short_payload() {
        let store = store();
        ingest(&store, &encode_dmx(1, 4, &[0xff; 512]).unwrap()).unwrap();
        ingest(&store, &encode_dmx(2, 4, &[7, 8]).unwrap()).unwrap();

        let frame = store.get(4).unwrap();
        assert_eq!(&frame.as_bytes()[..2], &[7, 8]);
        assert!(frame.as_bytes()[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_every_length_overwrites_previous_frame() {
        let store = store();
        for n in 0..=512usize {
            store.update(3, |frame| frame.fill_from(&[0xff; 512]));
            let payload: Vec<u8> = (0..n).map(|i| (i % 200 + 1) as u8).collect();
            ingest(&store, &encode_dmx(1, 3, &payload).unwrap()).unwrap();

            let frame = store.get(3).unwrap();
            assert_eq!(&frame.as_bytes()[..n], &payload[..]);
            assert!(frame.as_bytes()[n..].iter().all(|&b| b == 0), "n={}", n);
        }
    }

    #[test]
    fn test_ingest_rejects_garbage_without_touching_store() {
        let store = store();
        assert!(ingest(&store, b"hello world, not art-net").is_err());
        assert!(store.is_empty());
    }
}
