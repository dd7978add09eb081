//! BMP routing provider
//!
//! Routes learnt from BMP sessions are kept in a [`Rib`] published through
//! an `ArcSwap`: lookups load the current snapshot without locking, and
//! the ingestion task applies batches of updates to a copy before swapping
//! it in. Decoding the BMP protocol is not done here; the session decoder
//! pushes [`RibUpdate`]s into the channel returned by
//! [`BmpProvider::updates`].

use arc_swap::ArcSwap;
use async_trait::async_trait;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Dependencies, Lifecycle, Provider};
use crate::error::RoutingError;
use crate::result::LookupResult;
use crate::rib::{Rib, RibUpdate, RibUpdateSender};
use flowlens_core::ConfigError;

/// Configuration of the BMP provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BmpProviderConfig {
    /// Keep origin AS numbers
    pub collect_asns: bool,
    /// Keep AS paths
    pub collect_as_paths: bool,
    /// Keep standard and large communities
    pub collect_communities: bool,
    /// Capacity of the update channel
    pub channel_capacity: usize,
    /// Maximum number of updates applied before publishing a snapshot
    pub publish_batch: usize,
}

impl Default for BmpProviderConfig {
    fn default() -> Self {
        Self {
            collect_asns: true,
            collect_as_paths: true,
            collect_communities: true,
            channel_capacity: 1024,
            publish_batch: 256,
        }
    }
}

impl BmpProviderConfig {
    /// Strip the attributes that are not collected
    fn filter(&self, update: RibUpdate) -> RibUpdate {
        match update {
            RibUpdate::Announce {
                peer,
                prefix,
                next_hop,
                mut attributes,
            } => {
                if !self.collect_asns {
                    attributes.asn = 0;
                }
                if !self.collect_as_paths {
                    attributes.as_path.clear();
                }
                if !self.collect_communities {
                    attributes.communities.clear();
                    attributes.large_communities.clear();
                }
                RibUpdate::Announce {
                    peer,
                    prefix,
                    next_hop,
                    attributes,
                }
            }
            other => other,
        }
    }
}

/// Routing provider fed by BMP sessions
pub struct BmpProvider {
    config: BmpProviderConfig,
    rib: Arc<ArcSwap<Rib>>,
    sender: RibUpdateSender,
    receiver: Mutex<Option<mpsc::Receiver<RibUpdate>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl BmpProvider {
    pub fn new(config: &BmpProviderConfig, dependencies: &Dependencies) -> Result<Self, RoutingError> {
        if config.channel_capacity == 0 || config.publish_batch == 0 {
            return Err(ConfigError::Invalid {
                registry: "routing provider",
                kind: "bmp".to_string(),
                message: "channel_capacity and publish_batch must be positive".to_string(),
            }
            .into());
        }

        let (sender, receiver) = mpsc::channel(config.channel_capacity);

        Ok(Self {
            config: config.clone(),
            rib: Arc::new(ArcSwap::from_pointee(Rib::new())),
            sender,
            receiver: Mutex::new(Some(receiver)),
            task: Mutex::new(None),
            cancel: dependencies.shutdown.child_token(),
        })
    }

    /// Channel the session decoder pushes updates into
    pub fn updates(&self) -> RibUpdateSender {
        self.sender.clone()
    }

    /// Currently published table
    pub fn snapshot(&self) -> Arc<Rib> {
        self.rib.load_full()
    }
}

#[async_trait]
impl Provider for BmpProvider {
    async fn lookup(&self, addr: IpAddr, next_hop: Option<IpAddr>) -> LookupResult {
        self.rib.load().lookup(addr, next_hop)
    }
}

#[async_trait]
impl Lifecycle for BmpProvider {
    async fn start(&self) -> Result<(), RoutingError> {
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or_else(|| RoutingError::Lifecycle("BMP provider already started".to_string()))?;

        let handle = tokio::spawn(ingest(
            self.rib.clone(),
            receiver,
            self.cancel.clone(),
            self.config.clone(),
        ));
        *self.task.lock() = Some(handle);

        info!(
            "BMP provider started (channel capacity: {}, publish batch: {})",
            self.config.channel_capacity, self.config.publish_batch
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), RoutingError> {
        self.cancel.cancel();

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| RoutingError::Lifecycle(format!("BMP ingestion task failed: {}", e)))?;
        }

        info!("BMP provider stopped");
        Ok(())
    }
}

/// Apply incoming updates and publish a new snapshot after each batch
async fn ingest(
    rib: Arc<ArcSwap<Rib>>,
    mut receiver: mpsc::Receiver<RibUpdate>,
    cancel: CancellationToken,
    config: BmpProviderConfig,
) {
    loop {
        let first = tokio::select! {
            _ = cancel.cancelled() => break,
            update = receiver.recv() => match update {
                Some(update) => update,
                None => break,
            },
        };

        let mut next = Rib::clone(&rib.load());
        next.apply(config.filter(first));

        let mut applied = 1;
        while applied < config.publish_batch {
            match receiver.try_recv() {
                Ok(update) => {
                    next.apply(config.filter(update));
                    applied += 1;
                }
                Err(_) => break,
            }
        }

        let routes = next.route_count();
        rib.store(Arc::new(next));

        counter!("flowlens_bmp_updates_total").increment(applied as u64);
        gauge!("flowlens_bmp_routes").set(routes as f64);
        debug!("Published RIB snapshot ({} updates, {} routes)", applied, routes);
    }

    debug!("BMP ingestion stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::{PeerKey, RouteAttributes};
    use std::time::Duration;

    fn peer() -> PeerKey {
        PeerKey {
            address: "192.0.2.1".parse().unwrap(),
            asn: 64500,
        }
    }

    fn announce(prefix: &str, asn: u32) -> RibUpdate {
        RibUpdate::Announce {
            peer: peer(),
            prefix: prefix.parse().unwrap(),
            next_hop: Some("192.0.2.1".parse().unwrap()),
            attributes: RouteAttributes {
                asn,
                as_path: vec![64500, asn],
                communities: vec![100],
                large_communities: vec![],
            },
        }
    }

    async fn wait_for(provider: &BmpProvider, check: impl Fn(&Rib) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check(&provider.snapshot()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("RIB was not updated in time");
    }

    #[tokio::test]
    async fn test_ingests_updates_after_start() {
        let provider = BmpProvider::new(&BmpProviderConfig::default(), &Dependencies::default()).unwrap();
        let updates = provider.updates();

        // Nothing is known before the first update
        assert!(provider.lookup("10.0.0.1".parse().unwrap(), None).await.is_empty());

        provider.start().await.unwrap();
        updates.send(announce("10.0.0.0/8", 64501)).await.unwrap();
        wait_for(&provider, |rib| rib.route_count() == 1).await;

        let result = provider
            .lookup("10.1.2.3".parse().unwrap(), Some("192.0.2.1".parse().unwrap()))
            .await;
        assert_eq!(result.asn, 64501);
        assert_eq!(result.as_path, vec![64500, 64501]);

        updates
            .send(RibUpdate::Withdraw {
                peer: peer(),
                prefix: "10.0.0.0/8".parse().unwrap(),
            })
            .await
            .unwrap();
        wait_for(&provider, |rib| rib.is_empty()).await;
        assert!(provider.lookup("10.1.2.3".parse().unwrap(), None).await.is_empty());

        provider.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_uncollected_attributes_are_dropped() {
        let config = BmpProviderConfig {
            collect_as_paths: false,
            collect_communities: false,
            ..Default::default()
        };
        let provider = BmpProvider::new(&config, &Dependencies::default()).unwrap();
        provider.start().await.unwrap();

        provider.updates().send(announce("10.0.0.0/8", 64501)).await.unwrap();
        wait_for(&provider, |rib| rib.route_count() == 1).await;

        let result = provider.lookup("10.0.0.1".parse().unwrap(), None).await;
        assert_eq!(result.asn, 64501);
        assert!(result.as_path.is_empty());
        assert!(result.communities.is_empty());

        provider.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let provider = BmpProvider::new(&BmpProviderConfig::default(), &Dependencies::default()).unwrap();
        provider.start().await.unwrap();
        assert!(matches!(provider.start().await, Err(RoutingError::Lifecycle(_))));
        provider.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_ingestion() {
        let dependencies = Dependencies::default();
        let provider = BmpProvider::new(&BmpProviderConfig::default(), &dependencies).unwrap();
        provider.start().await.unwrap();

        dependencies.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), provider.stop())
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_invalid_config() {
        let config = BmpProviderConfig {
            publish_batch: 0,
            ..Default::default()
        };
        assert!(matches!(
            BmpProvider::new(&config, &Dependencies::default()),
            Err(RoutingError::Config(_))
        ));
    }
}
