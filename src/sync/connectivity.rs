use crate::config::ConnectivityConfig;
use crate::error::Result;
use crate::sheets::SheetOperations;
use crate::store::KeyValueStore;
use crate::sync::engine::{DrainOutcome, ReconcileEngine};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

#[async_trait]
pub trait ConnectivityProbe {
    async fn is_online(&self) -> bool;
}

/// Treats any HTTP response from the probe URL as being online.
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(config: &ConnectivityConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            url: config.probe_url.clone(),
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn is_online(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Connectivity probe failed: {}", e);
                false
            }
        }
    }
}

/// Watches for connectivity transitions and replays the queue on reconnect.
pub struct ConnectivityMonitor<P> {
    probe: P,
    last: Option<Connectivity>,
}

impl<P: ConnectivityProbe + Sync> ConnectivityMonitor<P> {
    pub fn new(probe: P) -> Self {
        Self { probe, last: None }
    }

    /// Record a state; returns it only when it differs from the previous one.
    pub fn observe(&mut self, state: Connectivity) -> Option<Connectivity> {
        if self.last == Some(state) {
            return None;
        }
        self.last = Some(state);
        Some(state)
    }

    pub async fn check(&self) -> Connectivity {
        match self.probe.is_online().await {
            true => Connectivity::Online,
            false => Connectivity::Offline,
        }
    }

    /// Probe once and forward any transition to the engine. Drain errors are logged here;
    /// the queue stays intact for the next transition.
    #[instrument(name = "Checking connectivity", skip_all)]
    pub async fn poll<R, K>(&mut self, engine: &ReconcileEngine<R, K>) -> Option<Connectivity>
    where
        R: SheetOperations + Send + Sync,
        K: KeyValueStore,
    {
        let state = self.check().await;
        let transition = self.observe(state)?;

        match transition {
            Connectivity::Offline => {
                engine.set_online(false);
                warn!("Offline, new expenses will be saved locally");
            }
            Connectivity::Online => match engine.on_connectivity(true).await {
                Ok(Some(DrainOutcome::Drained(count))) => info!(count, "Synced pending expenses"),
                Ok(_) => {}
                Err(e) => warn!("Failed to sync pending expenses: {}", e),
            },
        }

        Some(transition)
    }

    /// Poll forever at `interval`. Callers stop it by dropping the future.
    pub async fn run<R, K>(mut self, engine: Arc<ReconcileEngine<R, K>>, interval: Duration)
    where
        R: SheetOperations + Send + Sync,
        K: KeyValueStore,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.poll(engine.as_ref()).await;
        }
    }
}
