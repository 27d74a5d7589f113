use crate::{
    config::BridgeSettings,
    device::{CurtainDevice, SessionEvents, StateUpdate},
    error::{CurtainError, Result},
    mqtt::MessagingClient,
    topics::{
        TopicSet, AVAILABILITY_OFFLINE, AVAILABILITY_ONLINE, COMMAND_CLOSE, COMMAND_OPEN,
        COMMAND_STOP,
    },
    transport::CurtainTransport,
    types::{BridgeTiming, ConnectionParams, PollConfig},
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, Mutex},
    time::sleep,
};
use tracing::{debug, info, warn};

/// Host network reachability, gating every broker operation.
pub trait NetworkMonitor: Send + Sync {
    /// Whether the host currently has network connectivity.
    fn is_connected(&self) -> bool;
}

/// Monitor for hosts whose connectivity is managed by the operating
/// system and can be assumed present.
pub struct AlwaysConnected;

impl NetworkMonitor for AlwaysConnected {
    fn is_connected(&self) -> bool {
        true
    }
}

struct BridgeInner {
    client: Arc<dyn MessagingClient>,
    network: Arc<dyn NetworkMonitor>,
    topics: TopicSet,
    client_id: String,
    cover_online: Mutex<bool>,
    inbound_tx: mpsc::UnboundedSender<(String, String)>,
}

impl BridgeInner {
    /// Connects to the broker and restores the bridge's retained
    /// surface. Failures are logged and left for the maintenance loops
    /// to retry.
    async fn connect(&self, clean_session: bool) {
        let tx = self.inbound_tx.clone();
        self.client
            .set_message_callback(Arc::new(move |topic, payload| {
                let _ = tx.send((topic.to_string(), payload.to_string()));
            }));
        self.client
            .set_last_will(&self.topics.bridge_availability, AVAILABILITY_OFFLINE, true);

        if let Err(e) = self.establish(clean_session).await {
            warn!("Messaging connect failed: {e}");
        }
    }

    async fn establish(&self, clean_session: bool) -> Result<()> {
        self.client.connect(clean_session).await?;

        self.client.subscribe(&self.topics.set_command).await?;
        self.client
            .subscribe(&self.topics.bridge_availability)
            .await?;
        self.client.subscribe(&self.topics.set_position).await?;

        self.publish_discovery().await?;
        self.publish_raw(&self.topics.bridge_availability, AVAILABILITY_ONLINE, true)
            .await?;

        info!("Messaging connected, discovery published");
        Ok(())
    }

    async fn publish_discovery(&self) -> Result<()> {
        let cover = self
            .topics
            .cover_discovery_payload(&self.client_id)
            .to_string();
        let battery = self
            .topics
            .battery_discovery_payload(&self.client_id)
            .to_string();

        self.publish_raw(&self.topics.cover_discovery, &cover, true)
            .await?;
        self.publish_raw(&self.topics.battery_discovery, &battery, true)
            .await
    }

    async fn publish_raw(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
        debug!("Publishing {payload} to {topic}");
        self.client.publish(topic, payload, retain).await
    }

    /// Publishes with a lazy reconnect on failure. Returns whether the
    /// payload actually went out.
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> bool {
        if !self.network.is_connected() {
            debug!("Network down, dropping publish to {topic}");
            return false;
        }

        match self.publish_raw(topic, payload, retain).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Publish to {topic} failed: {e}");
                self.connect(false).await;
                false
            }
        }
    }

    async fn publish_bridge_online(&self) -> bool {
        self.publish(&self.topics.bridge_availability, AVAILABILITY_ONLINE, true)
            .await
    }
}

#[async_trait]
impl SessionEvents for BridgeInner {
    async fn on_state_changed(&self, update: &StateUpdate) {
        if let Some(motion) = update.motion_status {
            self.publish(&self.topics.state, &motion.to_string(), true)
                .await;
        }
        if let Some(position) = update.position {
            self.publish(&self.topics.position, &position.to_string(), true)
                .await;
        }
        if let Some(attributes) = &update.attributes {
            self.publish(&self.topics.attributes, &attributes.to_string(), true)
                .await;
        }
        if let Some(battery) = update.battery {
            self.publish(&self.topics.battery_state, &battery.to_string(), true)
                .await;
        }
        if let Some(attributes) = &update.battery_attributes {
            self.publish(
                &self.topics.battery_attributes,
                &attributes.to_string(),
                true,
            )
            .await;
        }
    }

    async fn on_command_outcome(&self, success: bool) {
        let mut cover_online = self.cover_online.lock().await;
        if *cover_online == success {
            return;
        }

        let payload = if success {
            AVAILABILITY_ONLINE
        } else {
            AVAILABILITY_OFFLINE
        };

        // only record the flip once the broker has taken the payload,
        // otherwise the next outcome retries it
        if self
            .publish(&self.topics.cover_availability, payload, true)
            .await
        {
            *cover_online = success;
        }
    }
}

/// Routes one inbound message to the device session or the bridge's
/// own retained surface.
async fn handle_message(
    inner: &Arc<BridgeInner>,
    device: &Arc<CurtainDevice>,
    topic: &str,
    payload: &str,
) -> Result<()> {
    debug!("Inbound message on {topic}: {payload}");

    if topic == inner.topics.bridge_availability {
        if payload != AVAILABILITY_ONLINE {
            // someone overwrote the retained availability, put it back
            inner.publish_bridge_online().await;
        }
    } else if topic == inner.topics.set_command {
        match payload {
            COMMAND_OPEN => device.open().await,
            COMMAND_CLOSE => device.close().await,
            COMMAND_STOP => device.stop().await,
            other => debug!("Ignoring unknown command: {other}"),
        }
    } else if topic == inner.topics.set_position {
        let position: u8 = payload.trim().parse().map_err(|_| {
            CurtainError::BridgeParse(format!("invalid position payload: {payload:?}"))
        })?;
        device.move_to(position).await;
    } else {
        debug!("Message on unexpected topic {topic}");
    }

    Ok(())
}

async fn dispatch_loop(
    mut inbox: mpsc::UnboundedReceiver<(String, String)>,
    inner: Arc<BridgeInner>,
    device: Arc<CurtainDevice>,
) {
    while let Some((topic, payload)) = inbox.recv().await {
        if let Err(e) = handle_message(&inner, &device, &topic, &payload).await {
            warn!("Dropping message on {topic}: {e}");
        }
    }
}

/// Bridge between one SwitchBot Curtain and an MQTT broker.
///
/// The bridge wires a [`CurtainDevice`] session to a
/// [`MessagingClient`]: state changes and availability flow out as
/// retained publishes, Home Assistant commands flow in and are replayed
/// onto the device. Broker connectivity is maintained by two
/// maintenance loops that reconnect lazily whenever an operation
/// reports failure, mirroring how the device session itself never gives
/// up.
///
/// Two availability topics gate the Home Assistant entities: the bridge
/// testament flips when this process dies, and the cover availability
/// follows the stream of device command outcomes.
pub struct CurtainBridge {
    inner: Arc<BridgeInner>,
    device: Arc<CurtainDevice>,
    timing: BridgeTiming,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<(String, String)>>>,
}

impl CurtainBridge {
    /// Creates a bridge with default tuning.
    #[must_use]
    pub fn new(
        client: Arc<dyn MessagingClient>,
        transport: Arc<dyn CurtainTransport>,
        network: Arc<dyn NetworkMonitor>,
        settings: &BridgeSettings,
    ) -> Self {
        Self::with_tuning(
            client,
            transport,
            network,
            settings,
            ConnectionParams::default(),
            PollConfig::default(),
            BridgeTiming::default(),
        )
    }

    /// Creates a bridge with explicit tuning.
    #[must_use]
    pub fn with_tuning(
        client: Arc<dyn MessagingClient>,
        transport: Arc<dyn CurtainTransport>,
        network: Arc<dyn NetworkMonitor>,
        settings: &BridgeSettings,
        params: ConnectionParams,
        poll: PollConfig,
        timing: BridgeTiming,
    ) -> Self {
        let topics = TopicSet::new(
            &settings.discovery_prefix,
            &settings.base_prefix,
            &settings.client_id,
        );
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(BridgeInner {
            client,
            network,
            topics,
            client_id: settings.client_id.clone(),
            cover_online: Mutex::new(false),
            inbound_tx,
        });

        let device = Arc::new(CurtainDevice::with_tuning(
            transport,
            Arc::clone(&inner) as Arc<dyn SessionEvents>,
            settings.device.address.clone(),
            settings.device.inverted,
            params,
            poll,
        ));

        Self {
            inner,
            device,
            timing,
            inbox: Mutex::new(Some(inbound_rx)),
        }
    }

    /// Connects to the broker, subscribes the command topics and
    /// publishes the discovery configs.
    pub async fn connect(&self, clean_session: bool) {
        self.inner.connect(clean_session).await;
    }

    /// Handle to the underlying device session.
    #[must_use]
    pub fn device(&self) -> Arc<CurtainDevice> {
        Arc::clone(&self.device)
    }

    /// Runs the bridge: connects the device session, then services the
    /// broker until the process exits. This future never resolves under
    /// normal operation.
    pub async fn run(&self) {
        Arc::clone(&self.device).init().await;

        if let Some(inbox) = self.inbox.lock().await.take() {
            tokio::spawn(dispatch_loop(
                inbox,
                Arc::clone(&self.inner),
                Arc::clone(&self.device),
            ));
        }

        tokio::join!(self.ping_loop(), self.message_loop());
    }

    async fn ping_loop(&self) {
        loop {
            if self.inner.network.is_connected() {
                if let Err(e) = self.inner.client.ping().await {
                    warn!("Broker health check failed: {e}");
                    self.inner.connect(false).await;
                }
            }
            sleep(self.timing.ping_interval()).await;
        }
    }

    async fn message_loop(&self) {
        loop {
            if self.inner.network.is_connected() {
                if let Err(e) = self.inner.client.check_for_message().await {
                    warn!("Inbound message poll failed: {e}");
                    self.inner.connect(false).await;
                }
            }
            sleep(self.timing.message_poll_interval()).await;
        }
    }
}
