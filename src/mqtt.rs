use crate::{
    config::MqttSettings,
    error::{CurtainError, Result},
};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, warn};

/// Callback invoked for each inbound message, with topic and payload.
pub type MessageCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Broker-facing operations the bridge needs.
///
/// The contract mirrors a polled MQTT client: `connect` tears down any
/// previous connection and builds a new one, inbound messages queue
/// until [`check_for_message`](MessagingClient::check_for_message)
/// drains them into the registered callback, and `ping` surfaces the
/// health of the connection so the bridge can decide to reconnect.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Establishes a fresh broker connection, replacing any previous
    /// one.
    ///
    /// # Errors
    ///
    /// Returns
    /// [`CurtainError::TransportUnavailable`](crate::CurtainError::TransportUnavailable)
    /// if the connection cannot be set up.
    async fn connect(&self, clean_session: bool) -> Result<()>;

    /// Registers the callback invoked for every inbound message.
    fn set_message_callback(&self, callback: MessageCallback);

    /// Stores the testament published by the broker if this client
    /// vanishes. Applied on the next `connect`.
    fn set_last_will(&self, topic: &str, payload: &str, retain: bool);

    /// Subscribes to a topic.
    ///
    /// # Errors
    ///
    /// Returns
    /// [`CurtainError::TransportUnavailable`](crate::CurtainError::TransportUnavailable)
    /// if the subscription cannot be queued.
    async fn subscribe(&self, topic: &str) -> Result<()>;

    /// Publishes a payload.
    ///
    /// # Errors
    ///
    /// Returns
    /// [`CurtainError::TransportUnavailable`](crate::CurtainError::TransportUnavailable)
    /// if the publish cannot be queued.
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()>;

    /// Checks connection health.
    ///
    /// # Errors
    ///
    /// Returns
    /// [`CurtainError::TransportUnavailable`](crate::CurtainError::TransportUnavailable)
    /// if the connection has failed since the last check.
    async fn ping(&self) -> Result<()>;

    /// Drains queued inbound messages into the registered callback.
    ///
    /// # Errors
    ///
    /// Returns
    /// [`CurtainError::TransportUnavailable`](crate::CurtainError::TransportUnavailable)
    /// if the connection has failed and must be rebuilt.
    async fn check_for_message(&self) -> Result<()>;
}

struct StoredWill {
    topic: String,
    payload: String,
    retain: bool,
}

/// One live broker connection: the client half plus the queue fed by
/// its event loop task.
struct Connection {
    client: AsyncClient,
    inbound: mpsc::UnboundedReceiver<(String, String)>,
    poll_error: Arc<StdMutex<Option<String>>>,
    poll_task: JoinHandle<()>,
}

/// [`MessagingClient`] backed by rumqttc.
///
/// Each `connect` spawns a task that drives the rumqttc event loop,
/// queueing publishes it receives and parking the first connection
/// error for `ping` and `check_for_message` to report.
pub struct RumqttcClient {
    settings: MqttSettings,
    client_id: String,
    connection: Mutex<Option<Connection>>,
    callback: StdMutex<Option<MessageCallback>>,
    last_will: StdMutex<Option<StoredWill>>,
}

impl RumqttcClient {
    /// Creates an unconnected client. `client_id` identifies this
    /// bridge to the broker.
    #[must_use]
    pub fn new(settings: MqttSettings, client_id: String) -> Self {
        Self {
            settings,
            client_id,
            connection: Mutex::new(None),
            callback: StdMutex::new(None),
            last_will: StdMutex::new(None),
        }
    }

    fn build_options(&self, clean_session: bool) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.client_id.clone(),
            self.settings.host.clone(),
            self.settings.port,
        );
        options.set_keep_alive(self.settings.keep_alive());
        options.set_clean_session(clean_session);

        if let (Some(username), Some(password)) =
            (&self.settings.username, &self.settings.password)
        {
            options.set_credentials(username.clone(), password.clone());
        }

        if let Ok(will) = self.last_will.lock() {
            if let Some(will) = will.as_ref() {
                options.set_last_will(LastWill::new(
                    &will.topic,
                    will.payload.as_bytes().to_vec(),
                    QoS::AtLeastOnce,
                    will.retain,
                ));
            }
        }

        options
    }
}

#[async_trait]
impl MessagingClient for RumqttcClient {
    async fn connect(&self, clean_session: bool) -> Result<()> {
        let options = self.build_options(clean_session);
        let (client, event_loop) = AsyncClient::new(options, 10);

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let poll_error = Arc::new(StdMutex::new(None));
        let poll_task = tokio::spawn(drive_event_loop(
            event_loop,
            inbound_tx,
            Arc::clone(&poll_error),
        ));

        let mut connection = self.connection.lock().await;
        if let Some(old) = connection.take() {
            old.poll_task.abort();
        }
        *connection = Some(Connection {
            client,
            inbound: inbound_rx,
            poll_error,
            poll_task,
        });

        debug!(
            "Messaging client connecting to {}:{}",
            self.settings.host, self.settings.port
        );
        Ok(())
    }

    fn set_message_callback(&self, callback: MessageCallback) {
        if let Ok(mut slot) = self.callback.lock() {
            *slot = Some(callback);
        }
    }

    fn set_last_will(&self, topic: &str, payload: &str, retain: bool) {
        if let Ok(mut slot) = self.last_will.lock() {
            *slot = Some(StoredWill {
                topic: topic.to_string(),
                payload: payload.to_string(),
                retain,
            });
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        let connection = self.connection.lock().await;
        let Some(connection) = connection.as_ref() else {
            return Err(CurtainError::TransportUnavailable(
                "not connected".to_string(),
            ));
        };

        connection
            .client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| CurtainError::TransportUnavailable(e.to_string()))
    }

    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
        let connection = self.connection.lock().await;
        let Some(connection) = connection.as_ref() else {
            return Err(CurtainError::TransportUnavailable(
                "not connected".to_string(),
            ));
        };

        connection
            .client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|e| CurtainError::TransportUnavailable(e.to_string()))
    }

    async fn ping(&self) -> Result<()> {
        let connection = self.connection.lock().await;
        let Some(connection) = connection.as_ref() else {
            return Err(CurtainError::TransportUnavailable(
                "not connected".to_string(),
            ));
        };

        if let Ok(mut error) = connection.poll_error.lock() {
            if let Some(error) = error.take() {
                return Err(CurtainError::TransportUnavailable(error));
            }
        }

        if connection.poll_task.is_finished() {
            return Err(CurtainError::TransportUnavailable(
                "event loop task exited".to_string(),
            ));
        }

        Ok(())
    }

    async fn check_for_message(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        let Some(connection) = connection.as_mut() else {
            return Err(CurtainError::TransportUnavailable(
                "not connected".to_string(),
            ));
        };

        let callback = self.callback.lock().map(|slot| slot.clone()).ok().flatten();
        while let Ok((topic, payload)) = connection.inbound.try_recv() {
            if let Some(callback) = &callback {
                callback(&topic, &payload);
            }
        }

        if let Ok(mut error) = connection.poll_error.lock() {
            if let Some(error) = error.take() {
                return Err(CurtainError::TransportUnavailable(error));
            }
        }

        Ok(())
    }
}

/// Drives a rumqttc event loop until it fails, forwarding publishes
/// into the inbound queue. The protocol keepalive is serviced by the
/// polling itself.
async fn drive_event_loop(
    mut event_loop: EventLoop,
    inbound: mpsc::UnboundedSender<(String, String)>,
    poll_error: Arc<StdMutex<Option<String>>>,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let payload = String::from_utf8_lossy(&publish.payload).to_string();
                if inbound.send((publish.topic, payload)).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Messaging event loop failed: {e}");
                if let Ok(mut slot) = poll_error.lock() {
                    *slot = Some(e.to_string());
                }
                break;
            }
        }
    }
}
