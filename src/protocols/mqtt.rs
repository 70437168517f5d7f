use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use color_eyre::Result;
use eyre::eyre;
use log::debug;
use rand::Rng;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::{
    sync::{watch, Notify},
    task::{self, JoinHandle},
};

use crate::{
    connection::{ConnectionState, ConnectionTracker},
    settings::BridgeSettings,
    shutdown::Shutdown,
};

pub const RETRY_DELAY: Duration = Duration::from_secs(3);
const KEEP_ALIVE: Duration = Duration::from_secs(120);
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);
const PUBLISH_WAIT: Duration = Duration::from_secs(2);

/// Where device commands go. Implemented by [`MqttClient`], and by a
/// recording fake in tests.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Waits at most `timeout` for a live session, nudging a pending reconnect.
    async fn wait_connected(&self, timeout: Duration) -> bool;

    /// Fire-and-forget publish. Only waits for room in the outgoing queue,
    /// never for an acknowledgement from the broker.
    async fn publish(&self, topic: &str, payload: String) -> Result<()>;
}

#[derive(Clone)]
pub struct MqttClient {
    pub client: AsyncClient,
    state: watch::Receiver<ConnectionState>,
    reconnect: Arc<Notify>,
}

impl MqttClient {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

/// Builds the broker client and spawns the task driving its event loop.
///
/// The event loop owns the session: a failed poll marks the link as
/// disconnected and polling resumes (which reconnects) after
/// [`RETRY_DELAY`], or earlier if a publisher asks for the broker via
/// [`Broker::wait_connected`].
pub fn mk_mqtt_client(
    settings: &BridgeSettings,
    shutdown: Shutdown,
) -> (MqttClient, JoinHandle<()>) {
    let client_id = settings.mqtt_client_id.clone().unwrap_or_else(|| {
        format!("hyperion_bridge_{}", rand::thread_rng().gen_range(1000..10000))
    });

    let mut options =
        MqttOptions::new(client_id, settings.mqtt_broker.clone(), settings.mqtt_port);
    options.set_keep_alive(KEEP_ALIVE);

    if !settings.mqtt_username.is_empty() {
        options.set_credentials(
            settings.mqtt_username.clone(),
            settings.mqtt_password.clone(),
        );
    }

    let (client, eventloop) = AsyncClient::new(options, 10);

    let tracker = ConnectionTracker::new("MQTT");
    let reconnect = Arc::new(Notify::new());

    let mqtt_client = MqttClient {
        client: client.clone(),
        state: tracker.subscribe(),
        reconnect: reconnect.clone(),
    };

    let target = format!("{}:{}", settings.mqtt_broker, settings.mqtt_port);
    let handle = task::spawn(run_eventloop(
        client, eventloop, tracker, target, reconnect, RETRY_DELAY, shutdown,
    ));

    (mqtt_client, handle)
}

async fn run_eventloop(
    client: AsyncClient,
    mut eventloop: rumqttc::EventLoop,
    tracker: ConnectionTracker,
    target: String,
    reconnect: Arc<Notify>,
    retry_delay: Duration,
    mut shutdown: Shutdown,
) {
    tracker.connecting(&target);

    loop {
        let notification = tokio::select! {
            _ = shutdown.wait() => break,
            notification = eventloop.poll() => notification,
        };

        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => tracker.connected(&target),
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracker.disconnected("broker sent disconnect")
            }
            Ok(_) => {}
            Err(e) => {
                tracker.disconnected(e);

                let stop = tokio::select! {
                    stop = shutdown.sleep(retry_delay) => stop,
                    _ = reconnect.notified() => false,
                };

                if stop {
                    break;
                }

                tracker.connecting(&target);
            }
        }
    }

    if tracker.state() == ConnectionState::Connected {
        // Let the event loop flush a clean DISCONNECT before dropping it
        if client.try_disconnect().is_ok() {
            let _ = tokio::time::timeout(DISCONNECT_GRACE, async {
                while let Ok(notification) = eventloop.poll().await {
                    if let Event::Outgoing(rumqttc::Outgoing::Disconnect) = notification {
                        break;
                    }
                }
            })
            .await;
        }
    }

    debug!("[MQTT] Event loop stopped");
}

#[async_trait]
impl Broker for MqttClient {
    async fn wait_connected(&self, timeout: Duration) -> bool {
        if self.state() == ConnectionState::Connected {
            return true;
        }

        // Wake only a loop parked in its retry wait, never leave a stored permit
        if self.state() == ConnectionState::Disconnected {
            self.reconnect.notify_one();
        }

        let mut state = self.state.clone();
        let connected = tokio::time::timeout(
            timeout,
            state.wait_for(|state| *state == ConnectionState::Connected),
        )
        .await;

        matches!(connected, Ok(Ok(_)))
    }

    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        // Waits for the event loop to drain the bounded request queue
        tokio::time::timeout(
            PUBLISH_WAIT,
            self.client.publish(topic, QoS::AtMostOnce, false, payload),
        )
        .await
        .map_err(|_| eyre!("Timed out queueing publish to {}", topic))??;

        Ok(())
    }
}
