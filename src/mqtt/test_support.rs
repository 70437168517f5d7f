use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use color_eyre::Result;
use eyre::eyre;

use crate::{
    protocols::mqtt::Broker,
    settings::{Device, DeviceKind},
};

/// Records what would have been published instead of talking to a broker.
#[derive(Debug, Default)]
pub struct FakeBroker {
    connected: AtomicBool,
    connect_attempts: AtomicUsize,
    failing_topics: Vec<String>,
    published: Mutex<Vec<(String, String)>>,
}

impl FakeBroker {
    pub fn connected() -> Self {
        let broker = Self::default();
        broker.set_connected(true);
        broker
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, topic: &str) -> Self {
        self.failing_topics.push(topic.to_string());
        self
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn wait_connected(&self, _timeout: Duration) -> bool {
        let connected = self.connected.load(Ordering::SeqCst);
        if !connected {
            self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        }
        connected
    }

    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        if self.failing_topics.iter().any(|failing| failing == topic) {
            return Err(eyre!("publish to {} rejected", topic));
        }

        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));

        Ok(())
    }
}

pub fn device(name: &str, brightness_multiplier: f64) -> Device {
    Device {
        name: name.to_string(),
        topic: format!("zigbee2mqtt/{name}/set"),
        kind: DeviceKind::Rgb,
        enabled: true,
        brightness_multiplier,
    }
}
