use std::sync::Arc;

use log::debug;
use tokio::{sync::watch, task::JoinHandle, time::Instant};

use crate::{
    color::{process_sample, ColorSample},
    mqtt::fan_out::fan_out,
    protocols::mqtt::Broker,
    settings::SettingsStore,
    shutdown::Shutdown,
    throttle::ThrottleGate,
};

/// Turns upstream color samples into throttled device commands.
pub struct Bridge<B: ?Sized> {
    settings: Arc<SettingsStore>,
    gate: Arc<ThrottleGate>,
    broker: Arc<B>,
}

impl<B: Broker + ?Sized + 'static> Bridge<B> {
    pub fn new(settings: Arc<SettingsStore>, broker: Arc<B>) -> Self {
        Bridge {
            settings,
            gate: Arc::new(ThrottleGate::new()),
            broker,
        }
    }

    /// Processes one sample received at `now`.
    ///
    /// If the throttle gate lets it through, the fan-out runs on its own task
    /// so a slow broker never holds up the upstream feed; the handle of that
    /// task is returned. Samples the gate rejects are dropped, never queued.
    pub async fn handle_sample(
        &self,
        sample: ColorSample,
        now: Instant,
    ) -> Option<JoinHandle<()>> {
        let settings = self.settings.refresh().await;
        let point = process_sample(sample, settings.color_warmth);

        if point.is_degenerate() {
            debug!("Dropping black frame");
            return None;
        }

        if !self.gate.should_publish(now, settings.throttle_interval()) {
            return None;
        }

        let gate = self.gate.clone();
        let broker = self.broker.clone();

        Some(tokio::spawn(async move {
            let published = fan_out(broker.as_ref(), &settings, &point).await;

            if published > 0 {
                debug!(
                    "Published x={} y={} (brightness {}) to {} device(s)",
                    point.x, point.y, point.brightness, published
                );
                gate.confirm(now);
            } else {
                gate.release();
            }
        }))
    }

    /// Handles every new sample until shutdown or until the upstream side
    /// goes away.
    pub async fn run(
        self,
        mut samples: watch::Receiver<Option<ColorSample>>,
        mut shutdown: Shutdown,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                changed = samples.changed() => {
                    if changed.is_err() {
                        break;
                    }

                    let sample = *samples.borrow_and_update();

                    if let Some(sample) = sample {
                        self.handle_sample(sample, Instant::now()).await;
                    }
                }
            }
        }

        debug!("Bridge loop stopped");
    }
}
