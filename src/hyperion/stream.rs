use std::{sync::Arc, time::Duration};

use color_eyre::Result;
use eyre::eyre;
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::{sync::watch, task::JoinHandle};
use tokio_tungstenite::tungstenite::Message;

use crate::{
    color::ColorSample,
    connection::ConnectionTracker,
    protocols::websocket::mk_websocket_stream,
    settings::SettingsStore,
    shutdown::Shutdown,
};

use super::frame::decode_frame;

pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Keeps a websocket session to Hyperion alive and publishes the average color
/// of every LED stream update on `samples`.
///
/// The endpoint is read from the current settings on every connect attempt.
/// Any error or close drops back to disconnected and the whole connect
/// sequence is retried after `reconnect_delay`, until `shutdown` fires.
pub fn start_hyperion_stream_loop(
    settings: Arc<SettingsStore>,
    samples: watch::Sender<Option<ColorSample>>,
    reconnect_delay: Duration,
    mut shutdown: Shutdown,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let tracker = ConnectionTracker::new("Hyperion");

        while !shutdown.is_triggered() {
            let url = settings.current().hyperion_url.clone();

            match run_session(&url, &tracker, &samples, &mut shutdown).await {
                Ok(()) => tracker.disconnected("stream closed"),
                Err(e) => tracker.disconnected(e),
            }

            if shutdown.sleep(reconnect_delay).await {
                break;
            }
        }

        debug!("[Hyperion] Stream loop stopped");
    })
}

async fn run_session(
    url: &str,
    tracker: &ConnectionTracker,
    samples: &watch::Sender<Option<ColorSample>>,
    shutdown: &mut Shutdown,
) -> Result<()> {
    tracker.connecting(url);

    let mut ws = tokio::select! {
        _ = shutdown.wait() => return Ok(()),
        ws = mk_websocket_stream(url) => ws?,
    };

    tracker.connected(url);

    let mut dropped = DroppedFrames::default();

    loop {
        let message = tokio::select! {
            _ = shutdown.wait() => {
                let _ = ws.close(None).await;
                return Ok(());
            }
            message = ws.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => handle_frame(&text, samples, &mut dropped),
            Some(Ok(Message::Close(frame))) => {
                return Err(eyre!("Closed by Hyperion: {:?}", frame));
            }
            // Pings are answered by tungstenite itself
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(()),
        }
    }
}

/// Counts consecutive malformed frames so a broken stream warns once per run
/// instead of once per frame.
#[derive(Debug, Default)]
struct DroppedFrames {
    consecutive: usize,
}

impl DroppedFrames {
    /// Returns true for the first bad frame of a run.
    fn record(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive == 1
    }

    /// Ends the current run, returning how many frames it dropped.
    fn reset(&mut self) -> usize {
        std::mem::take(&mut self.consecutive)
    }
}

fn handle_frame(
    text: &str,
    samples: &watch::Sender<Option<ColorSample>>,
    dropped: &mut DroppedFrames,
) {
    match decode_frame(text) {
        Ok(Some(sample)) => {
            let run = dropped.reset();
            if run > 1 {
                debug!("[Hyperion] Stream recovered after {} malformed frames", run);
            }
            samples.send_replace(Some(sample));
        }
        Ok(None) => debug!("[Hyperion] Ignoring message: {}", text),
        Err(e) if dropped.record() => warn!("[Hyperion] Dropping malformed frame: {}", e),
        Err(e) => debug!("[Hyperion] Dropping malformed frame: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;
    use crate::shutdown::shutdown_channel;

    const FRAME: &str =
        r#"{"command":"ledcolors-ledstream-update","data":{"leds":[255,0,0,255,0,0]}}"#;

    async fn settings_for(url: &str) -> (tempfile::NamedTempFile, Arc<SettingsStore>) {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{ "hyperion_url": "{url}" }}"#).unwrap();
        file.flush().unwrap();
        let store = Arc::new(SettingsStore::open(file.path()).await);
        (file, store)
    }

    async fn next_sample(rx: &mut watch::Receiver<Option<ColorSample>>) -> ColorSample {
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("no sample within 5s")
            .unwrap();
        (*rx.borrow_and_update()).expect("sample")
    }

    #[tokio::test]
    async fn subscribes_and_decodes_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/json-rpc", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(socket).await.unwrap();

            let subscribe = ws.next().await.unwrap().unwrap();
            assert_eq!(
                subscribe,
                Message::Text(r#"{"command":"ledcolors","subcommand":"ledstream-start"}"#.into())
            );

            ws.send(Message::Text(r#"{"command":"ledcolors","success":true}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text("garbage".into())).await.unwrap();
            ws.send(Message::Text(FRAME.into())).await.unwrap();

            // Hold the connection open until the client goes away
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (_file, settings) = settings_for(&url).await;
        let (trigger, shutdown) = shutdown_channel();
        let (tx, mut rx) = watch::channel(None);

        let stream = start_hyperion_stream_loop(settings, tx, Duration::from_millis(10), shutdown);

        assert_eq!(next_sample(&mut rx).await, ColorSample::new(255, 0, 0));

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(5), stream)
            .await
            .unwrap()
            .unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn reconnects_after_server_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/json-rpc", listener.local_addr().unwrap());

        tokio::spawn(async move {
            for leds in ["[10,20,30]", "[40,50,60]"] {
                let (socket, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(socket).await.unwrap();
                let _subscribe = ws.next().await;

                let frame = format!(
                    r#"{{"command":"ledcolors-ledstream-update","data":{{"leds":{leds}}}}}"#
                );
                ws.send(Message::Text(frame)).await.unwrap();
                let _ = ws.close(None).await;
            }
        });

        let (_file, settings) = settings_for(&url).await;
        let (trigger, shutdown) = shutdown_channel();
        let (tx, mut rx) = watch::channel(None);

        let stream = start_hyperion_stream_loop(settings, tx, Duration::from_millis(200), shutdown);

        assert_eq!(next_sample(&mut rx).await, ColorSample::new(10, 20, 30));
        assert_eq!(next_sample(&mut rx).await, ColorSample::new(40, 50, 60));

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(5), stream)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn unreachable_endpoint_retries_until_shutdown() {
        // Grab a free port, then close it so connects are refused
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/json-rpc", listener.local_addr().unwrap());
        drop(listener);

        let (_file, settings) = settings_for(&url).await;
        let (trigger, shutdown) = shutdown_channel();
        let (tx, rx) = watch::channel(None);

        let stream = start_hyperion_stream_loop(settings, tx, Duration::from_millis(10), shutdown);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!stream.is_finished());
        assert_eq!(*rx.borrow(), None);

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(5), stream)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn malformed_frames_warn_once_per_run() {
        let (tx, rx) = watch::channel(None);
        let mut dropped = DroppedFrames::default();

        handle_frame("garbage", &tx, &mut dropped);
        assert_eq!(dropped.consecutive, 1);
        assert!(!dropped.record());

        handle_frame("more garbage", &tx, &mut dropped);
        assert_eq!(dropped.consecutive, 3);
        assert!(rx.borrow().is_none());

        // A good frame closes the run and the next bad one warns again
        handle_frame(FRAME, &tx, &mut dropped);
        assert_eq!(dropped.consecutive, 0);
        assert_eq!(*rx.borrow(), Some(ColorSample::new(255, 0, 0)));
        assert!(dropped.record());
    }

    #[test]
    fn ignored_messages_do_not_break_a_run() {
        let (tx, _rx) = watch::channel(None);
        let mut dropped = DroppedFrames::default();

        handle_frame("garbage", &tx, &mut dropped);
        handle_frame(r#"{"command":"ledcolors","success":true}"#, &tx, &mut dropped);
        handle_frame("garbage", &tx, &mut dropped);

        assert_eq!(dropped.consecutive, 2);
    }
}
