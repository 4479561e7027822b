#![allow(unused_crate_dependencies, clippy::panic)]

use std::{sync::OnceLock, time::Duration};

use graphql_subscription_client::SubscriptionEvent;
use tokio::{runtime::Runtime, sync::mpsc};

#[ctor::ctor]
fn setup_logging() {
    let filter = tracing_subscriber::filter::EnvFilter::builder()
        .parse(std::env::var("RUST_LOG").unwrap_or("graphql_subscription_client=debug".to_string()))
        .unwrap();
    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .without_time()
        .init();
}

pub fn runtime() -> &'static Runtime {
    static RUNTIME: OnceLock<Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    })
}

const TIMEOUT: Duration = Duration::from_secs(5);

/// Collects the events a subscription callback receives.
pub struct EventRecorder {
    events: mpsc::UnboundedReceiver<SubscriptionEvent>,
}

impl EventRecorder {
    /// The recorder and the callback feeding it.
    pub fn new() -> (Self, impl FnMut(SubscriptionEvent) + Send + 'static) {
        let (sender, events) = mpsc::unbounded_channel();
        let callback = move |event| {
            sender.send(event).ok();
        };

        (EventRecorder { events }, callback)
    }

    /// Waits for the next event, panicking if none arrives in time.
    pub async fn next(&mut self) -> SubscriptionEvent {
        tokio::time::timeout(TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for a subscription event")
            .expect("the subscription callback was dropped")
    }

    /// Waits until the callback has been dropped, returning every event it still received.
    pub async fn finished(mut self) -> Vec<SubscriptionEvent> {
        let mut events = Vec::new();

        loop {
            match tokio::time::timeout(TIMEOUT, self.events.recv()).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => return events,
                Err(_) => panic!("timed out waiting for the subscription to end"),
            }
        }
    }

    /// Everything received so far, without waiting.
    pub fn drain(&mut self) -> Vec<SubscriptionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Awaits `future`, panicking if it takes longer than a few seconds.
pub async fn with_timeout<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(TIMEOUT, future)
        .await
        .expect("timed out")
}
