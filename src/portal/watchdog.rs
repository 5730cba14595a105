use crate::{network_backend::NetworkBackend, portal::Portal};
use log::{debug, info};
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::time::{Instant, interval};

const TICK: Duration = Duration::from_secs(1);

/// Idle timer reset by every request
#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    last_activity: Mutex<Instant>,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn reset(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn expired(&self) -> bool {
        self.last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
            >= self.timeout
    }

    /// Tick until the portal stops, harvesting test results and timing out idle sessions
    pub async fn run<B>(self: Arc<Self>, portal: Arc<Portal<B>>)
    where
        B: NetworkBackend + Send + Sync + 'static,
    {
        info!("watchdog started with {}s idle timeout", self.timeout.as_secs());

        let mut ticker = interval(TICK);

        loop {
            ticker.tick().await;
            portal.poll_test();

            if portal.is_stopped() {
                debug!("portal stopped, watchdog exits");
                break;
            }

            if self.expired() {
                portal.time_out();
                break;
            }
        }
    }
}
