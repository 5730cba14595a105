//! Status LED flashing Morse-like sequences so the user can follow the
//! portal without a screen.

use log::{debug, info};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::watch, time::sleep};

const DIT: Duration = Duration::from_millis(200);
const DAH: Duration = Duration::from_millis(500);
const GAP: Duration = Duration::from_millis(300);
const PAUSE: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedSequence {
    AccessPointOff,
    AccessPointOn,
    Testing,
    ResultGood,
    ResultBad,
    Cleanup,
    Dark,
}

impl LedSequence {
    pub fn pattern(self) -> &'static str {
        match self {
            LedSequence::AccessPointOff => "----",
            LedSequence::AccessPointOn => "-.--",
            LedSequence::Testing => "--.-",
            LedSequence::ResultGood => "....",
            LedSequence::ResultBad => "---.",
            LedSequence::Cleanup => "...-",
            LedSequence::Dark => "",
        }
    }
}

/// Handle to the LED flasher task
#[derive(Clone)]
pub struct StatusLed {
    tx: Arc<watch::Sender<LedSequence>>,
}

impl StatusLed {
    /// An LED that only records the requested sequence
    pub fn disabled() -> Self {
        let (tx, _) = watch::channel(LedSequence::Dark);
        Self { tx: Arc::new(tx) }
    }

    /// Start flashing the LED behind `path`, disabled if the file is missing
    pub fn spawn(path: &Path) -> Self {
        if !path.exists() {
            info!("status LED {path:?} not found, LED disabled");
            return Self::disabled();
        }

        let (tx, rx) = watch::channel(LedSequence::Dark);
        tokio::spawn(flash(path.to_path_buf(), rx));

        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, sequence: LedSequence) {
        info!("set LED flash sequence: \"{}\"", sequence.pattern());
        self.tx.send_replace(sequence);
    }

    pub fn current(&self) -> LedSequence {
        *self.tx.borrow()
    }
}

async fn flash(path: PathBuf, mut rx: watch::Receiver<LedSequence>) {
    loop {
        let pattern = rx.borrow_and_update().pattern();

        if pattern.is_empty() {
            write_brightness(&path, false);
            if rx.changed().await.is_err() {
                break;
            }
            continue;
        }

        for symbol in pattern.chars() {
            write_brightness(&path, true);
            sleep(if symbol == '.' { DIT } else { DAH }).await;
            write_brightness(&path, false);
            sleep(GAP).await;
        }

        sleep(PAUSE).await;

        if rx.has_changed().is_err() {
            break;
        }
    }

    write_brightness(&path, false);
    debug!("LED flasher stopped");
}

fn write_brightness(path: &Path, on: bool) {
    if let Err(e) = fs::write(path, if on { "1" } else { "0" }) {
        debug!("failed to write LED brightness {path:?}: {e}");
    }
}
