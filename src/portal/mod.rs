//! Onboarding workflow state machine.
//!
//! [`Portal`] owns the session of one run. Every operation takes the session
//! lock, harvests a finished connectivity test and answers with a [`View`].
//! The lock is never held across an await.

pub mod connectivity;
pub mod session;
pub mod watchdog;

use crate::{
    network_backend::NetworkBackend,
    pages::{ResultSummary, View},
    services::{
        led::{LedSequence, StatusLed},
        localization::LocalizationService,
        settings::{Credentials, SettingsValidator},
    },
};
use log::{debug, error, info, warn};
use session::{ExitStatus, SessionState, WorkflowPhase};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::{broadcast, oneshot};

pub const TEST_IN_PROGRESS_PATH: &str = "/testinprogress";
pub const CHECK_RESULT_PATH: &str = "/checkresult";

pub struct Portal<B> {
    backend: Arc<B>,
    validator: SettingsValidator,
    localization: LocalizationService,
    led: StatusLed,
    state: Mutex<SessionState>,
    stop_tx: broadcast::Sender<()>,
}

impl<B> Portal<B>
where
    B: NetworkBackend + Send + Sync + 'static,
{
    pub fn new(
        backend: Arc<B>,
        validator: SettingsValidator,
        localization: LocalizationService,
        led: StatusLed,
        retries: u32,
    ) -> Self {
        let (stop_tx, _) = broadcast::channel(1);

        Self {
            backend,
            validator,
            localization,
            led,
            state: Mutex::new(SessionState::new(retries)),
            stop_tx,
        }
    }

    /// Receiver notified once the portal stops
    pub fn subscribe_stop(&self) -> broadcast::Receiver<()> {
        self.stop_tx.subscribe()
    }

    pub fn phase(&self) -> WorkflowPhase {
        self.state().phase()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.state().exit_status()
    }

    pub fn retries_remaining(&self) -> u32 {
        self.state().retries_remaining
    }

    pub fn is_stopped(&self) -> bool {
        self.state().is_stopped()
    }

    /// Greeting page, doubles as restart after a failed result
    pub fn greet(&self) -> View {
        let mut state = self.state();
        self.harvest(&mut state);

        if state.is_stopped() {
            return View::Closed;
        }

        self.restart_after_failure(&mut state);

        if state.phase() == WorkflowPhase::NotStarted {
            state.advance(WorkflowPhase::AwaitingForm);
        }

        View::Greeting
    }

    /// Input form, optionally listing the SSIDs in range
    pub async fn web_form(&self, find_ssids: bool) -> View {
        {
            let mut state = self.state();
            self.harvest(&mut state);

            if state.is_stopped() {
                return View::Closed;
            }

            self.restart_after_failure(&mut state);

            match state.phase() {
                WorkflowPhase::NotStarted => {
                    state.advance(WorkflowPhase::AwaitingForm);
                }
                WorkflowPhase::AwaitingForm => {}
                WorkflowPhase::FormSubmitted | WorkflowPhase::Testing => {
                    return View::Redirect(TEST_IN_PROGRESS_PATH);
                }
                WorkflowPhase::ResultReady => return View::Redirect(CHECK_RESULT_PATH),
                WorkflowPhase::GaveUp | WorkflowPhase::TimedOut => return View::Closed,
            }
        }

        let ssids = if find_ssids {
            self.backend
                .list_visible_ssids()
                .await
                .unwrap_or_else(|e| {
                    error!("failed to list visible ssids: {e:#}");
                    Vec::new()
                })
        } else {
            Vec::new()
        };

        View::WebForm { ssids }
    }

    /// Validate a form submission and start testing or writing it
    pub async fn submit(&self, params: &HashMap<String, String>) -> View {
        let credentials = {
            let mut state = self.state();
            self.harvest(&mut state);

            if state.is_stopped() {
                return View::Closed;
            }

            match state.phase() {
                WorkflowPhase::AwaitingForm => {}
                WorkflowPhase::FormSubmitted | WorkflowPhase::Testing => {
                    warn!("configuration test already in progress, ignore submission");
                    return View::Redirect(TEST_IN_PROGRESS_PATH);
                }
                phase => {
                    info!("form submitted in phase {phase:?}");
                    return View::NotStarted;
                }
            }

            let credentials = match self.validator.validate(params) {
                Ok(credentials) => credentials,
                Err(errors) => {
                    info!("form submission rejected: {errors}");
                    return View::ValidationFailed(errors);
                }
            };

            state.advance(WorkflowPhase::FormSubmitted);
            state.credentials = Some(credentials.clone());
            credentials
        };

        if credentials.validate {
            self.start_test(credentials)
        } else {
            self.write_without_test(credentials).await
        }
    }

    pub fn test_in_progress(&self) -> View {
        self.poll_test();
        View::TestInProgress
    }

    /// Report the connectivity result and apply the retry policy
    pub fn check_result(&self) -> View {
        let mut state = self.state();
        self.harvest(&mut state);

        if state.is_stopped() {
            return View::Closed;
        }

        match state.phase() {
            WorkflowPhase::NotStarted | WorkflowPhase::AwaitingForm => {
                debug!("result requested before form was submitted");
                View::NotStarted
            }
            WorkflowPhase::FormSubmitted | WorkflowPhase::Testing => {
                debug!("result requested before test finished");
                View::StillTesting
            }
            WorkflowPhase::ResultReady => self.evaluate(&mut state),
            WorkflowPhase::GaveUp | WorkflowPhase::TimedOut => View::Closed,
        }
    }

    /// Cancel the workflow on user request
    pub fn give_up(&self) -> View {
        let mut state = self.state();

        if state.is_stopped() {
            return View::Closed;
        }

        info!("received manual give up");
        state.advance(WorkflowPhase::GaveUp);
        self.stop(&mut state, ExitStatus::UserCancelled);
        self.led.set(LedSequence::Cleanup);

        View::GaveUp
    }

    /// Abort the workflow because the user went idle
    pub fn time_out(&self) {
        let mut state = self.state();

        if state.is_stopped() {
            return;
        }

        warn!("idle timeout, stop captive portal");
        state.advance(WorkflowPhase::TimedOut);
        self.stop(&mut state, ExitStatus::TimedOut);
        self.led.set(LedSequence::Cleanup);
    }

    /// Stop with `status` unless an exit status is already final, return the final one
    pub fn finish(&self, status: ExitStatus) -> ExitStatus {
        let mut state = self.state();
        self.stop(&mut state, status);
        state.exit_status().unwrap_or(status)
    }

    /// Pick up the result of a finished connectivity test
    pub fn poll_test(&self) {
        let mut state = self.state();
        self.harvest(&mut state);
    }

    fn start_test(&self, credentials: Credentials) -> View {
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.state();
            if state.is_stopped() {
                return View::Closed;
            }
            if !state.start_test(rx) {
                return View::Redirect(TEST_IN_PROGRESS_PATH);
            }
            state.advance(WorkflowPhase::Testing);
        }

        info!("start connectivity test for ssid {}", credentials.ssid);
        self.led.set(LedSequence::Testing);

        tokio::spawn(connectivity::run(
            self.backend.clone(),
            self.localization.clone(),
            credentials,
            tx,
        ));

        View::Redirect(TEST_IN_PROGRESS_PATH)
    }

    async fn write_without_test(&self, credentials: Credentials) -> View {
        info!("write WiFi configuration without validation");

        if let Err(e) = self.backend.write_station_config(credentials.clone()).await {
            error!("failed to write station configuration: {e:#}");
        }
        if let Err(e) = self.localization.apply(&credentials.localization).await {
            error!("failed to apply localization settings: {e:#}");
        }

        let mut state = self.state();
        if state.advance(WorkflowPhase::ResultReady) {
            state.last_outcome = Some(ExitStatus::NotValidated);
            self.led.set(LedSequence::ResultGood);
        }
        self.stop(&mut state, ExitStatus::NotValidated);

        View::NotValidated
    }

    fn evaluate(&self, state: &mut SessionState) -> View {
        let connectivity = state.connectivity.clone().unwrap_or_default();
        let (ssid, check_internet) = state
            .credentials
            .as_ref()
            .map(|c| (c.ssid.clone(), c.check_internet))
            .unwrap_or_default();

        let outcome = connectivity.outcome(check_internet);
        state.last_outcome = Some(outcome);

        let mut offer_restart = false;

        if outcome.is_failure() {
            state.retries_remaining = state.retries_remaining.saturating_sub(1);
            info!(
                "unsatisfactory result {outcome:?}, {} retries left",
                state.retries_remaining
            );

            if state.retries_remaining == 0 {
                warn!("no retries left");
                self.stop(state, outcome);
            } else {
                offer_restart = true;
            }
        } else {
            info!("configuration result {outcome:?}");
            self.stop(state, outcome);
        }

        View::Result(ResultSummary {
            ssid,
            obtained_ip: connectivity.obtained_ip,
            internet_check_requested: check_internet,
            internet_reachable: connectivity.internet_reachable,
            offer_restart,
        })
    }

    fn harvest(&self, state: &mut SessionState) {
        if !state.poll_test() {
            return;
        }

        match Self::outcome(state) {
            Some(outcome) if !outcome.is_failure() => self.led.set(LedSequence::ResultGood),
            Some(_) => self.led.set(LedSequence::ResultBad),
            None => {}
        }
    }

    /// Reset a failed result so the form can be filled in again
    fn restart_after_failure(&self, state: &mut SessionState) {
        if state.phase() == WorkflowPhase::ResultReady
            && Self::outcome(state).is_some_and(ExitStatus::is_failure)
        {
            info!("restart requested");
            if state.restart() {
                self.led.set(LedSequence::AccessPointOn);
            }
        }
    }

    fn outcome(state: &SessionState) -> Option<ExitStatus> {
        let check_internet = state.credentials.as_ref()?.check_internet;
        Some(state.connectivity.as_ref()?.outcome(check_internet))
    }

    fn stop(&self, state: &mut SessionState, status: ExitStatus) {
        if !state.finalize(status) {
            return;
        }

        info!("stop captive portal with exit status {}", status.code());

        if self.stop_tx.send(()).is_err() {
            debug!("nobody listens for the stop signal");
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
