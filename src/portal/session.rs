use crate::services::settings::Credentials;
use log::{debug, info, warn};
use std::net::Ipv4Addr;
use tokio::sync::oneshot::{self, error::TryRecvError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowPhase {
    NotStarted,
    AwaitingForm,
    FormSubmitted,
    Testing,
    ResultReady,
    GaveUp,
    TimedOut,
}

impl WorkflowPhase {
    /// Whether the workflow may move from `self` to `next`
    pub fn can_advance_to(self, next: WorkflowPhase) -> bool {
        use WorkflowPhase::*;

        match (self, next) {
            (GaveUp | TimedOut, _) => false,
            (_, GaveUp | TimedOut) => true,
            (NotStarted, AwaitingForm)
            | (AwaitingForm, FormSubmitted)
            | (FormSubmitted, Testing | ResultReady)
            | (Testing, ResultReady)
            | (ResultReady, NotStarted) => true,
            _ => false,
        }
    }
}

/// Process exit status reported once the portal stops
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitStatus {
    Success = 0,
    NoConnection = 1,
    NoInternet = 2,
    UserCancelled = 3,
    NotValidated = 4,
    TimedOut = 900,
    Interrupted = 987,
    Incomplete = 999,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_failure(self) -> bool {
        matches!(self, ExitStatus::NoConnection | ExitStatus::NoInternet)
    }
}

/// What the connectivity test found out
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectivityResult {
    pub obtained_ip: Option<Ipv4Addr>,
    pub link_connected: bool,
    /// `None` when the internet check was not requested or not reached
    pub internet_reachable: Option<bool>,
}

impl ConnectivityResult {
    pub fn outcome(&self, check_internet: bool) -> ExitStatus {
        if !self.link_connected {
            ExitStatus::NoConnection
        } else if !check_internet {
            ExitStatus::NotValidated
        } else if self.internet_reachable == Some(true) {
            ExitStatus::Success
        } else {
            ExitStatus::NoInternet
        }
    }
}

/// Mutable record of one portal run
#[derive(Debug)]
pub struct SessionState {
    pub credentials: Option<Credentials>,
    pub connectivity: Option<ConnectivityResult>,
    pub retries_remaining: u32,
    pub last_outcome: Option<ExitStatus>,
    phase: WorkflowPhase,
    exit_status: Option<ExitStatus>,
    pending_test: Option<oneshot::Receiver<ConnectivityResult>>,
}

impl SessionState {
    pub fn new(retries: u32) -> Self {
        Self {
            credentials: None,
            connectivity: None,
            retries_remaining: retries,
            last_outcome: None,
            phase: WorkflowPhase::NotStarted,
            exit_status: None,
            pending_test: None,
        }
    }

    pub fn phase(&self) -> WorkflowPhase {
        self.phase
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    pub fn is_stopped(&self) -> bool {
        self.exit_status.is_some()
    }

    /// Move to `next` if the transition is legal and the portal still runs
    pub fn advance(&mut self, next: WorkflowPhase) -> bool {
        if self.is_stopped() {
            debug!("portal stopped, ignore transition to {next:?}");
            return false;
        }

        if !self.phase.can_advance_to(next) {
            warn!("illegal transition {:?} -> {next:?} ignored", self.phase);
            return false;
        }

        info!("workflow phase {:?} -> {next:?}", self.phase);
        self.phase = next;
        true
    }

    /// Record the exit status, only the first call has an effect
    pub fn finalize(&mut self, status: ExitStatus) -> bool {
        if let Some(current) = self.exit_status {
            debug!("exit status already {current:?}, ignore {status:?}");
            return false;
        }

        self.exit_status = Some(status);
        true
    }

    /// Register the result channel of a connectivity test
    pub fn start_test(&mut self, rx: oneshot::Receiver<ConnectivityResult>) -> bool {
        if self.pending_test.is_some() {
            warn!("connectivity test already in flight, not starting another one");
            return false;
        }

        self.pending_test = Some(rx);
        true
    }

    pub fn test_in_flight(&self) -> bool {
        self.pending_test.is_some()
    }

    /// Harvest a finished connectivity test and move to `ResultReady`
    pub fn poll_test(&mut self) -> bool {
        let Some(rx) = self.pending_test.as_mut() else {
            return false;
        };

        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Closed) => {
                warn!("connectivity test ended without a result");
                ConnectivityResult::default()
            }
        };

        self.pending_test = None;
        info!("connectivity test finished: {result:?}");

        if self.advance(WorkflowPhase::ResultReady) {
            self.connectivity = Some(result);
        }
        true
    }

    /// Return to `NotStarted` keeping the retry budget
    pub fn restart(&mut self) -> bool {
        if !self.advance(WorkflowPhase::NotStarted) {
            return false;
        }

        self.credentials = None;
        self.connectivity = None;
        self.last_outcome = None;
        true
    }
}
