//! Per-call dispatch state machine.
//!
//! Every dispatched request walks this machine. There is no edge out of
//! `Resent` on a 401, so a request can be renewed-and-resent at most once.
//!
//! ```text
//! Unsent ──Dispatch──► Sent ──Responded──────────────────────► Done
//!                       │                                       ▲
//!                       │ Rejected (401)                        │ Responded
//!                       ▼                                       │
//!             Unauthorized ──BeginRenewal──► Renewing ──Renewed──► Resent
//!                                               │
//!                                               │ RenewalFailed
//!                                               ▼
//!                                          RenewFailed ──Abort──► Failed
//!
//! Sent / Resent ──TransportFailed──► Failed
//! ```

use rust_fsm::*;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub dispatch_machine(Unsent)

    Unsent => {
        Dispatch => Sent
    },
    Sent => {
        Responded => Done,
        Rejected => Unauthorized,
        TransportFailed => Failed
    },
    Unauthorized => {
        BeginRenewal => Renewing
    },
    Renewing => {
        Renewed => Resent,
        RenewalFailed => RenewFailed
    },
    Resent => {
        Responded => Done,
        TransportFailed => Failed
    },
    RenewFailed => {
        Abort => Failed
    }
}

pub use dispatch_machine::Input as DispatchMachineInput;
pub use dispatch_machine::State as DispatchMachineState;
pub use dispatch_machine::StateMachine as DispatchMachine;

impl DispatchMachineState {
    /// True once the call can make no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchMachineState::Done | DispatchMachineState::Failed)
    }
}
