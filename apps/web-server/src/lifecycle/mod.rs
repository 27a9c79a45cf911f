//! Server lifecycle - in-flight request tracking and graceful shutdown.

mod in_flight;
mod shutdown;

pub use in_flight::{InFlightGuard, InFlightTracker};
pub use shutdown::{
    ServerControl, ServerPhase, ShutdownError, ShutdownOrchestrator, StopReason, wait_for_interrupt,
};
