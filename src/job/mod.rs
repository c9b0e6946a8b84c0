pub mod gate;
pub mod record;
pub mod store;

pub use gate::{ChallengeGate, Delivery, GateError, GateKind, GateWindow, JobGates};
pub use record::{JobRecord, JobStatus, JobUpdate, MAX_MESSAGES};
pub use store::JobStore;
