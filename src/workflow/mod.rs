pub mod identifier_flow;
pub mod job_ctx;

pub use identifier_flow::{IdentifierFlow, ProcessResult, StageTimeouts};
pub use job_ctx::JobCtx;
