//! Background work: the `identity:validate` handler and the verification
//! pipeline it shares with `EndValidation`.

pub mod identity;
pub mod pipeline;

pub use identity::{IdentityVerificationHandler, VerificationTaskPayload, TASK_IDENTIFIER};
pub use pipeline::{PipelineRun, Verdict, VerificationPipeline};
