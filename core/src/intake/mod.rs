pub mod workflow;

pub use workflow::{Intake, IntakeReceipt, Submission, SubmissionStage};
