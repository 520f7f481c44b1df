//! Process-supervised benchmark loop: output classification, child process
//! supervision, the persisted results ledger and the run sequencer.

pub mod artifact;
pub mod classifier;
pub mod ledger;
pub mod preflight;
pub mod sequencer;
pub mod supervisor;
pub mod types;

pub use classifier::{OutputClassification, OutputClassifier};
pub use ledger::{LedgerError, ResultsLedger};
pub use sequencer::{Sequencer, SuiteReport, SuiteSummary};
pub use supervisor::Supervisor;
pub use types::{RunOutcome, RunRequest};
