//! Adaptive difficulty progression engine.
//!
//! Pure, I/O-free logic: question selection, batch scoring and the
//! progression state machine that moves a learner through the difficulty
//! tiers. The HTTP layer loads and stores [`TestSession`](crate::models::TestSession)
//! values and feeds events into [`Controller::apply`].

pub mod bank;
pub mod controller;
pub mod scoring;
pub mod selector;
pub mod support;

pub use bank::{BankError, QuestionBank};
pub use controller::{
    AdaptiveSettings, Controller, Event, Navigation, ProgressionError, RetryPolicy, Step,
    Transition,
};
pub use scoring::{evaluate, BatchVerdict};
pub use selector::{select_batch, select_supplementary, SelectionOrder};
pub use support::SupportCatalog;
