// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronization between platform sessions and the mirror system.
//!
//! The [`ReconciliationEngine`] handles one event at a time; the
//! [`SessionWorkers`] keep events of a session in order; the
//! [`RetrySweeper`] re-attempts failed relations on its own schedule.

pub mod engine;
mod locks;
pub mod metrics;
pub mod policy;
pub mod retry;
pub mod tokens;
pub mod worker;

pub use engine::{LocalOutcome, MirrorOutcome, ReconciliationEngine, RetryOutcome};
pub use policy::ConfigPolicyStore;
pub use retry::{RetryPolicy, RetrySweeper, SweepReport};
pub use worker::{BridgeEvent, SessionWorkers};
