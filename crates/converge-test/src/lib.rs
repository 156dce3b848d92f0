//! Integration test infrastructure for the converge reconciliation core
//!
//! Provides:
//! - Scripted mock transport with call recording
//! - Manual clock for virtual-time tests
//! - Resource-model fixtures for common reconciliation patterns

pub mod fixtures;
mod manual_clock;
mod mock_transport;

pub use fixtures::*;
pub use manual_clock::ManualClock;
pub use mock_transport::{MockTransport, RecordedCall};
