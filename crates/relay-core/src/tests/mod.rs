//! Integration tests for the relay orchestrator.
//!
//! - `harness.rs`      - Mock repository, producer, confirmation source and a wired relay
//! - `acceptance.rs`   - Accepting messages, soft errors, online forwarding
//! - `replay.rs`       - Repository and broker replay passes, retry scheduler
//! - `forwarding.rs`   - Forwarder loop against a mock producer
//! - `confirmation.rs` - Confirmation handling and acknowledgement rules

mod confirmation;
