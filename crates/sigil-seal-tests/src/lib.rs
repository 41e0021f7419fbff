//! Integration and E2E tests for Sigil challenge-response sealing
//!
//! The tests live under `tests/`.
