//! Behavioural test suites for the action layer.
