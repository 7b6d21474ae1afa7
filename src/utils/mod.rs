//! Utility functions for persistent memory operations.

pub mod alignment;
