//! Interruption and rollback utilities.
//!
//! This module provides:
//! - `CancellationToken` for operator interrupts, checked between steps
//! - `RollbackRegistry` for LIFO execution of rollback handlers

mod rollback;
mod token;

pub use rollback::RollbackRegistry;
pub use token::CancellationToken;
