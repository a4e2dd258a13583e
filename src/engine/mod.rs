//! Scan engine: universe management, per-symbol scanning and the cycle
//! driver that ties them together.

pub mod accountant;
pub mod opportunities;
pub mod orchestrator;
pub mod scanner;
pub mod universe;
