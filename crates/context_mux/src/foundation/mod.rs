//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the multiplexer:
//! - Math types for pointer coordinates
//! - Frame pacing for render loops
//! - Logging setup
//! - Panic payload formatting and poison-tolerant locking

pub mod math;
pub mod time;
pub mod logging;
pub mod panic;
pub(crate) mod sync;
