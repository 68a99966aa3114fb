//! Core types shared across the primitives.
//!
//! - [`panic`]: Panic payloads captured at unit boundaries

pub mod panic;

pub use panic::PanicPayload;
