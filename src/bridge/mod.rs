//! Foreign call surface.
//!
//! The interpreter reaches the bridge through versioned JSON envelopes,
//! either as lines over a pipe ([`stdio`], the subprocess interpreter) or
//! through the C ABI in [`crate::ffi`] (an in-process interpreter). Both
//! paths end in [`router::CallRouter`].

pub mod contract;
pub mod flat;
pub mod router;
pub mod stdio;
