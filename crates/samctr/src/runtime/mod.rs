//! Runtime context.
//!
//! [`PrepareContext::resolve`] merges the config file with command line
//! overrides; [`prepare`] turns the result into a [`RuntimeState`] ready to
//! launch.

mod context;
pub mod gpu;
pub(crate) mod state;

pub use context::{DEFAULT_HOST_INJECTIONS, Overrides, PrepareContext, prepare};
pub use gpu::GpuSetup;
pub use state::RuntimeState;
