//! Backend selection by driver name.

pub mod factory;

pub use factory::{BackendBuilder, BackendFactory, BackendSettings, NO_BACKEND_DRIVER};
