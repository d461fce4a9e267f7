/*!
 * Prelude module for robokit Core.
 *
 * This module re-exports commonly used types from the robokit Core crate
 * to make them easier to import.
 */

pub use crate::error::{Error, Result};

pub use crate::types::{Id, Value};

pub use crate::context::Context;

pub use crate::config::{Config, ConfigBuilder, RpcConfig, SharedConfig};

pub use tracing::{debug, error, info, trace, warn};

pub use crate::init;
