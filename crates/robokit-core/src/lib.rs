/*!
 * robokit Core
 *
 * This crate provides the pieces every robokit layer shares: the per-call
 * context, dynamic values, configuration and logging.
 */

#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod types;

/// robokit core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library initialization from a loaded configuration
pub fn init(config: &config::Config) -> Result<(), error::Error> {
    logging::init_from_config(&config.logging)?;
    tracing::info!("robokit core {} initialized", VERSION);
    Ok(())
}
