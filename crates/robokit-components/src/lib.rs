/*!
 * robokit Components
 *
 * This crate provides the component contracts (base, servo, sensor, compass,
 * input controller), their hot-swappable wrappers, the typed resource names
 * and the registry that maps names to live instances.
 */

#![warn(missing_docs)]

// Re-export core types
pub use robokit_core::prelude;

pub mod base;
pub mod compass;
pub mod error;
pub mod fake;
pub mod inject;
pub mod input;
pub mod reconfigurable;
pub mod registry;
pub mod resource;
pub mod sensor;
pub mod servo;

pub use error::{Code, ComponentError, Result};
pub use reconfigurable::{Component, Reconfigurable, ReconfigurableCell};
pub use registry::{Registry, Resource};
pub use resource::{Name, Subtype};

/// robokit components crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Subtypes known to this crate
pub fn known_subtypes() -> Vec<Subtype> {
    vec![
        base::SUBTYPE,
        servo::SUBTYPE,
        sensor::SUBTYPE,
        compass::SUBTYPE,
        input::SUBTYPE,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_subtypes_are_distinct() {
        let subtypes = known_subtypes();
        for (i, a) in subtypes.iter().enumerate() {
            for b in &subtypes[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(subtypes.iter().all(|s| s.namespace() == "rdk"));
    }
}
