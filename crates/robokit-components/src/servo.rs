/*!
 * Servo component.
 */
use std::sync::Arc;

use async_trait::async_trait;

use robokit_core::context::Context;

use crate::error::{ComponentError, Result};
use crate::reconfigurable::{expect_same, Component, Reconfigurable, ReconfigurableCell};
use crate::registry::{Registry, Resource};
use crate::resource::{Name, Subtype};

/// The servo subtype
pub const SUBTYPE: Subtype = Subtype::component_with_label("servo", LABEL);

/// Label used for servos in error messages
pub const LABEL: &str = "servo";

/// The typed resource name of the servo called `name`
pub fn named(name: &str) -> Name {
    Name::from_subtype(&SUBTYPE, name)
}

/// A servo that can be driven to an angle
#[async_trait]
pub trait Servo: Component {
    /// Move to `angle_deg`
    async fn move_to(&self, ctx: &Context, angle_deg: u8) -> Result<()>;

    /// The current angle in degrees
    async fn angular_offset(&self, ctx: &Context) -> Result<u8>;
}

/// Reconfigurable handle to a servo
#[derive(Debug)]
pub struct ReconfigurableServo {
    cell: ReconfigurableCell<dyn Servo>,
}

impl ReconfigurableServo {
    /// Wrap `actual`
    pub fn new(actual: Arc<dyn Servo>) -> Self {
        Self {
            cell: ReconfigurableCell::new(actual),
        }
    }

    /// The servo currently held
    pub async fn proxy_for(&self) -> Arc<dyn Servo> {
        self.cell.current().await
    }
}

#[async_trait]
impl Component for ReconfigurableServo {
    async fn close(&self, ctx: &Context) -> Result<()> {
        ctx.run(async { self.cell.read().await.close(ctx).await })
            .await
    }
}

#[async_trait]
impl Servo for ReconfigurableServo {
    async fn move_to(&self, ctx: &Context, angle_deg: u8) -> Result<()> {
        ctx.run(async { self.cell.read().await.move_to(ctx, angle_deg).await })
            .await
    }

    async fn angular_offset(&self, ctx: &Context) -> Result<u8> {
        ctx.run(async { self.cell.read().await.angular_offset(ctx).await })
            .await
    }
}

#[async_trait]
impl Reconfigurable for ReconfigurableServo {
    async fn reconfigure(&self, ctx: &Context, new: &dyn Reconfigurable) -> Result<()> {
        let new = expect_same::<Self>(new)?;
        self.cell.replace_with(ctx, &new.cell).await
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Store `servo` in the registry form: a reconfigurable wrapper
pub fn into_resource<S: Servo + 'static>(servo: S) -> Resource {
    Arc::new(ReconfigurableServo::new(Arc::new(servo)))
}

/// Convert a resource into a reconfigurable servo
pub fn wrap_with_reconfigurable(resource: Resource) -> Result<Arc<ReconfigurableServo>> {
    match resource.downcast::<ReconfigurableServo>() {
        Ok(wrapper) => Ok(wrapper),
        Err(resource) => resource
            .downcast_ref::<Arc<dyn Servo>>()
            .map(|servo| Arc::new(ReconfigurableServo::new(Arc::clone(servo))))
            .ok_or_else(|| ComponentError::TypeMismatch {
                expected: LABEL.to_string(),
                actual: "non-servo resource".to_string(),
            }),
    }
}

/// Recover a servo from a registry entry
pub fn from_resource(resource: &Resource) -> Option<Arc<dyn Servo>> {
    if let Ok(wrapper) = Arc::clone(resource).downcast::<ReconfigurableServo>() {
        return Some(wrapper);
    }
    resource.downcast_ref::<Arc<dyn Servo>>().cloned()
}

/// Look up the servo called `name`
pub fn from_registry(registry: &Registry, name: &str) -> Result<Arc<dyn Servo>> {
    registry.lookup_as(&named(name), from_resource)
}
