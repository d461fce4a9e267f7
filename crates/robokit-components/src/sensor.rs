/*!
 * Generic sensor component.
 *
 * A sensor reports an ordered list of readings whose meaning depends on the
 * device; the contract does not interpret them.
 */
use std::sync::Arc;

use async_trait::async_trait;

use robokit_core::context::Context;
use robokit_core::types::Value;

use crate::error::{ComponentError, Result};
use crate::reconfigurable::{expect_same, Component, Reconfigurable, ReconfigurableCell};
use crate::registry::{Registry, Resource};
use crate::resource::{Name, Subtype};

/// The generic sensor subtype
pub const SUBTYPE: Subtype = Subtype::component_with_label("sensor", LABEL);

/// Label used for sensors in error messages
pub const LABEL: &str = "generic sensor";

/// The typed resource name of the sensor called `name`
pub fn named(name: &str) -> Name {
    Name::from_subtype(&SUBTYPE, name)
}

/// A device that produces readings
#[async_trait]
pub trait Sensor: Component {
    /// Current readings
    async fn readings(&self, ctx: &Context) -> Result<Vec<Value>>;
}

/// Reconfigurable handle to a sensor
#[derive(Debug)]
pub struct ReconfigurableSensor {
    cell: ReconfigurableCell<dyn Sensor>,
}

impl ReconfigurableSensor {
    /// Wrap `actual`
    pub fn new(actual: Arc<dyn Sensor>) -> Self {
        Self {
            cell: ReconfigurableCell::new(actual),
        }
    }

    /// The sensor currently held
    pub async fn proxy_for(&self) -> Arc<dyn Sensor> {
        self.cell.current().await
    }
}

#[async_trait]
impl Component for ReconfigurableSensor {
    async fn close(&self, ctx: &Context) -> Result<()> {
        ctx.run(async { self.cell.read().await.close(ctx).await })
            .await
    }
}

#[async_trait]
impl Sensor for ReconfigurableSensor {
    async fn readings(&self, ctx: &Context) -> Result<Vec<Value>> {
        ctx.run(async { self.cell.read().await.readings(ctx).await })
            .await
    }
}

#[async_trait]
impl Reconfigurable for ReconfigurableSensor {
    async fn reconfigure(&self, ctx: &Context, new: &dyn Reconfigurable) -> Result<()> {
        let new = expect_same::<Self>(new)?;
        self.cell.replace_with(ctx, &new.cell).await
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Store `sensor` in the registry form: a reconfigurable wrapper
pub fn into_resource<S: Sensor + 'static>(sensor: S) -> Resource {
    Arc::new(ReconfigurableSensor::new(Arc::new(sensor)))
}

/// Convert a resource into a reconfigurable sensor
pub fn wrap_with_reconfigurable(resource: Resource) -> Result<Arc<ReconfigurableSensor>> {
    match resource.downcast::<ReconfigurableSensor>() {
        Ok(wrapper) => Ok(wrapper),
        Err(resource) => resource
            .downcast_ref::<Arc<dyn Sensor>>()
            .map(|sensor| Arc::new(ReconfigurableSensor::new(Arc::clone(sensor))))
            .ok_or_else(|| ComponentError::TypeMismatch {
                expected: LABEL.to_string(),
                actual: "non-sensor resource".to_string(),
            }),
    }
}

/// Recover a sensor from a registry entry
///
/// Compasses are sensors too, so a compass wrapper is accepted.
pub fn from_resource(resource: &Resource) -> Option<Arc<dyn Sensor>> {
    if let Ok(wrapper) = Arc::clone(resource).downcast::<ReconfigurableSensor>() {
        return Some(wrapper);
    }
    if let Ok(compass) = Arc::clone(resource).downcast::<crate::compass::ReconfigurableCompass>() {
        return Some(compass);
    }
    resource.downcast_ref::<Arc<dyn Sensor>>().cloned()
}

/// Look up the sensor called `name`
pub fn from_registry(registry: &Registry, name: &str) -> Result<Arc<dyn Sensor>> {
    registry.lookup_as(&named(name), from_resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeSensor;
    use crate::inject::{InjectCompass, InjectSensor};

    #[tokio::test]
    async fn test_registry_scenarios() {
        let registry = Registry::from_resources(vec![
            (
                named("sensor1"),
                into_resource(
                    InjectSensor::new()
                        .with_readings(|_| Ok(vec![Value::Float(1.1), Value::Float(2.2)])),
                ),
            ),
            (
                named("sensor2"),
                into_resource(
                    InjectSensor::new()
                        .with_readings(|_| Err(ComponentError::domain("can't get readings"))),
                ),
            ),
            (named("sensor3"), Arc::new("notSensor") as Resource),
        ])
        .unwrap();
        let ctx = Context::background();

        let sensor = from_registry(&registry, "sensor1").unwrap();
        assert_eq!(
            sensor.readings(&ctx).await.unwrap(),
            vec![Value::Float(1.1), Value::Float(2.2)]
        );

        let sensor = from_registry(&registry, "sensor2").unwrap();
        let err = sensor.readings(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("can't get readings"));

        let err = from_registry(&registry, "sensor3").unwrap_err();
        assert!(err.to_string().contains("not a generic sensor"));

        let err = from_registry(&registry, "sensor4").unwrap_err();
        assert!(err.to_string().contains("no generic sensor"));
    }

    #[tokio::test]
    async fn test_compass_serves_as_sensor() {
        let compass = crate::compass::into_resource(InjectCompass::new().with_heading(|_| Ok(12.0)));
        let sensor = from_resource(&compass).unwrap();
        assert_eq!(
            sensor.readings(&Context::background()).await.unwrap(),
            vec![Value::Float(12.0)]
        );
    }

    #[tokio::test]
    async fn test_reconfigure() {
        let ctx = Context::background();
        let sensor = ReconfigurableSensor::new(Arc::new(FakeSensor::new(vec![Value::Integer(1)])));
        let next = ReconfigurableSensor::new(Arc::new(FakeSensor::new(vec![Value::Integer(2)])));
        sensor.reconfigure(&ctx, &next).await.unwrap();
        assert_eq!(sensor.readings(&ctx).await.unwrap(), vec![Value::Integer(2)]);

        let wrapped = wrap_with_reconfigurable(Arc::new(next) as Resource).unwrap();
        assert_eq!(wrapped.readings(&ctx).await.unwrap(), vec![Value::Integer(2)]);
    }
}
