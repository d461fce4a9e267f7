/*!
 * Compass component.
 *
 * A compass is a sensor whose readings are a single heading in degrees, with
 * optional calibration control.
 */
use std::sync::Arc;

use async_trait::async_trait;

use robokit_core::context::Context;
use robokit_core::types::Value;

use crate::error::{ComponentError, Result};
use crate::reconfigurable::{expect_same, Component, Reconfigurable, ReconfigurableCell};
use crate::registry::{Registry, Resource};
use crate::resource::{Name, Subtype};
use crate::sensor::Sensor;

/// The compass subtype
pub const SUBTYPE: Subtype = Subtype::component_with_label("compass", LABEL);

/// Label used for compasses in error messages
pub const LABEL: &str = "compass";

/// Number of samples taken by [`median_heading`]
pub const MEDIAN_SAMPLES: usize = 5;

/// The typed resource name of the compass called `name`
pub fn named(name: &str) -> Name {
    Name::from_subtype(&SUBTYPE, name)
}

/// A sensor reporting a heading
#[async_trait]
pub trait Compass: Sensor {
    /// Heading in degrees
    async fn heading(&self, ctx: &Context) -> Result<f64>;

    /// Begin calibrating
    async fn start_calibration(&self, ctx: &Context) -> Result<()>;

    /// End calibration
    async fn stop_calibration(&self, ctx: &Context) -> Result<()>;
}

/// Take [`MEDIAN_SAMPLES`] headings and return their median
///
/// The first failing sample aborts and its error is returned as is.
pub async fn median_heading(ctx: &Context, compass: &dyn Compass) -> Result<f64> {
    let mut headings = Vec::with_capacity(MEDIAN_SAMPLES);
    for _ in 0..MEDIAN_SAMPLES {
        headings.push(compass.heading(ctx).await?);
    }
    headings.sort_by(|a, b| a.total_cmp(b));
    Ok(headings[headings.len() / 2])
}

/// Reconfigurable handle to a compass
#[derive(Debug)]
pub struct ReconfigurableCompass {
    cell: ReconfigurableCell<dyn Compass>,
}

impl ReconfigurableCompass {
    /// Wrap `actual`
    pub fn new(actual: Arc<dyn Compass>) -> Self {
        Self {
            cell: ReconfigurableCell::new(actual),
        }
    }

    /// The compass currently held
    pub async fn proxy_for(&self) -> Arc<dyn Compass> {
        self.cell.current().await
    }
}

#[async_trait]
impl Component for ReconfigurableCompass {
    async fn close(&self, ctx: &Context) -> Result<()> {
        ctx.run(async { self.cell.read().await.close(ctx).await })
            .await
    }
}

#[async_trait]
impl Sensor for ReconfigurableCompass {
    async fn readings(&self, ctx: &Context) -> Result<Vec<Value>> {
        ctx.run(async { self.cell.read().await.readings(ctx).await })
            .await
    }
}

#[async_trait]
impl Compass for ReconfigurableCompass {
    async fn heading(&self, ctx: &Context) -> Result<f64> {
        ctx.run(async { self.cell.read().await.heading(ctx).await })
            .await
    }

    async fn start_calibration(&self, ctx: &Context) -> Result<()> {
        ctx.run(async { self.cell.read().await.start_calibration(ctx).await })
            .await
    }

    async fn stop_calibration(&self, ctx: &Context) -> Result<()> {
        ctx.run(async { self.cell.read().await.stop_calibration(ctx).await })
            .await
    }
}

#[async_trait]
impl Reconfigurable for ReconfigurableCompass {
    async fn reconfigure(&self, ctx: &Context, new: &dyn Reconfigurable) -> Result<()> {
        let new = expect_same::<Self>(new)?;
        self.cell.replace_with(ctx, &new.cell).await
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Store `compass` in the registry form: a reconfigurable wrapper
pub fn into_resource<C: Compass + 'static>(compass: C) -> Resource {
    Arc::new(ReconfigurableCompass::new(Arc::new(compass)))
}

/// Convert a resource into a reconfigurable compass
pub fn wrap_with_reconfigurable(resource: Resource) -> Result<Arc<ReconfigurableCompass>> {
    match resource.downcast::<ReconfigurableCompass>() {
        Ok(wrapper) => Ok(wrapper),
        Err(resource) => resource
            .downcast_ref::<Arc<dyn Compass>>()
            .map(|compass| Arc::new(ReconfigurableCompass::new(Arc::clone(compass))))
            .ok_or_else(|| ComponentError::TypeMismatch {
                expected: LABEL.to_string(),
                actual: "non-compass resource".to_string(),
            }),
    }
}

/// Recover a compass from a registry entry
pub fn from_resource(resource: &Resource) -> Option<Arc<dyn Compass>> {
    if let Ok(wrapper) = Arc::clone(resource).downcast::<ReconfigurableCompass>() {
        return Some(wrapper);
    }
    resource.downcast_ref::<Arc<dyn Compass>>().cloned()
}

/// Look up the compass called `name`
pub fn from_registry(registry: &Registry, name: &str) -> Result<Arc<dyn Compass>> {
    registry.lookup_as(&named(name), from_resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::InjectCompass;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_median_heading() {
        let compass = InjectCompass::new().with_heading(|_| Err(ComponentError::domain("whoops")));
        let err = median_heading(&Context::background(), &compass)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "whoops");

        let samples = [1.0, 2.0, 3.0, 4.0, 4.0, 2.0, 4.0, 4.0, 1.0, 1.0, 2.0];
        let taken = Arc::new(AtomicUsize::new(0));
        let counter = taken.clone();
        let compass = InjectCompass::new()
            .with_heading(move |_| Ok(samples[counter.fetch_add(1, Ordering::SeqCst)]));
        let median = median_heading(&Context::background(), &compass)
            .await
            .unwrap();
        assert_eq!(median, 3.0);
        assert_eq!(taken.load(Ordering::SeqCst), MEDIAN_SAMPLES);
    }

    #[tokio::test]
    async fn test_first_error_stops_sampling() {
        let taken = Arc::new(AtomicUsize::new(0));
        let counter = taken.clone();
        let compass = InjectCompass::new().with_heading(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                return Err(ComponentError::domain("third sample failed"));
            }
            Ok(90.0)
        });
        let err = median_heading(&Context::background(), &compass)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "third sample failed");
        assert_eq!(taken.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wrapper_and_calibration() {
        let calibrating = Arc::new(AtomicUsize::new(0));
        let (start, stop) = (calibrating.clone(), calibrating.clone());
        let compass = ReconfigurableCompass::new(Arc::new(
            InjectCompass::new()
                .with_heading(|_| Ok(45.0))
                .with_start_calibration(move |_| {
                    start.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .with_stop_calibration(move |_| {
                    stop.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }),
        ));
        let ctx = Context::background();
        assert_eq!(compass.heading(&ctx).await.unwrap(), 45.0);
        assert_eq!(compass.readings(&ctx).await.unwrap(), vec![Value::Float(45.0)]);

        compass.start_calibration(&ctx).await.unwrap();
        assert_eq!(calibrating.load(Ordering::SeqCst), 1);
        compass.stop_calibration(&ctx).await.unwrap();
        assert_eq!(calibrating.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = Registry::from_resources(vec![(
            named("compass1"),
            into_resource(InjectCompass::new().with_heading(|_| Ok(180.0))),
        )])
        .unwrap();
        let compass = from_registry(&registry, "compass1").unwrap();
        assert_eq!(compass.heading(&Context::background()).await.unwrap(), 180.0);
        assert_eq!(
            from_registry(&registry, "compass2").unwrap_err().to_string(),
            "no compass named compass2"
        );
    }
}
