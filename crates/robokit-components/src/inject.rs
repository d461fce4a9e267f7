/*!
 * Test doubles whose behaviour is supplied as closures.
 *
 * Each `Inject*` type implements one component contract. Methods without a
 * hook fail with `Unsupported`, so a test only wires up what it exercises.
 */
use std::fmt;

use async_trait::async_trait;

use robokit_core::context::Context;
use robokit_core::types::Value;

use crate::base::Base;
use crate::compass::Compass;
use crate::error::{ComponentError, Result};
use crate::reconfigurable::Component;
use crate::sensor::Sensor;
use crate::servo::Servo;

type Hook<Args, T> = Box<dyn Fn(&Context, Args) -> Result<T> + Send + Sync>;
type CloseHook = Box<dyn Fn(&Context) -> Result<()> + Send + Sync>;

fn missing(method: &str) -> ComponentError {
    ComponentError::unsupported(format!("{method} not injected"))
}

fn close_with(hook: &Option<CloseHook>, ctx: &Context) -> Result<()> {
    match hook {
        Some(close) => close(ctx),
        None => Ok(()),
    }
}

/// A base driven by closures
#[derive(Default)]
pub struct InjectBase {
    move_straight: Option<Hook<(i64, f64, bool), ()>>,
    move_arc: Option<Hook<(i64, f64, f64, bool), ()>>,
    spin: Option<Hook<(f64, f64, bool), ()>>,
    stop: Option<Hook<(), ()>>,
    width_get: Option<Hook<(), i64>>,
    close: Option<CloseHook>,
}

impl InjectBase {
    /// A base with no hooks
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle `move_straight`
    pub fn with_move_straight<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, i64, f64, bool) -> Result<()> + Send + Sync + 'static,
    {
        self.move_straight = Some(Box::new(move |ctx: &Context, (distance, speed, block)| {
            f(ctx, distance, speed, block)
        }));
        self
    }

    /// Handle `move_arc`
    pub fn with_move_arc<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, i64, f64, f64, bool) -> Result<()> + Send + Sync + 'static,
    {
        self.move_arc = Some(Box::new(move |ctx: &Context, (distance, speed, degs, block)| {
            f(ctx, distance, speed, degs, block)
        }));
        self
    }

    /// Handle `spin`
    pub fn with_spin<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, f64, f64, bool) -> Result<()> + Send + Sync + 'static,
    {
        self.spin = Some(Box::new(move |ctx: &Context, (angle, degs, block)| {
            f(ctx, angle, degs, block)
        }));
        self
    }

    /// Handle `stop`
    pub fn with_stop<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> Result<()> + Send + Sync + 'static,
    {
        self.stop = Some(Box::new(move |ctx: &Context, ()| f(ctx)));
        self
    }

    /// Handle `width_get`
    pub fn with_width_get<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> Result<i64> + Send + Sync + 'static,
    {
        self.width_get = Some(Box::new(move |ctx: &Context, ()| f(ctx)));
        self
    }

    /// Handle `close`
    pub fn with_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> Result<()> + Send + Sync + 'static,
    {
        self.close = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for InjectBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectBase")
            .field("move_straight", &self.move_straight.is_some())
            .field("move_arc", &self.move_arc.is_some())
            .field("spin", &self.spin.is_some())
            .field("stop", &self.stop.is_some())
            .field("width_get", &self.width_get.is_some())
            .finish()
    }
}

#[async_trait]
impl Component for InjectBase {
    async fn close(&self, ctx: &Context) -> Result<()> {
        close_with(&self.close, ctx)
    }
}

#[async_trait]
impl Base for InjectBase {
    async fn move_straight(
        &self,
        ctx: &Context,
        distance_mm: i64,
        mm_per_sec: f64,
        block: bool,
    ) -> Result<()> {
        let hook = self.move_straight.as_ref().ok_or_else(|| missing("move_straight"))?;
        hook(ctx, (distance_mm, mm_per_sec, block))
    }

    async fn move_arc(
        &self,
        ctx: &Context,
        distance_mm: i64,
        mm_per_sec: f64,
        degs_per_sec: f64,
        block: bool,
    ) -> Result<()> {
        let hook = self.move_arc.as_ref().ok_or_else(|| missing("move_arc"))?;
        hook(ctx, (distance_mm, mm_per_sec, degs_per_sec, block))
    }

    async fn spin(&self, ctx: &Context, angle_deg: f64, degs_per_sec: f64, block: bool) -> Result<()> {
        let hook = self.spin.as_ref().ok_or_else(|| missing("spin"))?;
        hook(ctx, (angle_deg, degs_per_sec, block))
    }

    async fn stop(&self, ctx: &Context) -> Result<()> {
        let hook = self.stop.as_ref().ok_or_else(|| missing("stop"))?;
        hook(ctx, ())
    }

    async fn width_get(&self, ctx: &Context) -> Result<i64> {
        let hook = self.width_get.as_ref().ok_or_else(|| missing("width_get"))?;
        hook(ctx, ())
    }
}

/// A servo driven by closures
#[derive(Default)]
pub struct InjectServo {
    move_to: Option<Hook<u8, ()>>,
    angular_offset: Option<Hook<(), u8>>,
    close: Option<CloseHook>,
}

impl InjectServo {
    /// A servo with no hooks
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle `move_to`
    pub fn with_move<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, u8) -> Result<()> + Send + Sync + 'static,
    {
        self.move_to = Some(Box::new(f));
        self
    }

    /// Handle `angular_offset`
    pub fn with_angular_offset<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> Result<u8> + Send + Sync + 'static,
    {
        self.angular_offset = Some(Box::new(move |ctx: &Context, ()| f(ctx)));
        self
    }

    /// Handle `close`
    pub fn with_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> Result<()> + Send + Sync + 'static,
    {
        self.close = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for InjectServo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectServo")
            .field("move_to", &self.move_to.is_some())
            .field("angular_offset", &self.angular_offset.is_some())
            .finish()
    }
}

#[async_trait]
impl Component for InjectServo {
    async fn close(&self, ctx: &Context) -> Result<()> {
        close_with(&self.close, ctx)
    }
}

#[async_trait]
impl Servo for InjectServo {
    async fn move_to(&self, ctx: &Context, angle_deg: u8) -> Result<()> {
        let hook = self.move_to.as_ref().ok_or_else(|| missing("move_to"))?;
        hook(ctx, angle_deg)
    }

    async fn angular_offset(&self, ctx: &Context) -> Result<u8> {
        let hook = self
            .angular_offset
            .as_ref()
            .ok_or_else(|| missing("angular_offset"))?;
        hook(ctx, ())
    }
}

/// A sensor driven by a closure
#[derive(Default)]
pub struct InjectSensor {
    readings: Option<Hook<(), Vec<Value>>>,
}

impl InjectSensor {
    /// A sensor with no hooks
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle `readings`
    pub fn with_readings<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> Result<Vec<Value>> + Send + Sync + 'static,
    {
        self.readings = Some(Box::new(move |ctx: &Context, ()| f(ctx)));
        self
    }
}

impl fmt::Debug for InjectSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectSensor")
            .field("readings", &self.readings.is_some())
            .finish()
    }
}

#[async_trait]
impl Component for InjectSensor {}

#[async_trait]
impl Sensor for InjectSensor {
    async fn readings(&self, ctx: &Context) -> Result<Vec<Value>> {
        let hook = self.readings.as_ref().ok_or_else(|| missing("readings"))?;
        hook(ctx, ())
    }
}

/// A compass driven by closures
///
/// Without a `readings` hook the readings are the current heading.
#[derive(Default)]
pub struct InjectCompass {
    readings: Option<Hook<(), Vec<Value>>>,
    heading: Option<Hook<(), f64>>,
    start_calibration: Option<Hook<(), ()>>,
    stop_calibration: Option<Hook<(), ()>>,
}

impl InjectCompass {
    /// A compass with no hooks
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle `readings`
    pub fn with_readings<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> Result<Vec<Value>> + Send + Sync + 'static,
    {
        self.readings = Some(Box::new(move |ctx: &Context, ()| f(ctx)));
        self
    }

    /// Handle `heading`
    pub fn with_heading<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> Result<f64> + Send + Sync + 'static,
    {
        self.heading = Some(Box::new(move |ctx: &Context, ()| f(ctx)));
        self
    }

    /// Handle `start_calibration`
    pub fn with_start_calibration<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> Result<()> + Send + Sync + 'static,
    {
        self.start_calibration = Some(Box::new(move |ctx: &Context, ()| f(ctx)));
        self
    }

    /// Handle `stop_calibration`
    pub fn with_stop_calibration<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> Result<()> + Send + Sync + 'static,
    {
        self.stop_calibration = Some(Box::new(move |ctx: &Context, ()| f(ctx)));
        self
    }
}

impl fmt::Debug for InjectCompass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectCompass")
            .field("readings", &self.readings.is_some())
            .field("heading", &self.heading.is_some())
            .field("start_calibration", &self.start_calibration.is_some())
            .field("stop_calibration", &self.stop_calibration.is_some())
            .finish()
    }
}

#[async_trait]
impl Component for InjectCompass {}

#[async_trait]
impl Sensor for InjectCompass {
    async fn readings(&self, ctx: &Context) -> Result<Vec<Value>> {
        match &self.readings {
            Some(hook) => hook(ctx, ()),
            None => Ok(vec![Value::Float(self.heading(ctx).await?)]),
        }
    }
}

#[async_trait]
impl Compass for InjectCompass {
    async fn heading(&self, ctx: &Context) -> Result<f64> {
        let hook = self.heading.as_ref().ok_or_else(|| missing("heading"))?;
        hook(ctx, ())
    }

    async fn start_calibration(&self, ctx: &Context) -> Result<()> {
        let hook = self
            .start_calibration
            .as_ref()
            .ok_or_else(|| missing("start_calibration"))?;
        hook(ctx, ())
    }

    async fn stop_calibration(&self, ctx: &Context) -> Result<()> {
        let hook = self
            .stop_calibration
            .as_ref()
            .ok_or_else(|| missing("stop_calibration"))?;
        hook(ctx, ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_hooks_are_unsupported() {
        let ctx = Context::background();
        let err = InjectBase::new().stop(&ctx).await.unwrap_err();
        assert!(matches!(err, ComponentError::Unsupported(_)));
        assert_eq!(err.to_string(), "stop not injected");

        let err = InjectServo::new().angular_offset(&ctx).await.unwrap_err();
        assert!(matches!(err, ComponentError::Unsupported(_)));
        assert!(InjectCompass::new().readings(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_close_hook() {
        let base = InjectBase::new().with_close(|_| Err(ComponentError::domain("busy")));
        assert_eq!(
            base.close(&Context::background()).await.unwrap_err().to_string(),
            "busy"
        );
        assert!(InjectServo::new().close(&Context::background()).await.is_ok());
    }
}
