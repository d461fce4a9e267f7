/*!
 * In-memory drivers for every component subtype.
 *
 * The fakes keep just enough state to be observable from tests and demos;
 * they never block and never fail unless told to.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use robokit_core::context::Context;
use robokit_core::types::Value;

use crate::base::Base;
use crate::error::Result;
use crate::input::{Control, ControlFunction, Controller, Event, EventType};
use crate::reconfigurable::Component;
use crate::sensor::Sensor;
use crate::servo::Servo;

/// Last motion commanded on a [`FakeBase`]
#[derive(Debug, Clone, PartialEq)]
pub enum Motion {
    /// Straight line
    Straight {
        /// Distance in millimeters
        distance_mm: i64,
        /// Speed in millimeters per second
        mm_per_sec: f64,
    },
    /// Arc
    Arc {
        /// Distance in millimeters
        distance_mm: i64,
        /// Speed in millimeters per second
        mm_per_sec: f64,
        /// Turn rate in degrees per second
        degs_per_sec: f64,
    },
    /// Spin in place
    Spin {
        /// Angle in degrees
        angle_deg: f64,
        /// Turn rate in degrees per second
        degs_per_sec: f64,
    },
}

#[derive(Debug, Default)]
struct BaseState {
    moving: bool,
    last_motion: Option<Motion>,
}

/// A base that records what it was asked to do
#[derive(Debug)]
pub struct FakeBase {
    width_mm: i64,
    state: Mutex<BaseState>,
    stops: AtomicUsize,
    closed: AtomicBool,
}

impl FakeBase {
    /// Create a base `width_mm` wide
    pub fn new(width_mm: i64) -> Self {
        Self {
            width_mm,
            state: Mutex::new(BaseState::default()),
            stops: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Whether a non-blocking motion is still in progress
    pub async fn is_moving(&self) -> bool {
        self.state.lock().await.moving
    }

    /// The last motion commanded
    pub async fn last_motion(&self) -> Option<Motion> {
        self.state.lock().await.last_motion.clone()
    }

    /// How many times the base stopped
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn start(&self, motion: Motion, block: bool) {
        debug!(?motion, block, "Fake base moving");
        let mut state = self.state.lock().await;
        // A blocking motion has already finished when the call returns
        state.moving = !block;
        state.last_motion = Some(motion);
    }

    async fn halt(&self) {
        let mut state = self.state.lock().await;
        state.moving = false;
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Component for FakeBase {
    async fn close(&self, _ctx: &Context) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Base for FakeBase {
    async fn move_straight(
        &self,
        _ctx: &Context,
        distance_mm: i64,
        mm_per_sec: f64,
        block: bool,
    ) -> Result<()> {
        if distance_mm == 0 || mm_per_sec == 0.0 {
            self.halt().await;
            return Ok(());
        }
        self.start(
            Motion::Straight {
                distance_mm,
                mm_per_sec,
            },
            block,
        )
        .await;
        Ok(())
    }

    async fn move_arc(
        &self,
        ctx: &Context,
        distance_mm: i64,
        mm_per_sec: f64,
        degs_per_sec: f64,
        block: bool,
    ) -> Result<()> {
        if mm_per_sec == 0.0 {
            self.halt().await;
            return Ok(());
        }
        if distance_mm == 0 {
            // One second worth of rotation
            return self.spin(ctx, degs_per_sec, degs_per_sec, block).await;
        }
        self.start(
            Motion::Arc {
                distance_mm,
                mm_per_sec,
                degs_per_sec,
            },
            block,
        )
        .await;
        Ok(())
    }

    async fn spin(
        &self,
        _ctx: &Context,
        angle_deg: f64,
        degs_per_sec: f64,
        block: bool,
    ) -> Result<()> {
        if degs_per_sec == 0.0 {
            self.halt().await;
            return Ok(());
        }
        self.start(
            Motion::Spin {
                angle_deg,
                degs_per_sec,
            },
            block,
        )
        .await;
        Ok(())
    }

    async fn stop(&self, _ctx: &Context) -> Result<()> {
        self.halt().await;
        Ok(())
    }

    async fn width_get(&self, _ctx: &Context) -> Result<i64> {
        Ok(self.width_mm)
    }
}

/// A servo that remembers the last angle it was moved to
#[derive(Debug, Default)]
pub struct FakeServo {
    angle: AtomicU8,
}

impl FakeServo {
    /// Create a servo at angle zero
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Component for FakeServo {}

#[async_trait]
impl Servo for FakeServo {
    async fn move_to(&self, _ctx: &Context, angle_deg: u8) -> Result<()> {
        self.angle.store(angle_deg, Ordering::SeqCst);
        Ok(())
    }

    async fn angular_offset(&self, _ctx: &Context) -> Result<u8> {
        Ok(self.angle.load(Ordering::SeqCst))
    }
}

/// A sensor returning fixed readings
#[derive(Debug, Clone, Default)]
pub struct FakeSensor {
    readings: Vec<Value>,
}

impl FakeSensor {
    /// Create a sensor that always reports `readings`
    pub fn new(readings: Vec<Value>) -> Self {
        Self { readings }
    }
}

#[async_trait]
impl Component for FakeSensor {}

#[async_trait]
impl Sensor for FakeSensor {
    async fn readings(&self, _ctx: &Context) -> Result<Vec<Value>> {
        Ok(self.readings.clone())
    }
}

/// Attributes of a [`FakeInputController`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FakeInputControllerConfig {
    /// Controls the fake reports
    #[serde(default)]
    pub controls: Vec<Control>,
}

/// An input controller with a fixed set of controls and no event source
pub struct FakeInputController {
    controls: Vec<Control>,
    last_events: Mutex<HashMap<Control, Event>>,
}

impl fmt::Debug for FakeInputController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeInputController")
            .field("controls", &self.controls)
            .finish()
    }
}

impl FakeInputController {
    /// Create a controller from its attributes
    pub fn new(config: FakeInputControllerConfig) -> Self {
        Self {
            controls: config.controls,
            last_events: Mutex::new(HashMap::new()),
        }
    }

    /// Store `event` as the latest state of its control
    pub async fn record_event(&self, event: Event) {
        self.last_events.lock().await.insert(event.control, event);
    }
}

#[async_trait]
impl Component for FakeInputController {}

#[async_trait]
impl Controller for FakeInputController {
    async fn controls(&self, _ctx: &Context) -> Result<Vec<Control>> {
        Ok(self.controls.clone())
    }

    async fn last_events(&self, _ctx: &Context) -> Result<HashMap<Control, Event>> {
        Ok(self.last_events.lock().await.clone())
    }

    async fn register_control_callback(
        &self,
        _ctx: &Context,
        _control: Control,
        _triggers: Vec<EventType>,
        _callback: ControlFunction,
    ) -> Result<()> {
        Err(crate::error::ComponentError::unsupported("unsupported"))
    }
}
