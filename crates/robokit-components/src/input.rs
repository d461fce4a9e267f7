/*!
 * Input controller component.
 *
 * Gamepads, joysticks and similar devices expose a set of controls. Each
 * control produces events; callers either poll the most recent event per
 * control or register a callback for selected event types.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use robokit_core::context::Context;

use crate::error::{ComponentError, Result};
use crate::reconfigurable::{expect_same, Component, Reconfigurable, ReconfigurableCell};
use crate::registry::{Registry, Resource};
use crate::resource::{Name, Subtype};

/// The input controller subtype
pub const SUBTYPE: Subtype = Subtype::component_with_label("input_controller", LABEL);

/// Label used for input controllers in error messages
pub const LABEL: &str = "input controller";

/// The typed resource name of the input controller called `name`
pub fn named(name: &str) -> Name {
    Name::from_subtype(&SUBTYPE, name)
}

/// A single input on a controller
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Control {
    AbsoluteX,
    AbsoluteY,
    AbsoluteZ,
    AbsoluteRX,
    AbsoluteRY,
    AbsoluteRZ,
    AbsoluteHat0X,
    AbsoluteHat0Y,
    ButtonSouth,
    ButtonEast,
    ButtonWest,
    ButtonNorth,
    ButtonLT,
    ButtonRT,
    ButtonSelect,
    ButtonStart,
    ButtonMenu,
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Kind of event a control produced
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Matches every other event type when registering callbacks
    AllEvents,
    Connect,
    Disconnect,
    ButtonPress,
    ButtonRelease,
    ButtonHold,
    ButtonChange,
    PositionChangeAbs,
    PositionChangeRel,
}

impl EventType {
    /// Whether a callback registered for `self` should fire on `other`
    pub fn matches(&self, other: EventType) -> bool {
        *self == EventType::AllEvents || *self == other
    }
}

/// Something that happened on a control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// When the event happened
    pub time: DateTime<Utc>,
    /// What happened
    pub event: EventType,
    /// The control it happened on
    pub control: Control,
    /// -1.0 to 1.0 for axes, 0 or 1 for buttons
    pub value: f64,
}

impl Event {
    /// An event stamped with the current time
    pub fn now(event: EventType, control: Control, value: f64) -> Self {
        Self {
            time: Utc::now(),
            event,
            control,
            value,
        }
    }
}

/// Callback invoked on a registered control event
pub type ControlFunction = Arc<dyn Fn(&Context, Event) + Send + Sync>;

/// A device with controls
#[async_trait]
pub trait Controller: Component {
    /// Controls the device offers
    async fn controls(&self, ctx: &Context) -> Result<Vec<Control>>;

    /// The most recent event of each control
    async fn last_events(&self, ctx: &Context) -> Result<HashMap<Control, Event>>;

    /// Run `callback` whenever `control` produces one of `triggers`
    async fn register_control_callback(
        &self,
        ctx: &Context,
        control: Control,
        triggers: Vec<EventType>,
        callback: ControlFunction,
    ) -> Result<()>;
}

/// Reconfigurable handle to an input controller
#[derive(Debug)]
pub struct ReconfigurableInputController {
    cell: ReconfigurableCell<dyn Controller>,
}

impl ReconfigurableInputController {
    /// Wrap `actual`
    pub fn new(actual: Arc<dyn Controller>) -> Self {
        Self {
            cell: ReconfigurableCell::new(actual),
        }
    }

    /// The controller currently held
    pub async fn proxy_for(&self) -> Arc<dyn Controller> {
        self.cell.current().await
    }
}

#[async_trait]
impl Component for ReconfigurableInputController {
    async fn close(&self, ctx: &Context) -> Result<()> {
        ctx.run(async { self.cell.read().await.close(ctx).await })
            .await
    }
}

#[async_trait]
impl Controller for ReconfigurableInputController {
    async fn controls(&self, ctx: &Context) -> Result<Vec<Control>> {
        ctx.run(async { self.cell.read().await.controls(ctx).await })
            .await
    }

    async fn last_events(&self, ctx: &Context) -> Result<HashMap<Control, Event>> {
        ctx.run(async { self.cell.read().await.last_events(ctx).await })
            .await
    }

    async fn register_control_callback(
        &self,
        ctx: &Context,
        control: Control,
        triggers: Vec<EventType>,
        callback: ControlFunction,
    ) -> Result<()> {
        ctx.run(async {
            self.cell
                .read()
                .await
                .register_control_callback(ctx, control, triggers, callback)
                .await
        })
        .await
    }
}

#[async_trait]
impl Reconfigurable for ReconfigurableInputController {
    async fn reconfigure(&self, ctx: &Context, new: &dyn Reconfigurable) -> Result<()> {
        let new = expect_same::<Self>(new)?;
        self.cell.replace_with(ctx, &new.cell).await
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Store `controller` in the registry form: a reconfigurable wrapper
pub fn into_resource<C: Controller + 'static>(controller: C) -> Resource {
    Arc::new(ReconfigurableInputController::new(Arc::new(controller)))
}

/// Convert a resource into a reconfigurable input controller
pub fn wrap_with_reconfigurable(resource: Resource) -> Result<Arc<ReconfigurableInputController>> {
    match resource.downcast::<ReconfigurableInputController>() {
        Ok(wrapper) => Ok(wrapper),
        Err(resource) => resource
            .downcast_ref::<Arc<dyn Controller>>()
            .map(|controller| Arc::new(ReconfigurableInputController::new(Arc::clone(controller))))
            .ok_or_else(|| ComponentError::TypeMismatch {
                expected: LABEL.to_string(),
                actual: "non-controller resource".to_string(),
            }),
    }
}

/// Recover an input controller from a registry entry
pub fn from_resource(resource: &Resource) -> Option<Arc<dyn Controller>> {
    if let Ok(wrapper) = Arc::clone(resource).downcast::<ReconfigurableInputController>() {
        return Some(wrapper);
    }
    resource.downcast_ref::<Arc<dyn Controller>>().cloned()
}

/// Look up the input controller called `name`
pub fn from_registry(registry: &Registry, name: &str) -> Result<Arc<dyn Controller>> {
    registry.lookup_as(&named(name), from_resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeInputController, FakeInputControllerConfig};

    fn gamepad() -> FakeInputController {
        FakeInputController::new(FakeInputControllerConfig {
            controls: vec![Control::AbsoluteX, Control::ButtonSouth],
        })
    }

    #[test]
    fn test_event_type_matches() {
        assert!(EventType::AllEvents.matches(EventType::ButtonPress));
        assert!(EventType::ButtonPress.matches(EventType::ButtonPress));
        assert!(!EventType::ButtonPress.matches(EventType::ButtonRelease));
    }

    #[test]
    fn test_event_serde() {
        let event = Event::now(EventType::ButtonPress, Control::ButtonSouth, 1.0);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"ButtonSouth\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn test_wrapper_forwards_to_fake() {
        let fake = Arc::new(gamepad());
        let controller = ReconfigurableInputController::new(fake.clone());
        let ctx = Context::background();

        assert_eq!(
            controller.controls(&ctx).await.unwrap(),
            vec![Control::AbsoluteX, Control::ButtonSouth]
        );
        assert!(controller.last_events(&ctx).await.unwrap().is_empty());

        fake.record_event(Event::now(EventType::PositionChangeAbs, Control::AbsoluteX, -0.5))
            .await;
        let events = controller.last_events(&ctx).await.unwrap();
        assert_eq!(events[&Control::AbsoluteX].value, -0.5);

        let callback: ControlFunction = Arc::new(|_: &Context, _: Event| {});
        let err = controller
            .register_control_callback(&ctx, Control::ButtonSouth, vec![EventType::AllEvents], callback)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unsupported");
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry =
            Registry::from_resources(vec![(named("gamepad"), into_resource(gamepad()))]).unwrap();
        assert!(from_registry(&registry, "gamepad").is_ok());
        assert_eq!(
            from_registry(&registry, "joystick").unwrap_err().to_string(),
            "no input controller named joystick"
        );
        let wrapped = wrap_with_reconfigurable(registry.lookup(&named("gamepad")).unwrap()).unwrap();
        assert_eq!(wrapped.controls(&Context::background()).await.unwrap().len(), 2);
    }
}
