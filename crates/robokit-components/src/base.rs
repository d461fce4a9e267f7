/*!
 * Base component: the platform a robot uses to move around.
 */
use std::sync::Arc;

use async_trait::async_trait;

use robokit_core::context::Context;

use crate::error::{ComponentError, Result};
use crate::reconfigurable::{expect_same, Component, Reconfigurable, ReconfigurableCell};
use crate::registry::{Registry, Resource};
use crate::resource::{Name, Subtype};

/// The base subtype
pub const SUBTYPE: Subtype = Subtype::component_with_label("base", LABEL);

/// Label used for bases in error messages
pub const LABEL: &str = "base";

/// The typed resource name of the base called `name`
pub fn named(name: &str) -> Name {
    Name::from_subtype(&SUBTYPE, name)
}

/// A physical base of a robot
#[async_trait]
pub trait Base: Component {
    /// Move straight `distance_mm` at `mm_per_sec`, optionally blocking until
    /// the move is complete. A distance or speed of zero stops the base.
    async fn move_straight(
        &self,
        ctx: &Context,
        distance_mm: i64,
        mm_per_sec: f64,
        block: bool,
    ) -> Result<()>;

    /// Move along an arc of `distance_mm` at `mm_per_sec` while turning at
    /// `degs_per_sec`. A distance of zero spins in place, a speed of zero
    /// stops the base.
    async fn move_arc(
        &self,
        ctx: &Context,
        distance_mm: i64,
        mm_per_sec: f64,
        degs_per_sec: f64,
        block: bool,
    ) -> Result<()>;

    /// Spin by `angle_deg` at `degs_per_sec`. A speed of zero stops the base.
    async fn spin(&self, ctx: &Context, angle_deg: f64, degs_per_sec: f64, block: bool)
        -> Result<()>;

    /// Stop the base immediately
    async fn stop(&self, ctx: &Context) -> Result<()>;

    /// Width of the base in millimeters
    async fn width_get(&self, ctx: &Context) -> Result<i64>;
}

/// A spin followed by a straight move
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Move {
    /// Straight distance in millimeters
    pub distance_mm: i64,
    /// Straight speed
    pub mm_per_sec: f64,
    /// Spin angle in degrees
    pub angle_deg: f64,
    /// Spin speed
    pub degs_per_sec: f64,
    /// Whether to wait for each step to complete
    pub block: bool,
}

/// Perform `mv` on `base`: spin first if the angle is non-zero, then move
/// straight if the distance is non-zero
pub async fn do_move(ctx: &Context, mv: Move, base: &dyn Base) -> Result<()> {
    if mv.angle_deg != 0.0 {
        base.spin(ctx, mv.angle_deg, mv.degs_per_sec, mv.block).await?;
    }

    if mv.distance_mm != 0 {
        base.move_straight(ctx, mv.distance_mm, mv.mm_per_sec, mv.block)
            .await?;
    }

    Ok(())
}

/// Reconfigurable handle to a base
#[derive(Debug)]
pub struct ReconfigurableBase {
    cell: ReconfigurableCell<dyn Base>,
}

impl ReconfigurableBase {
    /// Wrap `actual`
    pub fn new(actual: Arc<dyn Base>) -> Self {
        Self {
            cell: ReconfigurableCell::new(actual),
        }
    }

    /// The base currently held
    pub async fn proxy_for(&self) -> Arc<dyn Base> {
        self.cell.current().await
    }
}

#[async_trait]
impl Component for ReconfigurableBase {
    async fn close(&self, ctx: &Context) -> Result<()> {
        ctx.run(async { self.cell.read().await.close(ctx).await })
            .await
    }
}

#[async_trait]
impl Base for ReconfigurableBase {
    async fn move_straight(
        &self,
        ctx: &Context,
        distance_mm: i64,
        mm_per_sec: f64,
        block: bool,
    ) -> Result<()> {
        ctx.run(async {
            self.cell
                .read()
                .await
                .move_straight(ctx, distance_mm, mm_per_sec, block)
                .await
        })
        .await
    }

    async fn move_arc(
        &self,
        ctx: &Context,
        distance_mm: i64,
        mm_per_sec: f64,
        degs_per_sec: f64,
        block: bool,
    ) -> Result<()> {
        ctx.run(async {
            self.cell
                .read()
                .await
                .move_arc(ctx, distance_mm, mm_per_sec, degs_per_sec, block)
                .await
        })
        .await
    }

    async fn spin(
        &self,
        ctx: &Context,
        angle_deg: f64,
        degs_per_sec: f64,
        block: bool,
    ) -> Result<()> {
        ctx.run(async {
            self.cell
                .read()
                .await
                .spin(ctx, angle_deg, degs_per_sec, block)
                .await
        })
        .await
    }

    async fn stop(&self, ctx: &Context) -> Result<()> {
        ctx.run(async { self.cell.read().await.stop(ctx).await })
            .await
    }

    async fn width_get(&self, ctx: &Context) -> Result<i64> {
        ctx.run(async { self.cell.read().await.width_get(ctx).await })
            .await
    }
}

#[async_trait]
impl Reconfigurable for ReconfigurableBase {
    async fn reconfigure(&self, ctx: &Context, new: &dyn Reconfigurable) -> Result<()> {
        let new = expect_same::<Self>(new)?;
        self.cell.replace_with(ctx, &new.cell).await
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Store `base` in the registry form: a reconfigurable wrapper
pub fn into_resource<B: Base + 'static>(base: B) -> Resource {
    Arc::new(ReconfigurableBase::new(Arc::new(base)))
}

/// Convert a resource into a reconfigurable base
///
/// A resource that already is a `ReconfigurableBase` is returned as is; a
/// bare `Arc<dyn Base>` gets wrapped.
pub fn wrap_with_reconfigurable(resource: Resource) -> Result<Arc<ReconfigurableBase>> {
    match resource.downcast::<ReconfigurableBase>() {
        Ok(wrapper) => Ok(wrapper),
        Err(resource) => resource
            .downcast_ref::<Arc<dyn Base>>()
            .map(|base| Arc::new(ReconfigurableBase::new(Arc::clone(base))))
            .ok_or_else(|| ComponentError::TypeMismatch {
                expected: LABEL.to_string(),
                actual: "non-base resource".to_string(),
            }),
    }
}

/// Recover a base from a registry entry
pub fn from_resource(resource: &Resource) -> Option<Arc<dyn Base>> {
    if let Ok(wrapper) = Arc::clone(resource).downcast::<ReconfigurableBase>() {
        return Some(wrapper);
    }
    resource.downcast_ref::<Arc<dyn Base>>().cloned()
}

/// Look up the base called `name`
pub fn from_registry(registry: &Registry, name: &str) -> Result<Arc<dyn Base>> {
    registry.lookup_as(&named(name), from_resource)
}
