/*!
 * Client adapters.
 *
 * Each client implements its subtype's component contract by turning every
 * call into one request on a `Connection`. Errors come back as they were
 * reported; nothing is retried here. A client can therefore be registered
 * and wrapped like any local driver.
 */
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use robokit_components::base::Base;
use robokit_components::error::Result;
use robokit_components::reconfigurable::Component;
use robokit_components::sensor::Sensor;
use robokit_components::servo::Servo;
use robokit_core::config::RpcConfig;
use robokit_core::context::Context;
use robokit_core::types::Value;

use crate::transport::{self, Connection, TcpConnection};
use crate::wire::{
    self, method, AngularOffsetResponse, Empty, GetReadingsResponse, MoveArcRequest,
    MoveStraightRequest, NameRequest, ServoMoveRequest, SpinRequest, WidthGetResponse,
};

/// What every client holds: the connection, the target and a default timeout
struct Remote {
    conn: Arc<dyn Connection>,
    name: String,
    default_timeout: Option<Duration>,
}

impl Remote {
    fn new(conn: Arc<dyn Connection>, name: &str) -> Self {
        Self {
            conn,
            name: name.to_string(),
            default_timeout: None,
        }
    }

    async fn dial(ctx: &Context, address: &str, config: &RpcConfig, name: &str) -> Result<Self> {
        let conn = TcpConnection::connect(ctx, address, config).await?;
        let mut remote = Self::new(Arc::new(conn), name);
        remote.default_timeout = config.request_timeout();
        Ok(remote)
    }

    fn name_request(&self) -> NameRequest {
        NameRequest {
            name: self.name.clone(),
        }
    }

    async fn invoke<Req, Resp>(&self, ctx: &Context, method: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        match (ctx.deadline(), self.default_timeout) {
            (None, Some(timeout)) => {
                let ctx = ctx.with_timeout(timeout);
                transport::invoke(self.conn.as_ref(), &ctx, method, request).await
            }
            _ => transport::invoke(self.conn.as_ref(), ctx, method, request).await,
        }
    }

    async fn close(&self) -> Result<()> {
        self.conn.close().await
    }
}

impl fmt::Debug for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remote")
            .field("name", &self.name)
            .field("conn", &self.conn)
            .finish()
    }
}

/// A base on the other side of a connection
#[derive(Debug)]
pub struct BaseClient {
    remote: Remote,
}

impl BaseClient {
    /// Use `conn` to reach the base called `name`
    pub fn new(conn: Arc<dyn Connection>, name: &str) -> Self {
        Self {
            remote: Remote::new(conn, name),
        }
    }

    /// Open a connection to `address` and reach the base called `name`
    pub async fn dial(ctx: &Context, address: &str, config: &RpcConfig, name: &str) -> Result<Self> {
        Ok(Self {
            remote: Remote::dial(ctx, address, config, name).await?,
        })
    }

    /// Short name of the remote base
    pub fn name(&self) -> &str {
        &self.remote.name
    }
}

#[async_trait]
impl Component for BaseClient {
    async fn close(&self, _ctx: &Context) -> Result<()> {
        self.remote.close().await
    }
}

#[async_trait]
impl Base for BaseClient {
    async fn move_straight(
        &self,
        ctx: &Context,
        distance_mm: i64,
        mm_per_sec: f64,
        block: bool,
    ) -> Result<()> {
        let request = MoveStraightRequest {
            name: self.remote.name.clone(),
            distance_mm,
            mm_per_sec,
            block,
        };
        let _: Empty = self
            .remote
            .invoke(ctx, method::BASE_MOVE_STRAIGHT, &request)
            .await?;
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
        let request = MoveArcRequest {
            name: self.remote.name.clone(),
            distance_mm,
            mm_per_sec,
            degs_per_sec,
            block,
        };
        let _: Empty = self
            .remote
            .invoke(ctx, method::BASE_MOVE_ARC, &request)
            .await?;
        Ok(())
    }

    async fn spin(&self, ctx: &Context, angle_deg: f64, degs_per_sec: f64, block: bool) -> Result<()> {
        let request = SpinRequest {
            name: self.remote.name.clone(),
            angle_deg,
            degs_per_sec,
            block,
        };
        let _: Empty = self.remote.invoke(ctx, method::BASE_SPIN, &request).await?;
        Ok(())
    }

    async fn stop(&self, ctx: &Context) -> Result<()> {
        let _: Empty = self
            .remote
            .invoke(ctx, method::BASE_STOP, &self.remote.name_request())
            .await?;
        Ok(())
    }

    async fn width_get(&self, ctx: &Context) -> Result<i64> {
        let response: WidthGetResponse = self
            .remote
            .invoke(ctx, method::BASE_WIDTH_GET, &self.remote.name_request())
            .await?;
        Ok(response.width_mm)
    }
}

/// A servo on the other side of a connection
#[derive(Debug)]
pub struct ServoClient {
    remote: Remote,
}

impl ServoClient {
    /// Use `conn` to reach the servo called `name`
    pub fn new(conn: Arc<dyn Connection>, name: &str) -> Self {
        Self {
            remote: Remote::new(conn, name),
        }
    }

    /// Open a connection to `address` and reach the servo called `name`
    pub async fn dial(ctx: &Context, address: &str, config: &RpcConfig, name: &str) -> Result<Self> {
        Ok(Self {
            remote: Remote::dial(ctx, address, config, name).await?,
        })
    }

    /// Short name of the remote servo
    pub fn name(&self) -> &str {
        &self.remote.name
    }
}

#[async_trait]
impl Component for ServoClient {
    async fn close(&self, _ctx: &Context) -> Result<()> {
        self.remote.close().await
    }
}

#[async_trait]
impl Servo for ServoClient {
    async fn move_to(&self, ctx: &Context, angle_deg: u8) -> Result<()> {
        let request = ServoMoveRequest {
            name: self.remote.name.clone(),
            angle_deg: u32::from(angle_deg),
        };
        let _: Empty = self.remote.invoke(ctx, method::SERVO_MOVE, &request).await?;
        Ok(())
    }

    async fn angular_offset(&self, ctx: &Context) -> Result<u8> {
        let response: AngularOffsetResponse = self
            .remote
            .invoke(ctx, method::SERVO_ANGULAR_OFFSET, &self.remote.name_request())
            .await?;
        Ok(wire::narrow_angle(response.angle_deg))
    }
}

/// A sensor on the other side of a connection
#[derive(Debug)]
pub struct SensorClient {
    remote: Remote,
}

impl SensorClient {
    /// Use `conn` to reach the sensor called `name`
    pub fn new(conn: Arc<dyn Connection>, name: &str) -> Self {
        Self {
            remote: Remote::new(conn, name),
        }
    }

    /// Open a connection to `address` and reach the sensor called `name`
    pub async fn dial(ctx: &Context, address: &str, config: &RpcConfig, name: &str) -> Result<Self> {
        Ok(Self {
            remote: Remote::dial(ctx, address, config, name).await?,
        })
    }

    /// Short name of the remote sensor
    pub fn name(&self) -> &str {
        &self.remote.name
    }
}

#[async_trait]
impl Component for SensorClient {
    async fn close(&self, _ctx: &Context) -> Result<()> {
        self.remote.close().await
    }
}

#[async_trait]
impl Sensor for SensorClient {
    async fn readings(&self, ctx: &Context) -> Result<Vec<Value>> {
        let response: GetReadingsResponse = self
            .remote
            .invoke(ctx, method::SENSOR_GET_READINGS, &self.remote.name_request())
            .await?;
        Ok(response.readings)
    }
}
