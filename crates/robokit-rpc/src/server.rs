/*!
 * Server side: method routing, per-subtype services and the TCP listener.
 *
 * A service resolves the request's short name through the registry with the
 * subtype's typed lookup, so a missing name fails `NotFound` and a resource of
 * another kind fails "<name> is not a <subtype>" before any driver is
 * reached. Driver errors travel back with their text intact.
 */
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use robokit_components::error::{ComponentError, Result};
use robokit_components::registry::Registry;
use robokit_components::{base, sensor, servo};
use robokit_core::config::RpcConfig;
use robokit_core::context::Context;
use robokit_core::logging::operation_span;
use robokit_core::types::Id;

use crate::status::Status;
use crate::transport::LocalConnection;
use crate::wire::{
    self, method, AngularOffsetResponse, Empty, GetReadingsResponse, MoveArcRequest,
    MoveStraightRequest, NameRequest, Request, Response, ServoMoveRequest, SpinRequest,
    WidthGetResponse,
};

type Handler = Arc<
    dyn Fn(Context, Arc<Registry>, serde_json::Value) -> BoxFuture<'static, Result<serde_json::Value>>
        + Send
        + Sync,
>;

/// Maps method names to handlers over one registry
pub struct Router {
    registry: Arc<Registry>,
    handlers: HashMap<&'static str, Handler>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.handlers.keys().collect();
        methods.sort();
        f.debug_struct("Router")
            .field("registry", &self.registry)
            .field("methods", &methods)
            .finish()
    }
}

impl Router {
    /// A router with no methods
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            handlers: HashMap::new(),
        }
    }

    /// A router serving the base, servo and sensor services
    pub fn with_default_services(registry: Arc<Registry>) -> Self {
        let mut router = Self::new(registry);
        BaseService::register(&mut router);
        ServoService::register(&mut router);
        SensorService::register(&mut router);
        router
    }

    /// Route `method` to `handler`
    pub fn route<Req, Resp, F, Fut>(&mut self, method: &'static str, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + 'static,
        F: Fn(Context, Arc<Registry>, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: Handler = Arc::new(move |ctx: Context, registry: Arc<Registry>, payload: serde_json::Value| {
            let handler = handler.clone();
            async move {
                let request: Req = serde_json::from_value(payload).map_err(|e| {
                    ComponentError::invalid_argument(format!("bad request for {method}: {e}"))
                })?;
                let reply = (*handler)(ctx, registry, request).await?;
                wire::to_payload(&reply)
            }
            .boxed()
        });
        self.handlers.insert(method, erased);
    }

    /// Registered method names
    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<_> = self.handlers.keys().copied().collect();
        methods.sort_unstable();
        methods
    }

    /// The registry the services resolve names in
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Run one request
    ///
    /// The call runs in a child of `ctx`, bounded by the caller's remaining
    /// time when the request carries one.
    pub async fn dispatch(&self, ctx: &Context, request: Request) -> Response {
        let Request {
            id,
            method,
            timeout_ms,
            payload,
        } = request;

        let Some(handler) = self.handlers.get(method.as_str()).cloned() else {
            warn!(method = %method, "Unknown method");
            return Response::err(id, Status::unimplemented(format!("unknown method {method}")));
        };

        let resource = payload
            .get("name")
            .and_then(|name| name.as_str())
            .unwrap_or_default()
            .to_string();
        let call_ctx = match timeout_ms {
            Some(ms) => ctx.with_timeout(Duration::from_millis(ms)),
            None => ctx.child(),
        };

        let span = operation_span(&method, &resource);
        async {
            debug!("Dispatching");
            let result = call_ctx
                .run((*handler)(call_ctx.clone(), self.registry.clone(), payload))
                .await;
            match result {
                Ok(reply) => Response::ok(id, reply),
                Err(err) => {
                    debug!(error = %err, "Call failed");
                    Response::err(id, Status::from(&err))
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// `BaseService`
#[derive(Debug)]
pub struct BaseService;

impl BaseService {
    /// Add the service's methods to `router`
    pub fn register(router: &mut Router) {
        router.route(method::BASE_MOVE_STRAIGHT, Self::move_straight);
        router.route(method::BASE_MOVE_ARC, Self::move_arc);
        router.route(method::BASE_SPIN, Self::spin);
        router.route(method::BASE_STOP, Self::stop);
        router.route(method::BASE_WIDTH_GET, Self::width_get);
    }

    async fn move_straight(
        ctx: Context,
        registry: Arc<Registry>,
        req: MoveStraightRequest,
    ) -> Result<Empty> {
        let base = base::from_registry(&registry, &req.name)?;
        base.move_straight(&ctx, req.distance_mm, req.mm_per_sec, req.block)
            .await?;
        Ok(Empty {})
    }

    async fn move_arc(ctx: Context, registry: Arc<Registry>, req: MoveArcRequest) -> Result<Empty> {
        let base = base::from_registry(&registry, &req.name)?;
        base.move_arc(&ctx, req.distance_mm, req.mm_per_sec, req.degs_per_sec, req.block)
            .await?;
        Ok(Empty {})
    }

    async fn spin(ctx: Context, registry: Arc<Registry>, req: SpinRequest) -> Result<Empty> {
        let base = base::from_registry(&registry, &req.name)?;
        base.spin(&ctx, req.angle_deg, req.degs_per_sec, req.block)
            .await?;
        Ok(Empty {})
    }

    async fn stop(ctx: Context, registry: Arc<Registry>, req: NameRequest) -> Result<Empty> {
        base::from_registry(&registry, &req.name)?.stop(&ctx).await?;
        Ok(Empty {})
    }

    async fn width_get(
        ctx: Context,
        registry: Arc<Registry>,
        req: NameRequest,
    ) -> Result<WidthGetResponse> {
        let width_mm = base::from_registry(&registry, &req.name)?
            .width_get(&ctx)
            .await?;
        Ok(WidthGetResponse { width_mm })
    }
}

/// `ServoService`
#[derive(Debug)]
pub struct ServoService;

impl ServoService {
    /// Add the service's methods to `router`
    pub fn register(router: &mut Router) {
        router.route(method::SERVO_MOVE, Self::move_to);
        router.route(method::SERVO_ANGULAR_OFFSET, Self::angular_offset);
    }

    async fn move_to(ctx: Context, registry: Arc<Registry>, req: ServoMoveRequest) -> Result<Empty> {
        let servo = servo::from_registry(&registry, &req.name)?;
        servo.move_to(&ctx, wire::narrow_angle(req.angle_deg)).await?;
        Ok(Empty {})
    }

    async fn angular_offset(
        ctx: Context,
        registry: Arc<Registry>,
        req: NameRequest,
    ) -> Result<AngularOffsetResponse> {
        let angle = servo::from_registry(&registry, &req.name)?
            .angular_offset(&ctx)
            .await?;
        Ok(AngularOffsetResponse {
            angle_deg: u32::from(angle),
        })
    }
}

/// `SensorService`
#[derive(Debug)]
pub struct SensorService;

impl SensorService {
    /// Add the service's methods to `router`
    pub fn register(router: &mut Router) {
        router.route(method::SENSOR_GET_READINGS, Self::get_readings);
    }

    async fn get_readings(
        ctx: Context,
        registry: Arc<Registry>,
        req: NameRequest,
    ) -> Result<GetReadingsResponse> {
        let readings = sensor::from_registry(&registry, &req.name)?
            .readings(&ctx)
            .await?;
        Ok(GetReadingsResponse { readings })
    }
}

/// Serves a router over TCP
#[derive(Debug)]
pub struct RpcServer {
    router: Arc<Router>,
    config: RpcConfig,
    shutdown: CancellationToken,
}

impl RpcServer {
    /// A server exposing the default services over `registry`
    pub fn new(registry: Arc<Registry>, config: RpcConfig) -> Self {
        Self::with_router(Router::with_default_services(registry), config)
    }

    /// A server exposing `router`
    pub fn with_router(router: Router, config: RpcConfig) -> Self {
        Self {
            router: Arc::new(router),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// The router requests are dispatched to
    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    /// An in-process connection to this server
    pub fn local_connection(&self) -> LocalConnection {
        LocalConnection::new(self.router.clone())
    }

    /// Listen on the configured bind address
    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(&self.config.bind_address)
            .await
            .map_err(|e| {
                ComponentError::transport(format!(
                    "failed to bind {}: {e}",
                    self.config.bind_address
                ))
            })
    }

    /// Stop accepting connections and cancel in-flight calls
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token cancelled by `shutdown`
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept connections on `listener` until `shutdown` is called
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let address = listener
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        info!(address = %address, methods = self.router.methods().len(), "RPC server listening");

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    let _ = stream.set_nodelay(true);
                    tokio::spawn(serve_connection(
                        stream,
                        peer.to_string(),
                        self.router.clone(),
                        self.shutdown.child_token(),
                        self.config.max_frame_length,
                    ));
                }
                Err(err) => {
                    error!(error = %err, "Failed to accept connection");
                }
            }
        }

        info!(address = %address, "RPC server stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: String,
    router: Arc<Router>,
    shutdown: CancellationToken,
    max_frame_length: usize,
) {
    let connection = Id::new();
    info!(connection = %connection, peer = %peer, "Accepted connection");

    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(Mutex::new(writer));
    let ctx = Context::from_token(shutdown.clone());

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = wire::read_frame::<_, Request>(&mut reader, max_frame_length) => frame,
        };
        let request = match frame {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(err) => {
                warn!(connection = %connection, error = %err, "Dropping connection");
                break;
            }
        };

        // Calls on one connection run concurrently; replies carry the request
        // id so their order does not matter.
        let router = router.clone();
        let writer = writer.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let response = router.dispatch(&ctx, request).await;
            let mut writer = writer.lock().await;
            if let Err(err) = wire::write_frame(&mut *writer, &response, max_frame_length).await {
                debug!(error = %err, "Failed to write reply");
            }
        });
    }

    // Calls still running on this connection have nobody to answer to
    shutdown.cancel();
    info!(connection = %connection, peer = %peer, "Connection closed");
}
