/*!
 * Connections that carry requests to a server.
 *
 * `TcpConnection` multiplexes calls over one stream: a background reader
 * routes each response to the caller waiting for its request id, so a call
 * that gave up (cancelled, deadline passed) simply stops waiting and its late
 * reply is dropped. `LocalConnection` hands requests straight to an in-process
 * router but still round-trips every envelope through JSON.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use robokit_components::error::{ComponentError, Result};
use robokit_core::config::RpcConfig;
use robokit_core::context::Context;
use robokit_core::types::Id;

use crate::server::Router;
use crate::wire::{self, Request, Response};

/// A channel able to perform unary calls
#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    /// Send `payload` to `method` and wait for the reply payload
    async fn call(
        &self,
        ctx: &Context,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value>;

    /// Close the connection; later calls fail with `ConnectionClosed`
    ///
    /// Closing an already closed connection does nothing.
    async fn close(&self) -> Result<()>;

    /// Whether `close` was called or the peer went away
    fn is_closed(&self) -> bool;
}

/// Typed call: encode `request`, call `method`, decode the reply
pub async fn invoke<Req, Resp>(
    conn: &dyn Connection,
    ctx: &Context,
    method: &str,
    request: &Req,
) -> Result<Resp>
where
    Req: Serialize + Sync,
    Resp: DeserializeOwned,
{
    let payload = wire::to_payload(request)?;
    let reply = conn.call(ctx, method, payload).await?;
    wire::from_payload(reply)
}

/// Milliseconds left on `ctx`, rounded up so a live deadline never reads as 0
fn timeout_ms(ctx: &Context) -> Option<u64> {
    ctx.remaining().map(|remaining| {
        let ms = remaining.as_millis();
        let ms = if Duration::from_millis(ms as u64) < remaining {
            ms + 1
        } else {
            ms
        };
        u64::try_from(ms).unwrap_or(u64::MAX)
    })
}

/// Calls waiting for their reply, and whether new calls may start
#[derive(Default)]
struct CallTable {
    closed: bool,
    waiting: HashMap<u64, oneshot::Sender<Response>>,
}

type Pending = Arc<StdMutex<CallTable>>;

/// Mark the table closed and wake every waiting call
///
/// Returns false if it was closed already.
fn close_calls(pending: &Pending) -> bool {
    match pending.lock() {
        Ok(mut calls) => {
            // Dropping the senders wakes the callers with `ConnectionClosed`
            calls.waiting.clear();
            !std::mem::replace(&mut calls.closed, true)
        }
        Err(_) => false,
    }
}

/// Removes the pending entry of a call that stopped waiting
struct PendingGuard<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut calls) = self.pending.lock() {
            calls.waiting.remove(&self.id);
        }
    }
}

/// Client side of a TCP connection
///
/// Two tasks own the stream: a writer that sends queued frames one at a
/// time and a reader that routes replies. Callers never touch the socket, so
/// a caller that gives up cannot leave half a frame behind.
pub struct TcpConnection {
    id: Id,
    peer: String,
    frames: mpsc::UnboundedSender<Vec<u8>>,
    pending: Pending,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    max_frame_length: usize,
}

impl fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl TcpConnection {
    /// Connect to `address`
    pub async fn connect(ctx: &Context, address: &str, config: &RpcConfig) -> Result<Self> {
        let stream = ctx
            .run(async {
                TcpStream::connect(address).await.map_err(|e| {
                    ComponentError::transport(format!("failed to connect to {address}: {e}"))
                })
            })
            .await?;
        let _ = stream.set_nodelay(true);
        Ok(Self::from_stream(stream, config.max_frame_length))
    }

    /// Use an already connected stream
    pub fn from_stream(stream: TcpStream, max_frame_length: usize) -> Self {
        let id = Id::new();
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (reader, writer) = stream.into_split();

        let pending: Pending = Arc::new(StdMutex::new(CallTable::default()));
        let shutdown = CancellationToken::new();
        let (frames, queued) = mpsc::unbounded_channel();

        tokio::spawn(read_responses(
            reader,
            pending.clone(),
            shutdown.clone(),
            max_frame_length,
            id.clone(),
        ));
        tokio::spawn(write_requests(
            writer,
            queued,
            pending.clone(),
            shutdown.clone(),
            id.clone(),
        ));
        info!(connection = %id, peer = %peer, "Connected");

        Self {
            id,
            peer,
            frames,
            pending,
            next_id: AtomicU64::new(0),
            shutdown,
            max_frame_length,
        }
    }

    /// Connection id used in logs
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Address of the server
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

async fn read_responses(
    mut reader: OwnedReadHalf,
    pending: Pending,
    shutdown: CancellationToken,
    max_frame_length: usize,
    connection: Id,
) {
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = wire::read_frame::<_, Response>(&mut reader, max_frame_length) => frame,
        };
        match frame {
            Ok(Some(response)) => {
                let waiter = pending
                    .lock()
                    .ok()
                    .and_then(|mut calls| calls.waiting.remove(&response.id));
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(response);
                    }
                    None => debug!(connection = %connection, id = response.id, "Discarding reply nobody waits for"),
                }
            }
            Ok(None) => {
                debug!(connection = %connection, "Server closed the connection");
                break;
            }
            Err(err) => {
                warn!(connection = %connection, error = %err, "Connection failed");
                break;
            }
        }
    }

    close_calls(&pending);
    shutdown.cancel();
}

async fn write_requests(
    mut writer: OwnedWriteHalf,
    mut queued: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: Pending,
    shutdown: CancellationToken,
    connection: Id,
) {
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = queued.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        let written = match writer.write_all(&frame).await {
            Ok(()) => writer.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            warn!(connection = %connection, error = %err, "Failed to send request");
            break;
        }
    }

    close_calls(&pending);
    shutdown.cancel();
    let _ = writer.shutdown().await;
}

#[async_trait]
impl Connection for TcpConnection {
    async fn call(
        &self,
        ctx: &Context,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value> {
        if self.is_closed() {
            return Err(ComponentError::ConnectionClosed);
        }
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Request {
            id,
            method: method.to_string(),
            timeout_ms: timeout_ms(ctx),
            payload,
        };
        let frame = wire::encode_frame(&request, self.max_frame_length)?;

        let (sender, receiver) = oneshot::channel();
        {
            let mut calls = self
                .pending
                .lock()
                .map_err(|_| ComponentError::transport("pending call table poisoned"))?;
            // Checked under the lock the closing side takes, so a call either
            // sees the connection closed or is woken when it closes.
            if calls.closed {
                return Err(ComponentError::ConnectionClosed);
            }
            calls.waiting.insert(id, sender);
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        self.frames
            .send(frame)
            .map_err(|_| ComponentError::ConnectionClosed)?;

        let response = ctx
            .run(async {
                receiver
                    .await
                    .map_err(|_| ComponentError::ConnectionClosed)
            })
            .await?;
        response.into_result()
    }

    async fn close(&self) -> Result<()> {
        if close_calls(&self.pending) {
            info!(connection = %self.id, peer = %self.peer, "Closed");
        }
        self.shutdown.cancel();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.pending.lock().map(|calls| calls.closed).unwrap_or(true)
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// In-process connection to a router
pub struct LocalConnection {
    router: Arc<Router>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl fmt::Debug for LocalConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalConnection")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LocalConnection {
    /// Connect to `router`
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }
}

fn reencode<T: Serialize + DeserializeOwned>(message: &T) -> Result<T> {
    let bytes = serde_json::to_vec(message)
        .map_err(|e| ComponentError::transport(format!("failed to encode frame: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ComponentError::transport(format!("malformed frame: {e}")))
}

#[async_trait]
impl Connection for LocalConnection {
    async fn call(
        &self,
        ctx: &Context,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value> {
        if self.is_closed() {
            return Err(ComponentError::ConnectionClosed);
        }
        let request = reencode(&Request {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            method: method.to_string(),
            timeout_ms: timeout_ms(ctx),
            payload,
        })?;

        // The server side gets its own context, as it would over the network,
        // but is cancelled together with the caller.
        let server_ctx = ctx.child();
        let response = ctx
            .run(async { Ok::<_, ComponentError>(self.router.dispatch(&server_ctx, request).await) })
            .await;
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                server_ctx.cancel();
                return Err(err);
            }
        };
        reencode(&response)?.into_result()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_ms() {
        assert_eq!(timeout_ms(&Context::background()), None);

        let ctx = Context::background().with_timeout(Duration::from_secs(10));
        let ms = timeout_ms(&ctx).unwrap();
        assert!((9_900..=10_000).contains(&ms), "{ms}");

        let expired = Context::background().with_timeout(Duration::ZERO);
        assert_eq!(timeout_ms(&expired), Some(0));
    }

    #[tokio::test]
    async fn test_closed_tcp_connection_rejects_calls() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let accept = tokio::spawn(async move { listener.accept().await });

        let conn = TcpConnection::connect(&Context::background(), &address, &RpcConfig::default())
            .await
            .unwrap();
        let _server_side = accept.await.unwrap().unwrap();

        assert!(!conn.is_closed());
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert!(conn.is_closed());

        let err = conn
            .call(&Context::background(), wire::method::BASE_STOP, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ComponentError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_calls_fail_when_the_server_hangs_up() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        for _ in 0..20 {
            let conn = TcpConnection::connect(&Context::background(), &address, &RpcConfig::default())
                .await
                .unwrap();
            for _ in 0..10 {
                let result = tokio::time::timeout(
                    Duration::from_secs(5),
                    conn.call(
                        &Context::background(),
                        wire::method::BASE_STOP,
                        serde_json::json!({"name": "base1"}),
                    ),
                )
                .await
                .expect("call returned instead of hanging");
                assert!(matches!(result, Err(ComponentError::ConnectionClosed)));
            }
            assert!(conn.is_closed());
        }
    }

    #[tokio::test]
    async fn test_abandoned_calls_leave_whole_frames() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut ids = Vec::new();
            while let Some(request) = wire::read_frame::<_, Request>(&mut stream, 1 << 20)
                .await
                .unwrap()
            {
                ids.push(request.id);
            }
            ids
        });

        let conn = TcpConnection::connect(&Context::background(), &address, &RpcConfig::default())
            .await
            .unwrap();
        let payload = serde_json::json!({"name": "x".repeat(64 * 1024)});
        for i in 0..50 {
            let _ = tokio::time::timeout(
                Duration::from_micros(i),
                conn.call(&Context::background(), wire::method::BASE_STOP, payload.clone()),
            )
            .await;
        }
        conn.close().await.unwrap();

        // Every request that reached the socket arrived intact and in order
        let ids = server.await.unwrap();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]), "{ids:?}");
    }

    #[tokio::test]
    async fn test_connect_failure_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = TcpConnection::connect(&Context::background(), &address, &RpcConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ComponentError::Transport(_)));
    }
}
