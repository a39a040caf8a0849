//! Maelstrom node runtime
//!
//! Reads newline-delimited JSON messages from an input stream and writes
//! replies to an output stream. Inbound requests are dispatched to registered
//! [`Handler`]s on their own tasks; inbound replies are routed back to the
//! [`Transport::send`] call waiting on them.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::messages::{kinds, ErrorResponse, InitRequest};
use super::{Body, Handler, MemberId, Message, Transport};
use crate::error::{ProtocolError, Result, TreecastError};
use crate::{concurrency_error, config_error, node_error, transport_error};

#[derive(Clone, Debug)]
struct Identity {
    id: MemberId,
    members: Vec<MemberId>,
}

/// Counters for the runtime
#[derive(Debug, Default)]
pub struct RuntimeStats {
    pub messages_received: AtomicU64,
    pub messages_sent: AtomicU64,
    pub parse_errors: AtomicU64,
    pub rpc_timeouts: AtomicU64,
}

pub struct Node {
    identity: RwLock<Option<Identity>>,
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
    next_msg_id: AtomicU64,
    // msg_id -> caller waiting for the reply
    pending_replies: DashMap<u64, oneshot::Sender<Message>>,
    outbox_tx: mpsc::UnboundedSender<Message>,
    outbox_rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    rpc_timeout: Duration,
    stats: RuntimeStats,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.display_id())
            .field("pending_replies", &self.pending_replies.len())
            .field("rpc_timeout", &self.rpc_timeout)
            .finish()
    }
}

impl Node {
    pub fn new(rpc_timeout: Duration) -> Arc<Self> {
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            identity: RwLock::new(None),
            handlers: RwLock::new(HashMap::new()),
            next_msg_id: AtomicU64::new(0),
            pending_replies: DashMap::new(),
            outbox_tx,
            outbox_rx: Mutex::new(Some(outbox_rx)),
            rpc_timeout,
            stats: RuntimeStats::default(),
        })
    }

    /// Route messages of type `kind` to `handler`
    pub fn register(&self, kind: &str, handler: Arc<dyn Handler>) -> Result<()> {
        if kind == kinds::INIT {
            return Err(config_error!("'{}' is handled by the runtime", kind));
        }
        let mut handlers = self
            .handlers
            .write()
            .map_err(|e| concurrency_error!("handler table lock poisoned: {}", e))?;
        if handlers.insert(kind.to_string(), handler).is_some() {
            warn!("Replacing existing handler for '{}'", kind);
        }
        Ok(())
    }

    pub fn stats(&self) -> &RuntimeStats {
        &self.stats
    }

    pub fn is_initialised(&self) -> bool {
        self.identity.read().map(|id| id.is_some()).unwrap_or(false)
    }

    fn display_id(&self) -> String {
        self.local_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|_| "uninitialised".to_string())
    }

    /// Process messages from `reader` until it reaches end of input
    pub async fn run<R, W>(self: Arc<Self>, mut reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let outbox_rx = self
            .outbox_rx
            .lock()
            .map_err(|e| concurrency_error!("outbox lock poisoned: {}", e))?
            .take()
            .ok_or_else(|| node_error!("node is already running"))?;
        tokio::spawn(Self::write_loop(outbox_rx, writer));

        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            // Raw bytes, so invalid UTF-8 is a parse error rather than a read error
            if buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<Message>(&buf) {
                Ok(msg) => {
                    self.stats.messages_received.fetch_add(1, Ordering::Relaxed);
                    self.dispatch(msg);
                }
                Err(e) => {
                    self.stats.parse_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("[{}] Skipping unparseable input: {}", self.display_id(), e);
                }
            }
        }

        info!("[{}] Input closed, stopping runtime", self.display_id());
        Ok(())
    }

    async fn write_loop<W>(mut outbox_rx: mpsc::UnboundedReceiver<Message>, mut writer: W)
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(msg) = outbox_rx.recv().await {
            let mut line = match serde_json::to_vec(&msg) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to serialize message to {}: {}", msg.dest, e);
                    continue;
                }
            };
            line.push(b'\n');
            if let Err(e) = writer.write_all(&line).await {
                error!("Failed to write message, stopping writer: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                error!("Failed to flush output, stopping writer: {}", e);
                break;
            }
        }
        debug!("Writer loop exited");
    }

    fn dispatch(self: &Arc<Self>, msg: Message) {
        if let Some(in_reply_to) = msg.body.in_reply_to {
            match self.pending_replies.remove(&in_reply_to) {
                Some((_, waiter)) => {
                    let _ = waiter.send(msg);
                }
                None => debug!(
                    "[{}] Dropping {} from {}: nobody is waiting on message {}",
                    self.display_id(),
                    msg.body.kind,
                    msg.src,
                    in_reply_to
                ),
            }
            return;
        }

        tokio::spawn(Arc::clone(self).handle_request(msg));
    }

    async fn handle_request(self: Arc<Self>, msg: Message) {
        let result = match msg.body.kind.as_str() {
            kinds::INIT => self.handle_init(&msg).await,
            kind => match self.handler_for(kind) {
                Ok(handler) => handler.handle(msg.clone()).await,
                Err(e) => Err(e),
            },
        };

        if let Err(e) = result {
            warn!(
                "[{}] Handling {} from {} failed ({}): {}",
                self.display_id(),
                msg.body.kind,
                msg.src,
                e.error_type(),
                e
            );
            if msg.body.msg_id.is_some() {
                let body = Body::error(e.error_code(), e.to_string());
                if let Err(e) = self.reply(&msg, body).await {
                    error!("[{}] Failed to send error reply: {}", self.display_id(), e);
                }
            }
        }
    }

    fn handler_for(&self, kind: &str) -> Result<Arc<dyn Handler>> {
        if !self.is_initialised() {
            return Err(node_error!("received '{}' before init", kind));
        }
        self.handlers
            .read()
            .map_err(|e| concurrency_error!("handler table lock poisoned: {}", e))?
            .get(kind)
            .cloned()
            .ok_or_else(|| ProtocolError::NotSupported(kind.to_string()).into())
    }

    async fn handle_init(&self, msg: &Message) -> Result<()> {
        let init: InitRequest = msg.body.decode()?;
        info!(
            "[{}] Initialised with {} cluster members",
            init.node_id,
            init.node_ids.len()
        );
        {
            let mut identity = self
                .identity
                .write()
                .map_err(|e| concurrency_error!("identity lock poisoned: {}", e))?;
            *identity = Some(Identity {
                id: init.node_id,
                members: init.node_ids,
            });
        }
        self.reply(msg, Body::new(kinds::INIT_OK)).await
    }

    fn next_msg_id(&self) -> u64 {
        self.next_msg_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn emit(&self, msg: Message) -> Result<()> {
        self.outbox_tx
            .send(msg)
            .map_err(|_| transport_error!("output writer has stopped"))?;
        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn identity(&self) -> Result<Identity> {
        self.identity
            .read()
            .map_err(|e| concurrency_error!("identity lock poisoned: {}", e))?
            .clone()
            .ok_or_else(|| node_error!("node has not been initialised"))
    }
}

#[async_trait]
impl Transport for Node {
    fn local_id(&self) -> Result<MemberId> {
        self.identity().map(|identity| identity.id)
    }

    fn members(&self) -> Result<Vec<MemberId>> {
        self.identity().map(|identity| identity.members)
    }

    async fn send(&self, dest: &MemberId, mut body: Body) -> Result<()> {
        let src = self.local_id()?;
        let msg_id = self.next_msg_id();
        body.msg_id = Some(msg_id);
        body.in_reply_to = None;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending_replies.insert(msg_id, reply_tx);
        let msg = Message {
            src,
            dest: dest.clone(),
            body,
        };
        if let Err(e) = self.emit(msg) {
            self.pending_replies.remove(&msg_id);
            return Err(e);
        }

        match timeout(self.rpc_timeout, reply_rx).await {
            Ok(Ok(reply)) if reply.body.is_error() => {
                let err: ErrorResponse = reply.body.decode()?;
                Err(TreecastError::Rpc {
                    code: err.code,
                    text: err.text,
                })
            }
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(transport_error!("reply channel for message {} closed", msg_id)),
            Err(_) => {
                self.pending_replies.remove(&msg_id);
                self.stats.rpc_timeouts.fetch_add(1, Ordering::Relaxed);
                Err(TreecastError::Timeout(format!(
                    "no reply from {} to message {} within {}ms",
                    dest,
                    msg_id,
                    self.rpc_timeout.as_millis()
                )))
            }
        }
    }

    async fn reply(&self, request: &Message, mut body: Body) -> Result<()> {
        body.msg_id = Some(self.next_msg_id());
        body.in_reply_to = request.body.msg_id;
        self.emit(Message {
            src: request.dest.clone(),
            dest: request.src.clone(),
            body,
        })
    }
}
