// ! Line-delimited JSON transport
// !
// ! Frames one JSON-RPC document per line over any async byte stream. Every line
// ! is dispatched as its own task; replies are written as soon as they are ready,
// ! so they correlate by id rather than by order.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    BufWriter,
};
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::core::context::RequestContext;
use crate::core::error::{McpError, McpResult};
use crate::core::pool::{SizeClass, global_buffers};
use crate::notifications::DeliveryHandler;
use crate::protocol::codec::JsonCodec;
use crate::protocol::types::{
    ErrorObject, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcReply, error_codes,
};
use crate::transport::traits::{MessageHandler, ServerTransport, TransportConfig};

/// Serialized writer half of a line connection.
///
/// Cheap to clone; every clone writes through the same lock, so lines from
/// concurrently finishing handlers never interleave.
pub struct LineSender<W> {
    writer: Arc<Mutex<BufWriter<W>>>,
    codec: JsonCodec,
    client_id: Arc<str>,
    write_timeout: Duration,
}

impl<W> Clone for LineSender<W> {
    fn clone(&self) -> Self {
        Self {
            writer: self.writer.clone(),
            codec: self.codec.clone(),
            client_id: self.client_id.clone(),
            write_timeout: self.write_timeout,
        }
    }
}

impl<W> LineSender<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn new(writer: W, client_id: Arc<str>, config: &TransportConfig) -> Self {
        Self {
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
            codec: JsonCodec::default(),
            client_id,
            write_timeout: Duration::from_millis(config.write_timeout_ms),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Encode and write one message followed by a newline
    pub async fn send(&self, message: &JsonRpcMessage) -> McpResult<()> {
        let line = self.codec.encode_line(message)?;
        trace!(client_id = %self.client_id, "Sending: {}", String::from_utf8_lossy(&line).trim_end());

        let write = async {
            let mut writer = self.writer.lock().await;
            writer.write_all(&line).await?;
            writer.flush().await
        };
        match timeout(self.write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(McpError::transport(format!("Failed to write message: {e}"))),
            Err(_) => Err(McpError::timeout("write timed out")),
        }
    }

    async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(client_id = %self.client_id, "Writer shutdown failed: {}", e);
        }
    }
}

#[async_trait]
impl<W> DeliveryHandler for LineSender<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn deliver(&self, client_id: &str, notification: &JsonRpcNotification) -> McpResult<()> {
        if client_id != &*self.client_id {
            return Err(McpError::ClientNotFound(format!(
                "connection {} does not serve client {client_id}",
                self.client_id
            )));
        }
        self.send(&JsonRpcMessage::Notification(notification.clone()))
            .await
    }
}

/// Server transport over a pair of async byte streams
pub struct LineTransport<R, W> {
    reader: Option<R>,
    sender: LineSender<W>,
    handler: Option<MessageHandler>,
    config: TransportConfig,
    kind: &'static str,
    client_id: Arc<str>,
    connection: CancellationToken,
    done: CancellationToken,
    running: Arc<AtomicBool>,
    reader_task: Option<JoinHandle<()>>,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_config(reader, writer, TransportConfig::default())
    }

    pub fn with_config(reader: R, writer: W, config: TransportConfig) -> Self {
        let client_id: Arc<str> = uuid::Uuid::new_v4().to_string().into();
        Self {
            reader: Some(reader),
            sender: LineSender::new(writer, client_id.clone(), &config),
            handler: None,
            config,
            kind: "line",
            client_id,
            connection: CancellationToken::new(),
            done: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(false)),
            reader_task: None,
        }
    }

    /// Override the transport kind reported to the notifier
    pub fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = kind;
        self
    }

    /// Writer handle usable after the transport is moved into a server
    pub fn sender(&self) -> LineSender<W> {
        self.sender.clone()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

#[async_trait]
impl<R, W> ServerTransport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    async fn start(&mut self) -> McpResult<()> {
        let handler = self
            .handler
            .clone()
            .ok_or_else(|| McpError::transport("No message handler set"))?;
        let reader = self
            .reader
            .take()
            .ok_or_else(|| McpError::transport("Transport already started"))?;

        debug!(client_id = %self.client_id, kind = self.kind, "Starting line transport");
        self.running.store(true, Ordering::Release);

        let connection = Connection {
            handler,
            sender: self.sender.clone(),
            client_id: self.client_id.clone(),
            max_message_size: self.config.max_message_size,
            token: self.connection.clone(),
        };
        let done = self.done.clone();
        let running = self.running.clone();

        self.reader_task = Some(tokio::spawn(async move {
            connection.run(BufReader::new(reader)).await;
            running.store(false, Ordering::Release);
            done.cancel();
        }));
        Ok(())
    }

    fn set_handler(&mut self, handler: MessageHandler) {
        self.handler = Some(handler);
    }

    async fn send(&self, message: JsonRpcMessage) -> McpResult<()> {
        self.sender.send(&message).await
    }

    async fn close(&mut self) -> McpResult<()> {
        debug!(client_id = %self.client_id, "Closing line transport");
        self.connection.cancel();
        match self.reader_task.take() {
            Some(task) => {
                if let Err(e) = task.await {
                    warn!("Line reader task ended abnormally: {}", e);
                }
            }
            None => {
                self.sender.shutdown().await;
                self.running.store(false, Ordering::Release);
                self.done.cancel();
            }
        }
        Ok(())
    }

    async fn closed(&self) {
        self.done.cancelled().await
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn kind(&self) -> &'static str {
        self.kind
    }

    fn delivery_handler(&self) -> Option<Arc<dyn DeliveryHandler>> {
        Some(Arc::new(self.sender.clone()))
    }
}

/// One framed read result
enum Frame {
    Line,
    Oversized,
    Eof,
}

/// Read state of one connection, owned by the reader task
struct Connection<W> {
    handler: MessageHandler,
    sender: LineSender<W>,
    client_id: Arc<str>,
    max_message_size: usize,
    token: CancellationToken,
}

impl<W> Connection<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn run<B>(self, mut reader: B)
    where
        B: AsyncBufRead + Unpin,
    {
        let mut in_flight = JoinSet::new();
        let mut line = global_buffers().scratch(SizeClass::Small.capacity());

        loop {
            line.clear();
            let frame = tokio::select! {
                _ = self.token.cancelled() => break,
                frame = read_frame(&mut reader, &mut line, self.max_message_size) => frame,
            };

            while let Some(finished) = in_flight.try_join_next() {
                log_join_result(finished);
            }

            match frame {
                Ok(Frame::Eof) => {
                    debug!(client_id = %self.client_id, "Input closed");
                    break;
                }
                Ok(Frame::Oversized) => {
                    warn!(
                        client_id = %self.client_id,
                        limit = self.max_message_size,
                        "Dropping oversized message"
                    );
                    self.reject_oversized().await;
                }
                Ok(Frame::Line) => {
                    let document = line.trim_ascii();
                    if document.is_empty() {
                        continue;
                    }
                    trace!(client_id = %self.client_id, "Received: {}", String::from_utf8_lossy(document));
                    self.dispatch(&mut in_flight, document.to_vec());
                }
                Err(e) => {
                    warn!(client_id = %self.client_id, "Error reading input: {}", e);
                    break;
                }
            }
        }

        if self.token.is_cancelled() {
            in_flight.shutdown().await;
        } else {
            // Input ended: let in-flight requests finish and write their replies
            while let Some(finished) = in_flight.join_next().await {
                log_join_result(finished);
            }
        }
        self.sender.shutdown().await;
    }

    fn dispatch(&self, in_flight: &mut JoinSet<()>, payload: Vec<u8>) {
        let ctx = RequestContext::with_token(self.client_id.to_string(), self.token.child_token());
        let handler = self.handler.clone();
        let sender = self.sender.clone();

        in_flight.spawn(async move {
            if let Some(reply) = handler(ctx, payload).await {
                if let Err(e) = sender.send(&JsonRpcMessage::Reply(reply)).await {
                    warn!(client_id = %sender.client_id(), "Failed to write reply: {}", e);
                }
            }
        });
    }

    async fn reject_oversized(&self) {
        let reply = JsonRpcReply::Error(JsonRpcError::new(
            serde_json::Value::Null,
            ErrorObject {
                code: error_codes::INVALID_REQUEST,
                message: format!(
                    "Message exceeds maximum size of {} bytes",
                    self.max_message_size
                ),
                data: None,
            },
        ));
        if let Err(e) = self.sender.send(&JsonRpcMessage::Reply(reply)).await {
            warn!(client_id = %self.client_id, "Failed to write reply: {}", e);
        }
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            warn!("Request task panicked: {}", e);
        }
    }
}

/// Read one newline-terminated frame of at most `max` bytes (excluding the
/// newline). The remainder of an oversized line is discarded.
async fn read_frame<B>(reader: &mut B, buf: &mut Vec<u8>, max: usize) -> std::io::Result<Frame>
where
    B: AsyncBufRead + Unpin,
{
    let limit = (max as u64).saturating_add(1);
    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(Frame::Eof);
    }
    if buf.last() == Some(&b'\n') || buf.len() <= max {
        return Ok(Frame::Line);
    }

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }
        match available.iter().position(|byte| *byte == b'\n') {
            Some(index) => {
                reader.consume(index + 1);
                break;
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
    Ok(Frame::Oversized)
}
