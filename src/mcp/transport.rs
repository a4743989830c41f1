//! stdio transport for the MCP server.
//!
//! This module implements the stdio transport as specified by MCP:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! A line that is not UTF-8, or is longer than [`MAX_MESSAGE_BYTES`], is
//! answered with a parse error and the session carries on.
//!
//! # Concurrency
//!
//! Every inbound line is handled on its own task, so a slow tool call does
//! not hold up the lines behind it. Replies are funnelled through a channel
//! to the single writer and go out in completion order; clients match them
//! to requests by `id`.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::mcp::protocol::{JsonRpcError, MAX_MESSAGE_BYTES};
use crate::mcp::server::MessageHandler;

/// Rate-limit identity of the single stdio peer.
pub const STDIO_CLIENT_ID: &str = "stdio";

/// How long replies to in-flight requests are awaited after input ends.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// A line-delimited MCP transport over any reader/writer pair.
pub struct StdioTransport<R, W> {
    reader: BufReader<R>,
    writer: W,
}

impl StdioTransport<tokio::io::Stdin, tokio::io::Stdout> {
    /// Creates a transport over the process's stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport reading from `reader` and writing to `writer`.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Serves messages until input ends or `shutdown` resolves.
    ///
    /// Replies to requests still in flight are written before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing fails.
    pub async fn run<S>(self, handler: Arc<dyn MessageHandler>, shutdown: S) -> io::Result<()>
    where
        S: Future<Output = ()>,
    {
        let Self { reader, mut writer } = self;
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();
        let mut frames = LineReader::new(reader, MAX_MESSAGE_BYTES);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested, closing stdio transport");
                    break;
                }

                Some(reply) = reply_rx.recv() => {
                    write_line(&mut writer, &reply).await?;
                }

                frame = frames.next_frame() => {
                    let bytes = match frame? {
                        None => {
                            debug!("stdin closed");
                            break;
                        }
                        Some(Frame::Oversized) => {
                            warn!(limit = MAX_MESSAGE_BYTES, "Dropped oversized message");
                            write_parse_error(&mut writer).await?;
                            continue;
                        }
                        Some(Frame::Line(bytes)) => bytes,
                    };
                    let Ok(text) = String::from_utf8(bytes) else {
                        debug!("Received a line that is not UTF-8");
                        write_parse_error(&mut writer).await?;
                        continue;
                    };

                    let line = text.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let handler = Arc::clone(&handler);
                    let reply_tx = reply_tx.clone();
                    let line = line.to_string();
                    tokio::spawn(async move {
                        if let Some(reply) = handler.handle(&line, STDIO_CLIENT_ID).await {
                            // The receiver only goes away once draining has given up
                            let _ = reply_tx.send(reply);
                        }
                    });
                }
            }
        }

        drop(reply_tx);
        let drain = async {
            while let Some(reply) = reply_rx.recv().await {
                write_line(&mut writer, &reply).await?;
            }
            Ok::<_, io::Error>(())
        };
        match tokio::time::timeout(DRAIN_TIMEOUT, drain).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Gave up waiting for in-flight requests");
                Ok(())
            }
        }
    }
}

/// One unit of input read from the peer.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    /// A complete line, without its terminator.
    Line(Vec<u8>),
    /// A line longer than the limit; its bytes were discarded.
    Oversized,
}

/// Splits input into newline-terminated frames of bounded size.
///
/// Partial lines are kept between calls, so a pending [`Self::next_frame`]
/// can be dropped by `select!` without losing input.
struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    limit: usize,
    discarding: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    const fn new(reader: BufReader<R>, limit: usize) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            limit,
            discarding: false,
        }
    }

    /// Reads the next frame, or `None` at end of input.
    async fn next_frame(&mut self) -> io::Result<Option<Frame>> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if std::mem::take(&mut self.discarding) {
                    return Ok(Some(Frame::Oversized));
                }
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(Frame::Line(std::mem::take(&mut self.buf))));
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let chunk = &available[..newline.unwrap_or(available.len())];
            if !self.discarding {
                if self.buf.len() + chunk.len() > self.limit {
                    self.discarding = true;
                    self.buf = Vec::new();
                } else {
                    self.buf.extend_from_slice(chunk);
                }
            }
            let used = newline.map_or(available.len(), |i| i + 1);
            self.reader.consume(used);

            if newline.is_some() {
                if std::mem::take(&mut self.discarding) {
                    return Ok(Some(Frame::Oversized));
                }
                return Ok(Some(Frame::Line(std::mem::take(&mut self.buf))));
            }
        }
    }
}

async fn write_parse_error<W: AsyncWrite + Unpin>(writer: &mut W) -> io::Result<()> {
    let reply = serde_json::to_string(&JsonRpcError::parse_error()).map_err(io::Error::other)?;
    write_line(writer, &reply).await
}

/// Writes one message with newline termination and flushes.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, json: &str) -> io::Result<()> {
    // stdio framing: one message per line
    debug_assert!(
        !json.contains('\n'),
        "JSON message must not contain embedded newlines"
    );

    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
