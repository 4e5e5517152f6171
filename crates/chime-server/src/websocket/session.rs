//! Per-connection lifecycle: register, run both pumps, tear down once.
//!
//! The writer runs as its own task and is the only thing that writes to the
//! transport. The reader runs inline and exists to observe liveness and
//! closure; inbound payloads are ignored. Whichever pump stops first cancels
//! the connection's token, which stops the other. The session then
//! unregisters from the hub exactly once.
//!
//! Both pumps are generic over `Sink`/`Stream` of [`Message`] so they can be
//! driven by in-memory fakes.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::{debug, info, instrument, trace, warn};

use super::Payload;
use super::connection::ClientConnection;
use super::hub::HubHandle;
use crate::config::ConnectionConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Why a pump stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PumpExit {
    /// The peer sent a close frame or the stream ended.
    PeerClosed,
    /// Reading from the transport failed.
    ReadFailed(String),
    /// Nothing was read within the liveness deadline.
    ReadTimedOut,
    /// An inbound frame exceeded the size limit.
    FrameTooLarge(usize),
    /// Writing to the transport failed.
    WriteFailed(String),
    /// A write did not complete within the write deadline.
    WriteTimedOut,
    /// The hub dropped the outbound queue.
    QueueClosed,
    /// The connection's token was cancelled by the other pump or the hub.
    Cancelled,
}

impl PumpExit {
    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::ReadFailed(_) => "read_failed",
            Self::ReadTimedOut => "read_timeout",
            Self::FrameTooLarge(_) => "frame_too_large",
            Self::WriteFailed(_) => "write_failed",
            Self::WriteTimedOut => "write_timeout",
            Self::QueueClosed => "queue_closed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Run one admitted connection to completion.
///
/// Registers with the hub, runs both pumps, and tears down once. Returns the
/// exit that started teardown. If the hub is not running the connection is
/// closed immediately.
#[instrument(
    skip_all,
    fields(conn_id = %conn.id, user_id = %conn.user_id, channel_id = %conn.channel_id)
)]
pub async fn run_session<S, R, E>(
    conn: Arc<ClientConnection>,
    sink: S,
    mut stream: R,
    hub: HubHandle,
    config: ConnectionConfig,
) -> PumpExit
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (queue_tx, queue_rx) = mpsc::channel(config.send_buffer.max(1));
    if let Err(error) = hub.register(Arc::clone(&conn), queue_tx).await {
        warn!(%error, "hub unavailable, dropping connection");
        conn.close();
        return PumpExit::Cancelled;
    }

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);

    let mut writer = tokio::spawn(write_pump(
        Arc::clone(&conn),
        sink,
        queue_rx,
        config.clone(),
    ));

    // The writer may end without cancelling (panic, abort), so its task
    // handle is watched alongside the reader.
    let (read_exit, write_exit) = tokio::select! {
        read_exit = read_pump(&conn, &mut stream, &config) => {
            let _ = conn.begin_draining();
            (read_exit, writer_exit(writer.await))
        }
        joined = &mut writer => {
            let _ = conn.begin_draining();
            (PumpExit::Cancelled, writer_exit(joined))
        }
    };

    if let Err(error) = hub.unregister(&conn.id).await {
        debug!(%error, "hub already stopped during teardown");
    }
    conn.close();

    let cause = if read_exit == PumpExit::Cancelled {
        write_exit
    } else {
        read_exit
    };
    info!(
        reason = cause.reason(),
        delivered = conn.delivered(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => cause.reason()).increment(1);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(conn.age().as_secs_f64());
    cause
}

fn writer_exit(joined: Result<PumpExit, JoinError>) -> PumpExit {
    match joined {
        Ok(exit) => exit,
        Err(error) => {
            warn!(%error, "write pump task failed");
            PumpExit::WriteFailed(error.to_string())
        }
    }
}

/// Drain the transport until it closes, fails, goes quiet, or is cancelled.
///
/// Every inbound frame, including pongs, resets the liveness deadline.
pub async fn read_pump<R, E>(
    conn: &ClientConnection,
    stream: &mut R,
    config: &ConnectionConfig,
) -> PumpExit
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let cancel = conn.shutdown_token();
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return PumpExit::Cancelled,
            next = timeout(config.pong_wait, stream.next()) => next,
        };
        let frame = match next {
            Err(_) => {
                debug!(pong_wait = ?config.pong_wait, "read deadline exceeded");
                return PumpExit::ReadTimedOut;
            }
            Ok(None) => return PumpExit::PeerClosed,
            Ok(Some(Err(error))) => return PumpExit::ReadFailed(error.to_string()),
            Ok(Some(Ok(frame))) => frame,
        };
        conn.mark_seen();

        let size = frame_len(&frame);
        if size > config.max_message_size {
            warn!(size, limit = config.max_message_size, "inbound frame too large");
            return PumpExit::FrameTooLarge(size);
        }
        match frame {
            Message::Close(_) => return PumpExit::PeerClosed,
            Message::Pong(_) => trace!("pong"),
            Message::Ping(_) => trace!("ping"),
            Message::Text(_) | Message::Binary(_) => {
                trace!(size, "ignoring inbound payload");
            }
        }
    }
}

/// Write queued payloads and periodic pings until something stops it.
///
/// Payloads already waiting behind the first one are fed in the same write
/// and flushed together, one frame each. Payloads queued while that batch is
/// being written wait for the next one. Each write (batch, ping, or close)
/// has `write_wait` to complete. On exit the connection's token is
/// cancelled so the reader stops too.
pub async fn write_pump<S>(
    conn: Arc<ClientConnection>,
    mut sink: S,
    mut queue: mpsc::Receiver<Payload>,
    config: ConnectionConfig,
) -> PumpExit
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let cancel = conn.shutdown_token();
    // `interval_at` panics on a zero period.
    let period = config.ping_period.max(Duration::from_millis(1));
    let mut ping = interval_at(Instant::now() + period, period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break PumpExit::Cancelled,
            next = queue.recv() => {
                let Some(first) = next else {
                    break PumpExit::QueueClosed;
                };
                match timeout(config.write_wait, write_batch(&mut sink, &mut queue, first)).await {
                    Ok(Ok(written)) => conn.record_delivered(written),
                    Ok(Err(error)) => break PumpExit::WriteFailed(error.to_string()),
                    Err(_) => break PumpExit::WriteTimedOut,
                }
            }
            _ = ping.tick() => {
                match timeout(config.write_wait, sink.send(Message::Ping(Bytes::new()))).await {
                    Ok(Ok(())) => trace!("ping sent"),
                    Ok(Err(error)) => break PumpExit::WriteFailed(error.to_string()),
                    Err(_) => break PumpExit::WriteTimedOut,
                }
            }
        }
    };
    let _ = conn.begin_draining();

    if matches!(exit, PumpExit::Cancelled | PumpExit::QueueClosed) {
        // Best effort; the peer may already be gone.
        let _ = timeout(config.write_wait, sink.send(Message::Close(None))).await;
    }
    exit
}

async fn write_batch<S>(
    sink: &mut S,
    queue: &mut mpsc::Receiver<Payload>,
    first: Payload,
) -> Result<u64, S::Error>
where
    S: Sink<Message> + Unpin,
{
    let waiting = queue.len();
    sink.feed(Message::Text(first)).await?;
    let mut written = 1;
    for _ in 0..waiting {
        let Ok(next) = queue.try_recv() else { break };
        sink.feed(Message::Text(next)).await?;
        written += 1;
    }
    sink.flush().await?;
    Ok(written)
}

fn frame_len(frame: &Message) -> usize {
    match frame {
        Message::Text(text) => text.as_str().len(),
        Message::Binary(data) | Message::Ping(data) | Message::Pong(data) => data.len(),
        Message::Close(_) => 0,
    }
}
