//! The pipelined connection executor.
//!
//! A [`PipelinedConnection`] owns one TCP stream and two cooperative
//! tasks: a sender that drains the bounded request queue in batches and
//! writes each batch with a single syscall, and a reader that drives the
//! streaming parser and resolves completion handles strictly in FIFO
//! order. The two tasks race; whichever fails first tears the connection
//! down, every outstanding completion fails with the propagated error,
//! and the driver reconnects unconditionally and resumes.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, trace, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::FramedRead;

use crate::cmd::Cmd;
use crate::connection::{connect_tcp, ConnectionAddr, TcpSettings};
use crate::parser::ValueCodec;
use crate::types::{RedisError, RedisFuture, RedisResult, Value};

/// Capacity of the request queue. Callers block on `execute` when this
/// many requests are waiting to be written, which is the only
/// backpressure the executor applies.
const REQUEST_QUEUE_SIZE: usize = 16;

/// Upper bound on how many queued requests the sender folds into one
/// write. Any value of at least one is correct; this only trades
/// syscalls against latency.
const WRITE_BATCH_SIZE: usize = REQUEST_QUEUE_SIZE;

const RECONNECT_DELAY: Duration = Duration::from_millis(100);

type Completion = oneshot::Sender<RedisResult<Value>>;

struct Request {
    packed: Vec<u8>,
    completion: Completion,
}

/// Upward interface for anything that can execute a command and produce
/// its raw reply value.
///
/// Implementations resolve each call to either a [`Value`] (including
/// `Value::Error`, which is classified later at the command boundary) or
/// a [`RedisError`] for failures that never produced a reply.
pub trait RedisExecutor {
    /// Executes a command and resolves to its raw reply.
    fn execute<'a>(&'a self, cmd: &'a Cmd) -> RedisFuture<'a, Value>;
}

fn closed_error() -> RedisError {
    RedisError::from(io::Error::from(io::ErrorKind::BrokenPipe))
}

// Aborts the driver task once the last connection handle goes away, so
// that dropping the connection deterministically releases the socket and
// fails whatever is still pending.
struct DriverGuard(tokio::task::JoinHandle<()>);

impl Drop for DriverGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A connection object which can be cloned, allowing requests to be sent
/// concurrently over the same underlying connection.
///
/// Replies are matched to requests strictly in the order the requests
/// were written. Cancelling a call before it was enqueued drops it;
/// cancelling it afterwards lets the request complete on the wire and
/// discards the result, since the socket cannot be rewound.
#[derive(Clone)]
pub struct PipelinedConnection {
    sender: mpsc::Sender<Request>,
    driver: Arc<DriverGuard>,
    response_timeout: Option<Duration>,
}

impl std::fmt::Debug for PipelinedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelinedConnection").finish_non_exhaustive()
    }
}

impl PipelinedConnection {
    /// Connects to the given address with default TCP settings.
    pub async fn connect(addr: ConnectionAddr) -> RedisResult<PipelinedConnection> {
        Self::connect_with_settings(addr, TcpSettings::default()).await
    }

    /// Connects to the given address.
    ///
    /// The first connection is established eagerly so that configuration
    /// and reachability problems surface here; later reconnects happen
    /// inside the driver task.
    pub async fn connect_with_settings(
        addr: ConnectionAddr,
        settings: TcpSettings,
    ) -> RedisResult<PipelinedConnection> {
        let stream = connect_tcp(&addr, &settings).await?;
        let (sender, receiver) = mpsc::channel(REQUEST_QUEUE_SIZE);
        let driver = tokio::spawn(drive(addr, settings, stream, receiver));
        Ok(PipelinedConnection {
            sender,
            driver: Arc::new(DriverGuard(driver)),
            response_timeout: None,
        })
    }

    /// Sets the time this handle will wait for a reply before failing
    /// with a timeout error. The request itself still completes on the
    /// wire.
    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.response_timeout = Some(timeout);
    }

    /// Sends an already packed command and awaits its reply.
    pub async fn execute_packed(&self, packed: Vec<u8>) -> RedisResult<Value> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Request {
                packed,
                completion: tx,
            })
            .await
            .map_err(|_| closed_error())?;
        match self.response_timeout {
            Some(timeout) => tokio::time::timeout(timeout, rx)
                .await?
                .map_err(|_| closed_error())?,
            None => rx.await.map_err(|_| closed_error())?,
        }
    }

    /// Closes the connection.
    ///
    /// The driver task stops, the socket is released and every pending
    /// completion fails. Subsequent calls on any clone of this handle
    /// fail with an I/O error.
    pub fn close(&self) {
        self.driver.0.abort();
    }
}

impl RedisExecutor for PipelinedConnection {
    fn execute<'a>(&'a self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        Box::pin(async move { self.execute_packed(cmd.get_packed_command()).await })
    }
}

async fn drive(
    addr: ConnectionAddr,
    settings: TcpSettings,
    first: TcpStream,
    mut requests: mpsc::Receiver<Request>,
) {
    let mut next_stream = Some(first);
    loop {
        let stream = match next_stream.take() {
            Some(stream) => stream,
            None => match connect_tcp(&addr, &settings).await {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("reconnect to {addr} failed: {err}");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            },
        };
        debug!("connection to {addr} established");
        match run_connection(stream, &mut requests).await {
            Ok(()) => {
                debug!("all handles for {addr} dropped, shutting down");
                return;
            }
            Err(err) => {
                warn!("connection to {addr} failed: {err}; reconnecting");
            }
        }
    }
}

enum TaskDone {
    Write(RedisResult<()>),
    Read(RedisResult<()>),
}

/// Runs one established connection until either side fails or every
/// request handle is gone. Requests that were queued but never written
/// survive into the next connection; outstanding ones fail here.
async fn run_connection(
    stream: TcpStream,
    requests: &mut mpsc::Receiver<Request>,
) -> RedisResult<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut replies = FramedRead::new(read_half, ValueCodec::default());
    let (outstanding_tx, mut outstanding_rx) = mpsc::unbounded_channel::<Completion>();

    let result = {
        let write = write_loop(&mut write_half, requests, outstanding_tx);
        let read = read_loop(&mut replies, &mut outstanding_rx);
        tokio::pin!(write);
        tokio::pin!(read);
        let first_done = tokio::select! {
            res = &mut write => TaskDone::Write(res),
            res = &mut read => TaskDone::Read(res),
        };
        match first_done {
            // Graceful shutdown: the completed write future has dropped
            // its outstanding sender, so the reader drains what is left
            // and then sees the channel close.
            TaskDone::Write(Ok(())) => read.await,
            TaskDone::Write(Err(err)) => Err(err),
            TaskDone::Read(res) => res,
        }
    };

    if let Err(ref err) = result {
        let mut failed = 0usize;
        while let Ok(completion) = outstanding_rx.try_recv() {
            let _ = completion.send(Err(err.clone_mostly("Connection failed")));
            failed += 1;
        }
        if failed > 0 {
            debug!("failed {failed} outstanding replies after connection loss");
        }
    }
    result
}

async fn write_loop(
    write_half: &mut OwnedWriteHalf,
    requests: &mut mpsc::Receiver<Request>,
    outstanding: mpsc::UnboundedSender<Completion>,
) -> RedisResult<()> {
    let mut batch: Vec<Request> = Vec::with_capacity(WRITE_BATCH_SIZE);
    loop {
        batch.clear();
        if requests.recv_many(&mut batch, WRITE_BATCH_SIZE).await == 0 {
            return Ok(());
        }

        let len: usize = batch.iter().map(|request| request.packed.len()).sum();
        let mut buf = Vec::with_capacity(len);
        for request in &batch {
            buf.extend_from_slice(&request.packed);
        }
        trace!("writing batch of {} requests ({} bytes)", batch.len(), len);

        if let Err(err) = write_half.write_all(&buf).await {
            let err = RedisError::from(err);
            for request in batch.drain(..) {
                let _ = request
                    .completion
                    .send(Err(err.clone_mostly("Write failed")));
            }
            return Err(err);
        }

        // Completions enter the outstanding queue only after their bytes
        // hit the socket, in dequeue order; this is what keeps replies
        // matched to requests.
        for request in batch.drain(..) {
            if outstanding.send(request.completion).is_err() {
                return Ok(());
            }
        }
    }
}

async fn read_loop(
    replies: &mut FramedRead<OwnedReadHalf, ValueCodec>,
    outstanding: &mut mpsc::UnboundedReceiver<Completion>,
) -> RedisResult<()> {
    loop {
        // Wait for something to be outstanding before reading; replies
        // resolve handles strictly in the order requests were written.
        let completion = match outstanding.recv().await {
            Some(completion) => completion,
            None => return Ok(()),
        };
        match replies.next().await {
            Some(Ok(value)) => {
                trace!("reply: {value:?}");
                let _ = completion.send(Ok(value));
            }
            Some(Err(err)) => {
                let _ = completion.send(Err(err.clone_mostly("Reply stream failed")));
                return Err(err);
            }
            None => {
                let err = RedisError::from(io::Error::from(io::ErrorKind::UnexpectedEof));
                let _ = completion.send(Err(err.clone_mostly("Server closed the connection")));
                return Err(err);
            }
        }
    }
}
