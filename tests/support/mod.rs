#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;

use respite::{ConnectionAddr, Value, ValueCodec};

/// What a scripted server does with a received command.
pub enum ServerReply {
    /// Serialize and send a value.
    Value(Value),
    /// Send raw bytes, which may contain several pipelined replies.
    Raw(Vec<u8>),
    /// Send nothing; a later command's `Raw` reply may cover this one.
    Ignore,
    /// Drop the connection without replying.
    CloseConnection,
}

pub fn ok() -> ServerReply {
    ServerReply::Value(Value::SimpleString("OK".to_string()))
}

pub fn bulk(data: &str) -> Value {
    Value::BulkString(data.as_bytes().to_vec())
}

/// Renders the arguments of a received command array as strings, for
/// matching inside handlers and for assertions.
pub fn command_args(command: &Value) -> Vec<String> {
    match command {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::BulkString(bytes) => String::from_utf8_lossy(bytes).to_string(),
                other => format!("{other:?}"),
            })
            .collect(),
        other => vec![format!("{other:?}")],
    }
}

/// Builds a `CLUSTER SLOTS` reply from `(start, end, host, port)` ranges.
pub fn slots_reply(ranges: &[(u16, u16, &str, u16)]) -> Value {
    Value::Array(
        ranges
            .iter()
            .map(|(start, end, host, port)| {
                Value::Array(vec![
                    Value::Int(*start as i64),
                    Value::Int(*end as i64),
                    Value::Array(vec![
                        bulk(host),
                        Value::Int(*port as i64),
                        bulk(&format!("{host}:{port}-id")),
                    ]),
                ])
            })
            .collect(),
    )
}

/// A scripted server speaking the wire protocol on an ephemeral port.
///
/// Every received command is appended to a log and answered by the
/// handler. Connections are accepted concurrently and share the handler
/// behind a lock, the way a real node serves independent clients.
pub struct MockServer {
    pub addr: ConnectionAddr,
    pub port: u16,
    received: Arc<Mutex<Vec<Vec<String>>>>,
    handle: JoinHandle<()>,
}

/// Picks a currently free port. Technically a race, but the bind in
/// `MockServer::start_on` follows immediately.
pub async fn reserve_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

impl MockServer {
    pub async fn start<F>(handler: F) -> MockServer
    where
        F: FnMut(Value) -> ServerReply + Send + 'static,
    {
        Self::start_on(0, handler).await
    }

    /// Starts the server on a specific port; port 0 picks an ephemeral
    /// one. Useful when the handler script has to mention the server's
    /// own address, which must be known before the handler is built.
    pub async fn start_on<F>(port: u16, handler: F) -> MockServer
    where
        F: FnMut(Value) -> ServerReply + Send + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received: Arc<Mutex<Vec<Vec<String>>>> = Arc::default();
        let handler = Arc::new(Mutex::new(handler));

        let log = received.clone();
        let handle = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                let handler = handler.clone();
                let log = log.clone();
                tokio::spawn(serve_connection(stream, handler, log));
            }
        });

        MockServer {
            addr: ConnectionAddr::new("127.0.0.1", port),
            port,
            received,
            handle,
        }
    }

    /// Snapshot of every command received so far, across connections.
    pub fn received(&self) -> Vec<Vec<String>> {
        self.received.lock().unwrap().clone()
    }

    /// How many received commands had the given verb.
    pub fn count_verb(&self, verb: &str) -> usize {
        self.received()
            .iter()
            .filter(|args| args.first().map(String::as_str) == Some(verb))
            .count()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_connection<F>(
    stream: TcpStream,
    handler: Arc<Mutex<F>>,
    log: Arc<Mutex<Vec<Vec<String>>>>,
) where
    F: FnMut(Value) -> ServerReply + Send + 'static,
{
    let (read_half, mut write_half) = stream.into_split();
    let mut commands = FramedRead::new(read_half, ValueCodec::default());
    while let Some(Ok(command)) = commands.next().await {
        log.lock().unwrap().push(command_args(&command));
        let reply = (handler.lock().unwrap())(command);
        match reply {
            ServerReply::Value(value) => {
                if write_half.write_all(&value.to_resp_bytes()).await.is_err() {
                    return;
                }
            }
            ServerReply::Raw(bytes) => {
                if write_half.write_all(&bytes).await.is_err() {
                    return;
                }
            }
            ServerReply::Ignore => {}
            ServerReply::CloseConnection => return,
        }
    }
}
