//! respite is a client library for servers speaking the RESP2 protocol.
//! It exposes a low-level command builder, a pipelined connection that
//! multiplexes concurrent callers over one TCP stream, and a cluster
//! client that routes commands by key slot and follows redirects.
//!
//! # Basic Operation
//!
//! Commands are assembled with the [`cmd`] builder and executed against
//! anything implementing [`RedisExecutor`]. The reply is converted into
//! the requested type through [`FromRedisValue`]:
//!
//! ```rust,no_run
//! use respite::{cmd, ConnectionAddr, PipelinedConnection};
//!
//! # async fn run() -> respite::RedisResult<()> {
//! let con = PipelinedConnection::connect(ConnectionAddr::new("127.0.0.1", 6379)).await?;
//! cmd("SET").arg("my_key").arg(42).exec_async(&con).await?;
//! let value: i64 = cmd("GET").arg("my_key").query_async(&con).await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```
//!
//! The connection handle is cheap to clone and safe to share between
//! tasks; requests from concurrent callers are pipelined over the single
//! stream and their replies are matched back strictly in submission
//! order. When the socket fails, every call that was already on the wire
//! fails with an I/O error and the connection re-establishes itself in
//! the background.
//!
//! # Cluster Operation
//!
//! The [`ClusterClient`] speaks to a whole cluster. It learns the slot
//! layout from `CLUSTER SLOTS`, keeps one pipelined connection per
//! master, and transparently follows `MOVED` (with a topology refresh)
//! and `ASK` (with an `ASKING` handshake) redirects:
//!
//! ```rust,no_run
//! use respite::{cmd, ClusterClient, ClusterConfig, ConnectionAddr};
//!
//! # async fn run() -> respite::RedisResult<()> {
//! let config = ClusterConfig::new(vec![
//!     ConnectionAddr::new("127.0.0.1", 7000),
//!     ConnectionAddr::new("127.0.0.1", 7001),
//! ]);
//! let cluster = ClusterClient::connect(config).await?;
//! cmd("SET").arg("{user1000}.name").arg("amy").exec_async(&cluster).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Commands that carry no key, such as `PING` or `CLUSTER SLOTS`, must
//! be marked with [`Cmd::keyless`] so the router sends them to an
//! arbitrary node instead of hashing argument one.
//!
//! # Error Handling
//!
//! Server error lines are classified by their leading token (`MOVED`,
//! `WRONGTYPE`, `BUSYGROUP`, ...) into [`ErrorKind`] variants when a
//! typed reply is requested. Framing problems surface as
//! `ErrorKind::ParseError`, socket problems as `ErrorKind::IoError`.
//! Every command resolves to exactly one typed result or one classified
//! error.

#![deny(non_camel_case_types)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

#[macro_use]
mod macros;

pub mod geo;
pub mod pubsub;
pub mod streams;

mod aio;
mod cluster;
mod cluster_routing;
mod cmd;
mod connection;
mod parser;
mod types;

pub use crate::aio::{PipelinedConnection, RedisExecutor};
pub use crate::cluster::{ClusterClient, ClusterConfig, RetryParams};
pub use crate::cluster_routing::{slot_for_key, Node, Partition};
pub use crate::cmd::{cmd, Cmd};
pub use crate::connection::{ConnectionAddr, TcpSettings};
pub use crate::parser::{parse_redis_value, parse_redis_value_async, Parser, ValueCodec};
pub use crate::types::{
    from_owned_redis_value, from_redis_value, Aggregate, DurationMillis, DurationSeconds,
    ErrorKind, ExistenceCheck, Expiry, FromRedisValue, InfoDict, KeyType, LcsMatch, LcsMatches,
    LexBound, Limit, MigrateOptions, RedisError, RedisFuture, RedisResult, RedisWrite,
    RestoreOptions, ScanOptions, ScoreBound, SetExpiry, SetOptions, SortOptions, SortOrder,
    ToRedisArgs, TtlMillis, TtlSeconds, UnixMillis, UnixSeconds, Value, Weights,
};
