//! Cluster support: slot-aware dispatch, `MOVED`/`ASK` redirect handling
//! and live topology refresh.
//!
//! A [`ClusterClient`] keeps one [`PipelinedConnection`] per master node
//! and an immutable topology snapshot behind an atomically swappable
//! reference. Commands are routed by the CRC16 slot of their key
//! argument; redirect replies from the server are intercepted before
//! classification, everything else passes through untouched.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use backon::{BackoffBuilder, ExponentialBuilder};
use log::{debug, trace, warn};
use rand::seq::IteratorRandom;
use tokio::sync::Mutex;

use crate::aio::{PipelinedConnection, RedisExecutor};
use crate::cluster_routing::{parse_cluster_slots, route_for_cmd, Partition, Route};
use crate::cmd::{cmd, Cmd};
use crate::connection::{ConnectionAddr, TcpSettings};
use crate::types::{
    classify_server_error, ErrorKind, RedisError, RedisFuture, RedisResult, Value,
};

/// Exponential backoff parameters for retried cluster commands.
///
/// Only I/O failures and transient cluster errors (`TRYAGAIN`,
/// `CLUSTERDOWN`, redirect storms) are retried; everything else
/// propagates on the first attempt.
#[derive(Clone, Copy, Debug)]
pub struct RetryParams {
    /// Delay before the first retry.
    pub base: Duration,
    /// Multiplier applied to the delay after every retry.
    pub factor: f32,
    /// Total number of attempts, the first one included.
    pub max_attempts: usize,
}

impl Default for RetryParams {
    fn default() -> Self {
        RetryParams {
            base: Duration::from_millis(100),
            factor: 2.0,
            max_attempts: 5,
        }
    }
}

impl RetryParams {
    fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(self.base)
            .with_factor(self.factor)
            .with_max_times(self.max_attempts.saturating_sub(1))
            .build()
    }
}

/// Configuration of a cluster client.
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    seeds: Vec<ConnectionAddr>,
    retry: RetryParams,
    tcp: TcpSettings,
}

impl ClusterConfig {
    /// Creates a configuration from a list of seed addresses. The seeds
    /// are tried in order during initialization and topology refresh.
    pub fn new(seeds: Vec<ConnectionAddr>) -> ClusterConfig {
        ClusterConfig {
            seeds,
            retry: RetryParams::default(),
            tcp: TcpSettings::default(),
        }
    }

    /// Sets the retry parameters.
    pub fn retry(mut self, retry: RetryParams) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the TCP settings applied to every node connection.
    pub fn tcp_settings(mut self, tcp: TcpSettings) -> Self {
        self.tcp = tcp;
        self
    }
}

// One immutable topology snapshot. Refresh builds a whole new snapshot
// and swaps it in; nothing in here is ever mutated in place.
#[derive(Debug)]
struct Topology {
    partitions: Vec<Partition>,
    // Keyed by the last slot of each range, so a `range(slot..)` lookup
    // finds the covering partition.
    slots: BTreeMap<u16, String>,
    executors: HashMap<String, PipelinedConnection>,
}

impl Topology {
    fn executor_for_slot(&self, slot: u16) -> Option<PipelinedConnection> {
        let (_, addr) = self.slots.range(slot..).next()?;
        self.executors.get(addr).cloned()
    }

    fn random_executor(&self) -> Option<PipelinedConnection> {
        self.executors
            .values()
            .choose(&mut rand::thread_rng())
            .cloned()
    }

    fn close_all(&self) {
        for executor in self.executors.values() {
            executor.close();
        }
    }
}

/// A topology-aware executor for a Redis cluster.
///
/// The client owns one pipelined connection per master node; closing the
/// client closes all of them. The handle is cheap to share behind an
/// `Arc` across tasks.
#[derive(Debug)]
pub struct ClusterClient {
    config: ClusterConfig,
    topology: ArcSwap<Topology>,
    // Single-flight guard: only one topology rebuild runs at a time, and
    // the swapped-out snapshot is closed only after the new one is
    // published.
    refresh_lock: Mutex<()>,
}

impl ClusterClient {
    /// Connects to the cluster through the configured seeds.
    ///
    /// Seeds are tried in order; the first node that answers
    /// `CLUSTER SLOTS` defines the initial topology, and one connection
    /// is opened per unique master address.
    pub async fn connect(config: ClusterConfig) -> RedisResult<ClusterClient> {
        let topology = build_topology(&config, &[]).await?;
        Ok(ClusterClient {
            config,
            topology: ArcSwap::from_pointee(topology),
            refresh_lock: Mutex::new(()),
        })
    }

    /// The partitions of the current topology snapshot.
    pub fn partitions(&self) -> Vec<Partition> {
        self.topology.load().partitions.clone()
    }

    /// Closes every node connection owned by the client.
    pub fn close(&self) {
        self.topology.load().close_all();
    }

    /// Re-reads `CLUSTER SLOTS` and atomically replaces the topology
    /// snapshot. The connections of the previous snapshot are closed
    /// after the new one is installed.
    pub async fn refresh(&self) -> RedisResult<()> {
        let _guard = self.refresh_lock.lock().await;
        let current = self.topology.load_full();
        let mut preferred: Vec<ConnectionAddr> = Vec::new();
        for partition in &current.partitions {
            if !preferred.contains(&partition.master.addr) {
                preferred.push(partition.master.addr.clone());
            }
        }
        let new_topology = build_topology(&self.config, &preferred).await?;
        debug!(
            "cluster topology refreshed: {} partitions over {} masters",
            new_topology.partitions.len(),
            new_topology.executors.len()
        );
        let old = self.topology.swap(Arc::new(new_topology));
        old.close_all();
        Ok(())
    }

    async fn dispatch(&self, cmd: &Cmd) -> RedisResult<Value> {
        let topology = self.topology.load_full();
        let executor = match route_for_cmd(cmd) {
            Route::Slot(slot) => topology.executor_for_slot(slot).ok_or_else(|| {
                RedisError::from(io::Error::other(format!("no node covers slot {slot}")))
            })?,
            Route::Any => topology.random_executor().ok_or_else(|| {
                RedisError::from(io::Error::other("no cluster node available"))
            })?,
        };
        executor.execute_packed(cmd.get_packed_command()).await
    }

    // An ASK redirect is served by the target node only after an ASKING
    // command on the same connection; the topology itself is unchanged,
    // so no refresh happens here.
    async fn ask_redirect(&self, err: &RedisError, command: &Cmd) -> RedisResult<Value> {
        let (addr, slot) = err.redirect_node().ok_or_else(|| {
            RedisError::from((
                ErrorKind::ParseError,
                "Malformed ASK redirect",
                format!("{err}"),
            ))
        })?;
        trace!("ASK redirect for slot {slot} to {addr}");
        let addr: ConnectionAddr = addr.parse()?;
        let addr_key = addr.to_string();

        let known = self.topology.load().executors.get(&addr_key).cloned();
        let (executor, temporary) = match known {
            Some(executor) => (executor, false),
            None => (
                PipelinedConnection::connect_with_settings(addr, self.config.tcp.clone()).await?,
                true,
            ),
        };

        let mut asking = cmd("ASKING");
        asking.keyless();
        let result = async {
            match executor.execute_packed(asking.get_packed_command()).await? {
                Value::Error(line) => Err(classify_server_error(&line)),
                _ => Ok(()),
            }?;
            executor.execute_packed(command.get_packed_command()).await
        }
        .await;

        if temporary {
            executor.close();
        }
        result
    }

    async fn execute_inner(&self, command: &Cmd) -> RedisResult<Value> {
        let mut backoff = self.config.retry.backoff();
        loop {
            match self.dispatch(command).await {
                Ok(Value::Error(line)) => {
                    let err = classify_server_error(&line);
                    match err.kind() {
                        ErrorKind::Moved => {
                            debug!("MOVED redirect, refreshing topology: {line}");
                            self.refresh().await?;
                            match backoff.next() {
                                Some(_) => continue,
                                None => return Err(err),
                            }
                        }
                        ErrorKind::Ask => return self.ask_redirect(&err, command).await,
                        ErrorKind::TryAgain | ErrorKind::ClusterDown => match backoff.next() {
                            Some(delay) => {
                                warn!("transient cluster error, retrying in {delay:?}: {line}");
                                tokio::time::sleep(delay).await;
                                continue;
                            }
                            None => return Err(err),
                        },
                        // Every other server error belongs to the caller.
                        _ => return Ok(Value::Error(line)),
                    }
                }
                Ok(value) => return Ok(value),
                Err(err) if err.is_io_error() => match backoff.next() {
                    Some(delay) => {
                        warn!("cluster dispatch failed, retrying in {delay:?}: {err}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    None => return Err(err),
                },
                Err(err) => return Err(err),
            }
        }
    }
}

impl RedisExecutor for ClusterClient {
    fn execute<'a>(&'a self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        Box::pin(self.execute_inner(cmd))
    }
}

async fn build_topology(
    config: &ClusterConfig,
    preferred: &[ConnectionAddr],
) -> RedisResult<Topology> {
    if config.seeds.is_empty() && preferred.is_empty() {
        fail!((
            ErrorKind::InvalidClientConfig,
            "No seed addresses configured",
        ));
    }

    let mut last_err = None;
    for addr in preferred.iter().chain(config.seeds.iter()) {
        let seed =
            match PipelinedConnection::connect_with_settings(addr.clone(), config.tcp.clone())
                .await
            {
                Ok(connection) => connection,
                Err(err) => {
                    debug!("seed {addr} unreachable: {err}");
                    last_err = Some(err);
                    continue;
                }
            };

        let mut slots_cmd = cmd("CLUSTER");
        slots_cmd.arg("SLOTS").keyless();
        let reply = slots_cmd.query_async::<Value>(&seed).await;
        seed.close();
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                debug!("seed {addr} failed to serve CLUSTER SLOTS: {err}");
                last_err = Some(err);
                continue;
            }
        };

        let partitions = parse_cluster_slots(&reply)?;
        return connect_partitions(config, partitions).await;
    }

    Err(last_err.unwrap_or_else(|| {
        RedisError::from((ErrorKind::IoError, "No cluster seed was reachable"))
    }))
}

async fn connect_partitions(
    config: &ClusterConfig,
    partitions: Vec<Partition>,
) -> RedisResult<Topology> {
    let mut slots = BTreeMap::new();
    let mut executors: HashMap<String, PipelinedConnection> = HashMap::new();

    for partition in &partitions {
        let addr_key = partition.master.addr.to_string();
        slots.insert(partition.end, addr_key.clone());
        if executors.contains_key(&addr_key) {
            continue;
        }
        match PipelinedConnection::connect_with_settings(
            partition.master.addr.clone(),
            config.tcp.clone(),
        )
        .await
        {
            Ok(connection) => {
                executors.insert(addr_key, connection);
            }
            Err(err) => {
                for executor in executors.values() {
                    executor.close();
                }
                return Err(err);
            }
        }
    }

    Ok(Topology {
        partitions,
        slots,
        executors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_bounded_by_max_attempts() {
        let retry = RetryParams {
            base: Duration::from_millis(10),
            factor: 2.0,
            max_attempts: 3,
        };
        let delays: Vec<Duration> = retry.backoff().collect();
        assert_eq!(delays.len(), 2);
        assert!(delays[1] >= delays[0]);
    }

    #[test]
    fn empty_seed_list_is_a_config_error() {
        let config = ClusterConfig::new(vec![]);
        let err = futures_util::future::FutureExt::now_or_never(ClusterClient::connect(config))
            .expect("fails without touching the network")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidClientConfig);
    }
}
