//! Defines types to use with the streams commands.

use std::collections::HashMap;

use crate::types::{
    from_redis_value, ErrorKind, FromRedisValue, RedisError, RedisResult, RedisWrite, ToRedisArgs,
    Value,
};

/// Utility enum for passing `MAXLEN [= or ~] [COUNT]` arguments.
/// The enum value represents the count.
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub enum StreamMaxlen {
    /// Match an exact count.
    Equals(usize),
    /// Match an approximate count.
    Approx(usize),
}

impl ToRedisArgs for StreamMaxlen {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        let (ch, val) = match *self {
            StreamMaxlen::Equals(v) => ("=", v),
            StreamMaxlen::Approx(v) => ("~", v),
        };
        out.write_arg(b"MAXLEN");
        out.write_arg(ch.as_bytes());
        val.write_redis_args(out);
    }
}

/// Builder options for the `XCLAIM` command.
#[derive(Default, Debug)]
pub struct StreamClaimOptions {
    /// Set `IDLE <milliseconds>` cmd arg.
    idle: Option<usize>,
    /// Set `TIME <unix epoch milliseconds>` cmd arg.
    time: Option<usize>,
    /// Set `RETRYCOUNT <count>` cmd arg.
    retry: Option<usize>,
    /// Set `FORCE` cmd arg.
    force: bool,
    /// Set `JUSTID` cmd arg. Be advised: the response type changes with
    /// this option.
    justid: bool,
}

impl StreamClaimOptions {
    /// Set `IDLE <milliseconds>` cmd arg.
    pub fn idle(mut self, ms: usize) -> Self {
        self.idle = Some(ms);
        self
    }

    /// Set `TIME <unix epoch milliseconds>` cmd arg.
    pub fn time(mut self, ms_time: usize) -> Self {
        self.time = Some(ms_time);
        self
    }

    /// Set `RETRYCOUNT <count>` cmd arg.
    pub fn retry(mut self, count: usize) -> Self {
        self.retry = Some(count);
        self
    }

    /// Set `FORCE` cmd arg to true.
    pub fn with_force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Set `JUSTID` cmd arg to true. Be advised: the response type
    /// changes with this option.
    pub fn with_justid(mut self) -> Self {
        self.justid = true;
        self
    }
}

impl ToRedisArgs for StreamClaimOptions {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        if let Some(ref ms) = self.idle {
            ("IDLE", ms).write_redis_args(out);
        }
        if let Some(ref ms_time) = self.time {
            ("TIME", ms_time).write_redis_args(out);
        }
        if let Some(ref count) = self.retry {
            ("RETRYCOUNT", count).write_redis_args(out);
        }
        if self.force {
            out.write_arg(b"FORCE");
        }
        if self.justid {
            out.write_arg(b"JUSTID");
        }
    }
}

type SRGroup = Option<(Vec<Vec<u8>>, Vec<Vec<u8>>)>;

/// Builder options for the `XREAD` and `XREADGROUP` commands.
#[derive(Default, Debug)]
pub struct StreamReadOptions {
    /// Set the `BLOCK <milliseconds>` cmd arg.
    block: Option<usize>,
    /// Set the `COUNT <count>` cmd arg.
    count: Option<usize>,
    /// Set the `NOACK` cmd arg.
    noack: Option<bool>,
    /// Set the `GROUP <groupname> <consumername>` cmd arg.
    /// This option toggles the cmd from `XREAD` to `XREADGROUP`.
    group: SRGroup,
}

impl StreamReadOptions {
    /// Indicates whether the command is participating in a group and
    /// generating ACKs.
    pub fn read_only(&self) -> bool {
        self.group.is_none()
    }

    /// Sets the command so that it avoids adding the message to the PEL
    /// in cases where reliability is not a requirement and occasional
    /// message loss is acceptable.
    pub fn noack(mut self) -> Self {
        self.noack = Some(true);
        self
    }

    /// Sets the block time in milliseconds.
    pub fn block(mut self, ms: usize) -> Self {
        self.block = Some(ms);
        self
    }

    /// Sets the maximum number of elements to return per stream.
    pub fn count(mut self, n: usize) -> Self {
        self.count = Some(n);
        self
    }

    /// Sets the name of a consumer group associated to the stream.
    pub fn group<GN: ToRedisArgs, CN: ToRedisArgs>(
        mut self,
        group_name: GN,
        consumer_name: CN,
    ) -> Self {
        self.group = Some((
            ToRedisArgs::to_redis_args(&group_name),
            ToRedisArgs::to_redis_args(&consumer_name),
        ));
        self
    }
}

impl ToRedisArgs for StreamReadOptions {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        if let Some(ref group) = self.group {
            out.write_arg(b"GROUP");
            for i in &group.0 {
                out.write_arg(i);
            }
            for i in &group.1 {
                out.write_arg(i);
            }
        }

        if let Some(ref ms) = self.block {
            ("BLOCK", ms).write_redis_args(out);
        }

        if let Some(ref n) = self.count {
            ("COUNT", n).write_redis_args(out);
        }

        if self.group.is_some() {
            // NOACK is only available with XREADGROUP.
            if self.noack == Some(true) {
                out.write_arg(b"NOACK");
            }
        }
    }
}

/// Builder options for `XGROUP CREATE`.
#[derive(Default, Debug, Clone, Copy)]
pub struct StreamGroupOptions {
    mkstream: bool,
}

impl StreamGroupOptions {
    /// Create the stream if it does not exist yet.
    pub fn mkstream(mut self) -> Self {
        self.mkstream = true;
        self
    }
}

impl ToRedisArgs for StreamGroupOptions {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        if self.mkstream {
            out.write_arg(b"MKSTREAM");
        }
    }
}

/// Represents a stream entry id and its field/value pairs.
#[derive(Default, Debug, Clone)]
pub struct StreamId {
    /// The entry id of this particular message.
    pub id: String,
    /// All fields in this message, associated with their values.
    pub map: HashMap<String, Value>,
}

impl StreamId {
    fn from_array_value(v: &Value) -> RedisResult<Self> {
        let mut stream_id = StreamId::default();
        if let Some(values) = v.as_sequence() {
            if let Some(v) = values.first() {
                stream_id.id = from_redis_value(v)?;
            }
            if let Some(v) = values.get(1) {
                stream_id.map = from_redis_value(v)?;
            }
        }
        Ok(stream_id)
    }

    /// Fetches the value of a given field and converts it to the
    /// requested type.
    pub fn get<T: FromRedisValue>(&self, key: &str) -> Option<T> {
        self.map.get(key).and_then(|x| from_redis_value(x).ok())
    }

    /// Does the message contain a particular field?
    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Returns how many field/value pairs exist in this message.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if there are no field/value pairs in this message.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromRedisValue for StreamId {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        StreamId::from_array_value(v)
    }
}

/// Represents a stream key and its entries, parsed from `XREAD`-style
/// replies.
#[derive(Default, Debug, Clone)]
pub struct StreamKey {
    /// The stream key.
    pub key: String,
    /// The parsed entries.
    pub ids: Vec<StreamId>,
}

/// Reply type used with the `XREAD` and `XREADGROUP` commands.
#[derive(Default, Debug, Clone)]
pub struct StreamReadReply {
    /// One entry per requested stream key with new messages.
    pub keys: Vec<StreamKey>,
}

impl FromRedisValue for StreamReadReply {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        let rows: Vec<(String, Vec<StreamId>)> = from_redis_value(v)?;
        let keys = rows
            .into_iter()
            .map(|(key, ids)| StreamKey { key, ids })
            .collect();
        Ok(StreamReadReply { keys })
    }
}

/// Reply type used with the `XRANGE` and `XREVRANGE` commands.
#[derive(Default, Debug, Clone)]
pub struct StreamRangeReply {
    /// The entries matching the requested id range.
    pub ids: Vec<StreamId>,
}

impl FromRedisValue for StreamRangeReply {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        let ids: Vec<StreamId> = from_redis_value(v)?;
        Ok(StreamRangeReply { ids })
    }
}

/// Reply type used with the `XCLAIM` command.
///
/// With the `JUSTID` option the server returns only entry ids; decode
/// those as `Vec<String>` instead.
#[derive(Default, Debug, Clone)]
pub struct StreamClaimReply {
    /// The entries whose ownership was transferred.
    pub ids: Vec<StreamId>,
}

impl FromRedisValue for StreamClaimReply {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        let ids: Vec<StreamId> = from_redis_value(v)?;
        Ok(StreamClaimReply { ids })
    }
}

/// Reply type used with the summary form of the `XPENDING` command.
#[derive(Debug, Clone, Default)]
pub enum StreamPendingReply {
    /// The group has no pending entries.
    #[default]
    Empty,
    /// The group has pending entries.
    Data(StreamPendingData),
}

impl StreamPendingReply {
    /// Returns how many records are pending.
    pub fn count(&self) -> usize {
        match self {
            StreamPendingReply::Empty => 0,
            StreamPendingReply::Data(x) => x.count,
        }
    }
}

/// Inner reply type when `XPENDING` has data.
#[derive(Default, Debug, Clone)]
pub struct StreamPendingData {
    /// Number of pending messages in the group.
    pub count: usize,
    /// Id of the first pending message.
    pub start_id: String,
    /// Id of the last pending message.
    pub end_id: String,
    /// Every consumer in the group with at least one pending message,
    /// and how many it has.
    pub consumers: Vec<StreamInfoConsumer>,
}

impl FromRedisValue for StreamPendingReply {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        type Inner = (
            usize,
            Option<String>,
            Option<String>,
            Option<Vec<(String, String)>>,
        );
        let (count, start, end, consumer_data): Inner = from_redis_value(v)?;

        if count == 0 {
            return Ok(StreamPendingReply::Empty);
        }

        let start_id = match start {
            Some(id) => id,
            None => unexpected_pending_shape(v, "non-zero pending count without a start id")?,
        };
        let end_id = match end {
            Some(id) => id,
            None => unexpected_pending_shape(v, "non-zero pending count without an end id")?,
        };
        let consumers = consumer_data
            .unwrap_or_default()
            .into_iter()
            .map(|(name, pending)| StreamInfoConsumer {
                name,
                pending: pending.parse().unwrap_or_default(),
                ..Default::default()
            })
            .collect();

        Ok(StreamPendingReply::Data(StreamPendingData {
            count,
            start_id,
            end_id,
            consumers,
        }))
    }
}

fn unexpected_pending_shape(v: &Value, detail: &str) -> RedisResult<String> {
    Err(RedisError::from((
        ErrorKind::ParseError,
        "Reply was of unexpected shape",
        format!("{detail} (reply was {v:?})"),
    )))
}

/// A single pending message of the extended `XPENDING` form.
#[derive(Default, Debug, Clone)]
pub struct StreamPendingId {
    /// The id of the message.
    pub id: String,
    /// The consumer currently owning the message.
    pub consumer: String,
    /// Milliseconds elapsed since the message was last delivered to the
    /// consumer.
    pub last_delivered_ms: usize,
    /// How many times this message was delivered.
    pub times_delivered: usize,
}

/// Reply type used with the extended form of the `XPENDING` command.
#[derive(Default, Debug, Clone)]
pub struct StreamPendingCountReply {
    /// One record per pending message.
    pub ids: Vec<StreamPendingId>,
}

impl FromRedisValue for StreamPendingCountReply {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        let rows: Vec<(String, String, usize, usize)> = from_redis_value(v)?;
        let ids = rows
            .into_iter()
            .map(
                |(id, consumer, last_delivered_ms, times_delivered)| StreamPendingId {
                    id,
                    consumer,
                    last_delivered_ms,
                    times_delivered,
                },
            )
            .collect();
        Ok(StreamPendingCountReply { ids })
    }
}

// The XINFO replies are flat field/value arrays. Their decoders must not
// rely on field order or completeness: fields are matched by name,
// unknown names are skipped and missing ones keep their default.
fn fields_of(v: &Value) -> RedisResult<Vec<(String, &Value)>> {
    match v.as_map_iter() {
        Some(iter) => iter
            .map(|(field, value)| Ok((from_redis_value::<String>(field)?, value)))
            .collect(),
        None => Err(RedisError::from((
            ErrorKind::ParseError,
            "Reply was of unexpected shape",
            format!("Expected a field/value array of even length (reply was {v:?})"),
        ))),
    }
}

/// Reply type used with `XINFO STREAM`, containing general information
/// about the stream stored at the specified key.
#[derive(Default, Debug, Clone)]
pub struct StreamInfoStreamReply {
    /// Number of entries in the stream.
    pub length: usize,
    /// Number of keys of the underlying radix tree.
    pub radix_tree_keys: usize,
    /// Number of nodes of the underlying radix tree.
    pub radix_tree_nodes: usize,
    /// Number of consumer groups associated with the stream.
    pub groups: usize,
    /// The last id generated for the stream, which may differ from the
    /// last entry id if entries were deleted.
    pub last_generated_id: String,
    /// Highest entry id that was deleted from the stream.
    pub max_deleted_entry_id: String,
    /// Count of all entries ever added to the stream.
    pub entries_added: usize,
    /// The very first entry in the stream.
    pub first_entry: StreamId,
    /// The very last entry in the stream.
    pub last_entry: StreamId,
}

impl FromRedisValue for StreamInfoStreamReply {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        let mut reply = StreamInfoStreamReply::default();
        for (field, value) in fields_of(v)? {
            match field.as_str() {
                "length" => reply.length = from_redis_value(value)?,
                "radix-tree-keys" => reply.radix_tree_keys = from_redis_value(value)?,
                "radix-tree-nodes" => reply.radix_tree_nodes = from_redis_value(value)?,
                "groups" => reply.groups = from_redis_value(value)?,
                "last-generated-id" => reply.last_generated_id = from_redis_value(value)?,
                "max-deleted-entry-id" => reply.max_deleted_entry_id = from_redis_value(value)?,
                "entries-added" => reply.entries_added = from_redis_value(value)?,
                "first-entry" => reply.first_entry = StreamId::from_array_value(value)?,
                "last-entry" => reply.last_entry = StreamId::from_array_value(value)?,
                _ => {}
            }
        }
        Ok(reply)
    }
}

/// A group parsed from the `XINFO GROUPS` reply.
#[derive(Default, Debug, Clone)]
pub struct StreamInfoGroup {
    /// The group name.
    pub name: String,
    /// Number of consumers known in the group.
    pub consumers: usize,
    /// Number of messages delivered to the group but not yet
    /// acknowledged.
    pub pending: usize,
    /// Last id delivered to this group.
    pub last_delivered_id: String,
    /// Number of entries the group had read, if the server reports it.
    pub entries_read: Option<usize>,
    /// Number of entries not yet delivered to the group's consumers, if
    /// the server reports it.
    pub lag: Option<usize>,
}

/// Reply type used with the `XINFO GROUPS` command.
#[derive(Default, Debug, Clone)]
pub struct StreamInfoGroupsReply {
    /// All consumer groups of the stream.
    pub groups: Vec<StreamInfoGroup>,
}

impl FromRedisValue for StreamInfoGroupsReply {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        let entries = v
            .as_sequence()
            .ok_or_else(|| unexpected_reply_shape(v, "Expected an array of groups"))?;
        let mut reply = StreamInfoGroupsReply::default();
        for entry in entries {
            let mut group = StreamInfoGroup::default();
            for (field, value) in fields_of(entry)? {
                match field.as_str() {
                    "name" => group.name = from_redis_value(value)?,
                    "consumers" => group.consumers = from_redis_value(value)?,
                    "pending" => group.pending = from_redis_value(value)?,
                    "last-delivered-id" => group.last_delivered_id = from_redis_value(value)?,
                    "entries-read" => group.entries_read = from_redis_value(value)?,
                    "lag" => group.lag = from_redis_value(value)?,
                    _ => {}
                }
            }
            reply.groups.push(group);
        }
        Ok(reply)
    }
}

/// A consumer parsed from the `XINFO CONSUMERS` reply.
#[derive(Default, Debug, Clone)]
pub struct StreamInfoConsumer {
    /// Name of the consumer.
    pub name: String,
    /// Number of pending messages for this consumer.
    pub pending: usize,
    /// This consumer's idle time in milliseconds.
    pub idle: usize,
    /// Milliseconds since this consumer last attempted an interaction,
    /// if the server reports it.
    pub seen_time: Option<usize>,
    /// Milliseconds since this consumer last successfully interacted, if
    /// the server reports it.
    pub active_time: Option<usize>,
}

/// Reply type used with the `XINFO CONSUMERS` command.
#[derive(Default, Debug, Clone)]
pub struct StreamInfoConsumersReply {
    /// Every consumer in a specific consumer group.
    pub consumers: Vec<StreamInfoConsumer>,
}

impl FromRedisValue for StreamInfoConsumersReply {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        let entries = v
            .as_sequence()
            .ok_or_else(|| unexpected_reply_shape(v, "Expected an array of consumers"))?;
        let mut reply = StreamInfoConsumersReply::default();
        for entry in entries {
            let mut consumer = StreamInfoConsumer::default();
            for (field, value) in fields_of(entry)? {
                match field.as_str() {
                    "name" => consumer.name = from_redis_value(value)?,
                    "pending" => consumer.pending = from_redis_value(value)?,
                    "idle" => consumer.idle = from_redis_value(value)?,
                    "seen-time" => consumer.seen_time = from_redis_value(value)?,
                    "active-time" => consumer.active_time = from_redis_value(value)?,
                    _ => {}
                }
            }
            reply.consumers.push(consumer);
        }
        Ok(reply)
    }
}

fn unexpected_reply_shape(v: &Value, detail: &str) -> RedisError {
    RedisError::from((
        ErrorKind::ParseError,
        "Reply was of unexpected shape",
        format!("{detail} (reply was {v:?})"),
    ))
}

/// A consumer entry of the `XINFO STREAM FULL` reply.
#[derive(Default, Debug, Clone)]
pub struct StreamFullConsumer {
    /// Name of the consumer.
    pub name: String,
    /// Size of the consumer's pending entries list.
    pub pel_count: usize,
    /// Milliseconds since this consumer last attempted an interaction.
    pub seen_time: usize,
    /// Milliseconds since this consumer last successfully interacted.
    pub active_time: usize,
}

/// A group entry of the `XINFO STREAM FULL` reply.
#[derive(Default, Debug, Clone)]
pub struct StreamFullGroup {
    /// The group name.
    pub name: String,
    /// Last id delivered to this group.
    pub last_delivered_id: String,
    /// Size of the group's pending entries list.
    pub pel_count: usize,
    /// Every consumer of the group.
    pub consumers: Vec<StreamFullConsumer>,
}

/// Reply type used with `XINFO STREAM` in its `FULL` form.
#[derive(Default, Debug, Clone)]
pub struct StreamInfoFullReply {
    /// Number of entries in the stream.
    pub length: usize,
    /// Number of keys of the underlying radix tree.
    pub radix_tree_keys: usize,
    /// Number of nodes of the underlying radix tree.
    pub radix_tree_nodes: usize,
    /// The last id generated for the stream.
    pub last_generated_id: String,
    /// Highest entry id that was deleted from the stream.
    pub max_deleted_entry_id: String,
    /// Count of all entries ever added to the stream.
    pub entries_added: usize,
    /// The entries of the stream, bounded by the requested `COUNT`.
    pub entries: Vec<StreamId>,
    /// The consumer groups of the stream.
    pub groups: Vec<StreamFullGroup>,
}

impl FromRedisValue for StreamFullConsumer {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        let mut consumer = StreamFullConsumer::default();
        for (field, value) in fields_of(v)? {
            match field.as_str() {
                "name" => consumer.name = from_redis_value(value)?,
                "pel-count" => consumer.pel_count = from_redis_value(value)?,
                "seen-time" => consumer.seen_time = from_redis_value(value)?,
                "active-time" => consumer.active_time = from_redis_value(value)?,
                _ => {}
            }
        }
        Ok(consumer)
    }
}

impl FromRedisValue for StreamFullGroup {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        let mut group = StreamFullGroup::default();
        for (field, value) in fields_of(v)? {
            match field.as_str() {
                "name" => group.name = from_redis_value(value)?,
                "last-delivered-id" => group.last_delivered_id = from_redis_value(value)?,
                "pel-count" => group.pel_count = from_redis_value(value)?,
                "consumers" => group.consumers = from_redis_value(value)?,
                _ => {}
            }
        }
        Ok(group)
    }
}

impl FromRedisValue for StreamInfoFullReply {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        let mut reply = StreamInfoFullReply::default();
        for (field, value) in fields_of(v)? {
            match field.as_str() {
                "length" => reply.length = from_redis_value(value)?,
                "radix-tree-keys" => reply.radix_tree_keys = from_redis_value(value)?,
                "radix-tree-nodes" => reply.radix_tree_nodes = from_redis_value(value)?,
                "last-generated-id" => reply.last_generated_id = from_redis_value(value)?,
                "max-deleted-entry-id" => reply.max_deleted_entry_id = from_redis_value(value)?,
                "entries-added" => reply.entries_added = from_redis_value(value)?,
                "entries" => reply.entries = from_redis_value(value)?,
                "groups" => reply.groups = from_redis_value(value)?,
                _ => {}
            }
        }
        Ok(reply)
    }
}
