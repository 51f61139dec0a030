use crate::cmd::Cmd;
use crate::connection::ConnectionAddr;
use crate::types::{from_redis_value, ErrorKind, RedisResult, Value};

pub(crate) const SLOT_COUNT: u16 = 16384;

/// Computes the hash slot a key belongs to.
///
/// If the key contains a `{tag}` section with a non-empty tag, only the
/// tag is hashed; this is what lets applications force related keys onto
/// the same slot.
pub fn slot_for_key(key: &[u8]) -> u16 {
    let key = match get_hashtag(key) {
        Some(tag) => tag,
        None => key,
    };
    crc16::State::<crc16::XMODEM>::calculate(key) % SLOT_COUNT
}

fn get_hashtag(key: &[u8]) -> Option<&[u8]> {
    let open = key.iter().position(|v| *v == b'{')?;
    let close = key[open..].iter().position(|v| *v == b'}')?;
    let tag = &key[open + 1..open + close];
    if tag.is_empty() {
        None
    } else {
        Some(tag)
    }
}

/// Where a command must be dispatched in cluster mode.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum Route {
    /// The command addresses a key; dispatch by slot.
    Slot(u16),
    /// The command addresses no key; any node will do.
    Any,
}

/// Derives the route for a command.
///
/// By convention the key sits at argument index 1 (index 0 is the verb).
/// Commands without a key must be marked via [`Cmd::keyless`]; there is
/// no reliable way to derive keylessness from the argument list itself.
pub(crate) fn route_for_cmd(cmd: &Cmd) -> Route {
    if cmd.is_keyless() {
        return Route::Any;
    }
    match cmd.arg_idx(1) {
        Some(key) => Route::Slot(slot_for_key(key)),
        None => Route::Any,
    }
}

/// A cluster node as reported by `CLUSTER SLOTS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// The node id, an opaque string. Older servers omit it.
    pub id: String,
    /// The address clients should connect to.
    pub addr: ConnectionAddr,
}

/// A contiguous slot range and the nodes serving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// First slot of the range, inclusive.
    pub start: u16,
    /// Last slot of the range, inclusive.
    pub end: u16,
    /// The master serving the range.
    pub master: Node,
    /// Replicas of the master.
    pub replicas: Vec<Node>,
}

fn parse_node(v: &Value) -> RedisResult<Node> {
    let items = match v.as_sequence() {
        Some(items) if items.len() >= 2 => items,
        _ => {
            fail!((
                ErrorKind::ParseError,
                "Malformed CLUSTER SLOTS reply",
                format!("bad node entry {v:?}"),
            ))
        }
    };
    let host: String = from_redis_value(&items[0])?;
    let port: u16 = from_redis_value(&items[1])?;
    if host.is_empty() {
        fail!((
            ErrorKind::ParseError,
            "Malformed CLUSTER SLOTS reply",
            "empty node host".to_string(),
        ));
    }
    let id = match items.get(2) {
        Some(v) => from_redis_value(v)?,
        None => String::new(),
    };
    Ok(Node {
        id,
        addr: ConnectionAddr::new(host, port),
    })
}

/// Parses a `CLUSTER SLOTS` reply into partitions.
pub(crate) fn parse_cluster_slots(value: &Value) -> RedisResult<Vec<Partition>> {
    let entries = match value.as_sequence() {
        Some(entries) => entries,
        None => {
            fail!((
                ErrorKind::ParseError,
                "Malformed CLUSTER SLOTS reply",
                format!("expected an array, got {value:?}"),
            ))
        }
    };

    let mut partitions = Vec::with_capacity(entries.len());
    for entry in entries {
        let items = match entry.as_sequence() {
            Some(items) if items.len() >= 3 => items,
            _ => {
                fail!((
                    ErrorKind::ParseError,
                    "Malformed CLUSTER SLOTS reply",
                    format!("bad slot entry {entry:?}"),
                ))
            }
        };
        let start: u16 = from_redis_value(&items[0])?;
        let end: u16 = from_redis_value(&items[1])?;
        if start > end || end >= SLOT_COUNT {
            fail!((
                ErrorKind::ParseError,
                "Malformed CLUSTER SLOTS reply",
                format!("bad slot range {start}..{end}"),
            ));
        }
        let master = parse_node(&items[2])?;
        let replicas = items[3..]
            .iter()
            .map(parse_node)
            .collect::<RedisResult<Vec<Node>>>()?;
        partitions.push(Partition {
            start,
            end,
            master,
            replicas,
        });
    }

    if partitions.is_empty() {
        fail!((
            ErrorKind::ParseError,
            "Malformed CLUSTER SLOTS reply",
            "no slot ranges reported".to_string(),
        ));
    }
    partitions.sort_by_key(|partition| partition.start);
    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::cmd;

    #[test]
    fn crc16_matches_the_reference_vector() {
        // CRC16/XMODEM of "123456789" is 0x31C3; mod 16384 that is 12739.
        assert_eq!(
            crc16::State::<crc16::XMODEM>::calculate(b"123456789"),
            0x31C3
        );
        assert_eq!(slot_for_key(b"123456789"), 12739);
    }

    #[test]
    fn hashtag_section_replaces_the_key() {
        assert_eq!(
            slot_for_key(b"{user1000}.following"),
            slot_for_key(b"user1000")
        );
        assert_eq!(
            slot_for_key(b"{user1000}.followers"),
            slot_for_key(b"{user1000}.following")
        );
    }

    #[test]
    fn hashtag_edge_cases() {
        assert_eq!(get_hashtag(b"foo{bar}baz"), Some(&b"bar"[..]));
        // The first closing brace terminates the tag.
        assert_eq!(get_hashtag(b"foo{{bar}}zap"), Some(&b"{bar"[..]));
        // An empty tag means the whole key is hashed.
        assert_eq!(get_hashtag(b"foo{}{baz}"), None);
        assert_eq!(get_hashtag(b"foobar"), None);
        assert_eq!(get_hashtag(b"foo{bar"), None);
    }

    #[test]
    fn routes_keyed_commands_by_argument_one() {
        let mut c = cmd("GET");
        c.arg("{user1000}.following");
        assert_eq!(
            route_for_cmd(&c),
            Route::Slot(slot_for_key(b"user1000"))
        );
    }

    #[test]
    fn keyless_commands_route_anywhere() {
        let mut c = cmd("CLUSTER");
        c.arg("SLOTS").keyless();
        assert_eq!(route_for_cmd(&c), Route::Any);
        assert_eq!(route_for_cmd(&cmd("PING")), Route::Any);
    }

    fn node_value(host: &str, port: i64, id: &str) -> Value {
        Value::Array(vec![
            Value::BulkString(host.as_bytes().to_vec()),
            Value::Int(port),
            Value::BulkString(id.as_bytes().to_vec()),
        ])
    }

    #[test]
    fn parses_cluster_slots_reply() {
        let reply = Value::Array(vec![
            Value::Array(vec![
                Value::Int(8192),
                Value::Int(16383),
                node_value("127.0.0.1", 7001, "node-b"),
            ]),
            Value::Array(vec![
                Value::Int(0),
                Value::Int(8191),
                node_value("127.0.0.1", 7000, "node-a"),
                node_value("127.0.0.1", 7100, "node-a-replica"),
            ]),
        ]);
        let partitions = parse_cluster_slots(&reply).unwrap();
        assert_eq!(partitions.len(), 2);
        // Sorted by range start.
        assert_eq!(partitions[0].start, 0);
        assert_eq!(partitions[0].end, 8191);
        assert_eq!(partitions[0].master.addr, ConnectionAddr::new("127.0.0.1", 7000));
        assert_eq!(partitions[0].replicas.len(), 1);
        assert_eq!(partitions[1].master.id, "node-b");
    }

    #[test]
    fn rejects_malformed_slots_replies() {
        assert!(parse_cluster_slots(&Value::Int(3)).is_err());
        assert!(parse_cluster_slots(&Value::Array(vec![])).is_err());
        let bad_range = Value::Array(vec![Value::Array(vec![
            Value::Int(100),
            Value::Int(5),
            node_value("127.0.0.1", 7000, ""),
        ])]);
        assert!(parse_cluster_slots(&bad_range).is_err());
    }
}
