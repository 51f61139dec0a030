//! Decoding of server push messages.
//!
//! Subscription acknowledgements and published messages arrive on the
//! wire as plain arrays whose first bulk string names the message kind.
//! This module turns them into typed records; the stream multiplexing on
//! top of them is the caller's business.

use crate::types::{
    from_redis_value, ErrorKind, FromRedisValue, RedisError, RedisResult, Value,
};

/// What a subscription refers to: a concrete channel or a glob pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    /// A channel subscribed with `SUBSCRIBE`.
    Channel(String),
    /// A pattern subscribed with `PSUBSCRIBE`.
    Pattern(String),
}

/// A push message from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    /// Confirmation of a `SUBSCRIBE` or `PSUBSCRIBE`, with the number of
    /// subscriptions the connection now holds.
    Subscribed {
        /// The channel or pattern that was subscribed.
        key: SubscriptionKey,
        /// Subscription count after the operation.
        count: i64,
    },
    /// Confirmation of an `UNSUBSCRIBE` or `PUNSUBSCRIBE`.
    Unsubscribed {
        /// The channel or pattern that was unsubscribed.
        key: SubscriptionKey,
        /// Subscription count after the operation.
        count: i64,
    },
    /// A message published to a channel this connection subscribed to
    /// directly.
    Message {
        /// The channel the message was published to.
        channel: String,
        /// The raw message payload.
        payload: Vec<u8>,
    },
    /// A message delivered because of a pattern subscription.
    PMessage {
        /// The pattern that matched.
        pattern: String,
        /// The channel the message was published to.
        channel: String,
        /// The raw message payload.
        payload: Vec<u8>,
    },
}

fn push_error(v: &Value, detail: &str) -> RedisError {
    RedisError::from((
        ErrorKind::ParseError,
        "Reply was of unexpected shape",
        format!("{detail} (reply was {v:?})"),
    ))
}

impl FromRedisValue for PushMessage {
    fn from_redis_value(v: &Value) -> RedisResult<PushMessage> {
        let items = v
            .as_sequence()
            .ok_or_else(|| push_error(v, "Expected a push message array"))?;
        let kind: String = match items.first() {
            Some(kind) => from_redis_value(kind)?,
            None => return Err(push_error(v, "Empty push message")),
        };

        match kind.as_str() {
            "subscribe" | "psubscribe" | "unsubscribe" | "punsubscribe" => match items {
                [_, key, count] => {
                    let name: String = from_redis_value(key)?;
                    let key = if kind.starts_with('p') {
                        SubscriptionKey::Pattern(name)
                    } else {
                        SubscriptionKey::Channel(name)
                    };
                    let count: i64 = from_redis_value(count)?;
                    if kind.ends_with("unsubscribe") {
                        Ok(PushMessage::Unsubscribed { key, count })
                    } else {
                        Ok(PushMessage::Subscribed { key, count })
                    }
                }
                _ => Err(push_error(v, "Expected two elements after the kind")),
            },
            "message" => match items {
                [_, channel, payload] => Ok(PushMessage::Message {
                    channel: from_redis_value(channel)?,
                    payload: from_redis_value(payload)?,
                }),
                _ => Err(push_error(v, "Expected two elements after the kind")),
            },
            "pmessage" => match items {
                [_, pattern, channel, payload] => Ok(PushMessage::PMessage {
                    pattern: from_redis_value(pattern)?,
                    channel: from_redis_value(channel)?,
                    payload: from_redis_value(payload)?,
                }),
                _ => Err(push_error(v, "Expected three elements after pmessage")),
            },
            _ => Err(push_error(v, "Unknown push message kind")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn decodes_subscription_acks() {
        let v = Value::Array(vec![bulk("subscribe"), bulk("news"), Value::Int(1)]);
        assert_eq!(
            from_redis_value::<PushMessage>(&v).unwrap(),
            PushMessage::Subscribed {
                key: SubscriptionKey::Channel("news".to_string()),
                count: 1,
            }
        );

        let v = Value::Array(vec![bulk("psubscribe"), bulk("news.*"), Value::Int(2)]);
        assert_eq!(
            from_redis_value::<PushMessage>(&v).unwrap(),
            PushMessage::Subscribed {
                key: SubscriptionKey::Pattern("news.*".to_string()),
                count: 2,
            }
        );

        let v = Value::Array(vec![bulk("punsubscribe"), bulk("news.*"), Value::Int(1)]);
        assert_eq!(
            from_redis_value::<PushMessage>(&v).unwrap(),
            PushMessage::Unsubscribed {
                key: SubscriptionKey::Pattern("news.*".to_string()),
                count: 1,
            }
        );
    }

    #[test]
    fn decodes_messages() {
        let v = Value::Array(vec![bulk("message"), bulk("news"), bulk("hello")]);
        assert_eq!(
            from_redis_value::<PushMessage>(&v).unwrap(),
            PushMessage::Message {
                channel: "news".to_string(),
                payload: b"hello".to_vec(),
            }
        );

        let v = Value::Array(vec![
            bulk("pmessage"),
            bulk("news.*"),
            bulk("news.tech"),
            bulk("hello"),
        ]);
        assert_eq!(
            from_redis_value::<PushMessage>(&v).unwrap(),
            PushMessage::PMessage {
                pattern: "news.*".to_string(),
                channel: "news.tech".to_string(),
                payload: b"hello".to_vec(),
            }
        );
    }

    #[test]
    fn rejects_unknown_kinds_and_bad_shapes() {
        let v = Value::Array(vec![bulk("smessage"), bulk("news"), bulk("x")]);
        assert!(from_redis_value::<PushMessage>(&v).is_err());

        let v = Value::Array(vec![bulk("message"), bulk("news")]);
        assert!(from_redis_value::<PushMessage>(&v).is_err());

        assert!(from_redis_value::<PushMessage>(&Value::Int(1)).is_err());
    }
}
