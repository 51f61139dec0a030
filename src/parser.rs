use std::{
    io::{self, Read},
    str,
};

use crate::types::{ErrorKind, RedisError, RedisResult, Value};

use bytes::{Buf, BytesMut};
use combine::{
    any,
    error::StreamError,
    opaque,
    parser::{
        byte::{crlf, take_until_bytes},
        combinator::{any_send_sync_partial_state, AnySendSyncPartialState},
        range::{recognize, take},
    },
    stream::{PointerOffset, RangeStream, StreamErrorFor},
    ParseError, Parser as _,
};
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, Encoder};

const MAX_RECURSE_DEPTH: usize = 100;

// Bulk strings are capped at 512 MB by the server; anything larger in a
// length prefix is framing garbage, not a payload worth buffering for.
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

fn value<'a, I>(
    depth: Option<usize>,
) -> impl combine::Parser<I, Output = Value, PartialState = AnySendSyncPartialState>
where
    I: RangeStream<Token = u8, Range = &'a [u8]>,
    I::Error: combine::ParseError<u8, &'a [u8], I::Position>,
{
    let depth = depth.unwrap_or(1);

    opaque!(any_send_sync_partial_state(
        any()
            .then_partial(move |&mut b| {
                if b == b'*' && depth > MAX_RECURSE_DEPTH {
                    combine::unexpected_any("Maximum recursion depth exceeded").left()
                } else {
                    combine::value(b).right()
                }
            })
            .then_partial(move |&mut b| {
                let line = || {
                    recognize(take_until_bytes(&b"\r\n"[..]).with(take(2).map(|_| ()))).and_then(
                        |line: &[u8]| {
                            str::from_utf8(&line[..line.len() - 2])
                                .map_err(StreamErrorFor::<I>::other)
                        },
                    )
                };

                let simple_string = || line().map(|line| Value::SimpleString(line.into()));

                // Error lines come out as values; classification happens
                // at the command boundary, never in the reader.
                let error = || line().map(|line| Value::Error(line.into()));

                let int = || {
                    line().and_then(|line| {
                        line.trim().parse::<i64>().map_err(|_| {
                            StreamErrorFor::<I>::message_static_message(
                                "Expected integer, got garbage",
                            )
                        })
                    })
                };

                let length = || {
                    int().and_then(|len| {
                        if !(-1..=MAX_BULK_LEN).contains(&len) {
                            Err(StreamErrorFor::<I>::message_static_message(
                                "Length prefix out of range",
                            ))
                        } else {
                            Ok(len)
                        }
                    })
                };

                let bulk_string = || {
                    length().then_partial(move |&mut len| {
                        if len < 0 {
                            combine::produce(|| Value::NullBulkString).left()
                        } else {
                            take(len as usize)
                                .map(|bs: &[u8]| Value::BulkString(bs.to_vec()))
                                .skip(crlf())
                                .right()
                        }
                    })
                };

                let array = || {
                    length().then_partial(move |&mut len| {
                        if len < 0 {
                            combine::produce(|| Value::NullArray).left()
                        } else {
                            let len = len as usize;
                            combine::count_min_max(len, len, value(Some(depth + 1)))
                                .map(Value::Array)
                                .right()
                        }
                    })
                };

                combine::dispatch!(b;
                    b'+' => simple_string(),
                    b'-' => error(),
                    b':' => int().map(Value::Int),
                    b'$' => bulk_string(),
                    b'*' => array(),
                    b => combine::unexpected_any(combine::error::Token(b))
                )
            })
    ))
}

/// Streaming codec turning a byte stream into [`Value`]s.
///
/// The codec is resumable: on a short read it keeps its partial parse
/// state and produces nothing until the frame completes.
#[derive(Default)]
pub struct ValueCodec {
    state: AnySendSyncPartialState,
}

impl ValueCodec {
    fn decode_stream(&mut self, bytes: &mut BytesMut, eof: bool) -> RedisResult<Option<Value>> {
        let (opt, removed_len) = {
            let buffer = &bytes[..];
            let mut stream =
                combine::easy::Stream(combine::stream::MaybePartialStream(buffer, !eof));
            match combine::stream::decode_tokio(value(None), &mut stream, &mut self.state) {
                Ok(x) => x,
                Err(err) => {
                    let err = err
                        .map_position(|pos| pos.translate_position(buffer))
                        .map_range(|range| format!("{range:?}"))
                        .to_string();
                    return Err(RedisError::from((
                        ErrorKind::ParseError,
                        "parse error",
                        err,
                    )));
                }
            }
        };

        bytes.advance(removed_len);
        Ok(opt)
    }
}

impl Encoder<Vec<u8>> for ValueCodec {
    type Error = RedisError;
    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.as_ref());
        Ok(())
    }
}

impl Decoder for ValueCodec {
    type Item = Value;
    type Error = RedisError;

    fn decode(&mut self, bytes: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_stream(bytes, false)
    }

    fn decode_eof(&mut self, bytes: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_stream(bytes, true)
    }
}

/// Parses a single value from an async reader.
pub async fn parse_redis_value_async<R>(
    decoder: &mut combine::stream::Decoder<AnySendSyncPartialState, PointerOffset<[u8]>>,
    read: &mut R,
) -> RedisResult<Value>
where
    R: AsyncRead + std::marker::Unpin,
{
    let result = combine::decode_tokio!(*decoder, *read, value(None), |input, _| {
        combine::stream::easy::Stream::from(input)
    });
    match result {
        Err(err) => Err(match err {
            combine::stream::decoder::Error::Io { error, .. } => error.into(),
            combine::stream::decoder::Error::Parse(err) => {
                if err.is_unexpected_end_of_input() {
                    RedisError::from(io::Error::from(io::ErrorKind::UnexpectedEof))
                } else {
                    let err = err
                        .map_range(|range| format!("{range:?}"))
                        .map_position(|pos| pos.translate_position(decoder.buffer()))
                        .to_string();
                    RedisError::from((ErrorKind::ParseError, "parse error", err))
                }
            }
        }),
        Ok(result) => Ok(result),
    }
}

/// The incremental reply parser.
pub struct Parser {
    decoder: combine::stream::decoder::Decoder<AnySendSyncPartialState, PointerOffset<[u8]>>,
}

impl Default for Parser {
    fn default() -> Self {
        Parser::new()
    }
}

/// The parser can be used to parse byte streams into values. Generally
/// you do not use this directly as the connection machinery drives it for
/// you, but it is useful for offline parsing and for scripted test
/// servers.
impl Parser {
    /// Creates a new parser that parses the data behind the reader. More
    /// than one value can be behind the reader in which case the parser
    /// can be invoked multiple times. In other words: the stream does not
    /// have to be terminated.
    pub fn new() -> Parser {
        Parser {
            decoder: combine::stream::decoder::Decoder::new(),
        }
    }

    /// Parses synchronously into a single value from the reader.
    pub fn parse_value<T: Read>(&mut self, mut reader: T) -> RedisResult<Value> {
        let mut decoder = &mut self.decoder;
        let result = combine::decode!(decoder, reader, value(None), |input, _| {
            combine::stream::easy::Stream::from(input)
        });
        match result {
            Err(err) => Err(match err {
                combine::stream::decoder::Error::Io { error, .. } => error.into(),
                combine::stream::decoder::Error::Parse(err) => {
                    if err.is_unexpected_end_of_input() {
                        RedisError::from(io::Error::from(io::ErrorKind::UnexpectedEof))
                    } else {
                        let err = err
                            .map_range(|range| format!("{range:?}"))
                            .map_position(|pos| pos.translate_position(decoder.buffer()))
                            .to_string();
                        RedisError::from((ErrorKind::ParseError, "parse error", err))
                    }
                }
            }),
            Ok(result) => Ok(result),
        }
    }
}

/// Parses bytes into a value.
///
/// This is the most straightforward way to turn a raw reply buffer into a
/// [`Value`] without driving a parser by hand.
pub fn parse_redis_value(bytes: &[u8]) -> RedisResult<Value> {
    let mut parser = Parser::new();
    parser.parse_value(bytes)
}
