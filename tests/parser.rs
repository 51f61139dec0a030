use bytes::BytesMut;
use quickcheck::{Arbitrary, Gen, QuickCheck, TestResult};
use tokio_util::codec::Decoder;

use respite::{parse_redis_value, Value, ValueCodec};

#[derive(Clone, Debug)]
struct ArbitraryValue(Value);

impl Arbitrary for ArbitraryValue {
    fn arbitrary(g: &mut Gen) -> Self {
        ArbitraryValue(arbitrary_value(g, 4))
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        match &self.0 {
            Value::NullBulkString | Value::NullArray => Box::new(None.into_iter()),
            Value::Int(i) => Box::new(i.shrink().map(Value::Int).map(ArbitraryValue)),
            Value::BulkString(xs) => {
                Box::new(xs.shrink().map(Value::BulkString).map(ArbitraryValue))
            }
            Value::SimpleString(s) => Box::new(
                shrink_line(s)
                    .into_iter()
                    .map(Value::SimpleString)
                    .map(ArbitraryValue),
            ),
            Value::Error(s) => Box::new(
                shrink_line(s)
                    .into_iter()
                    .map(Value::Error)
                    .map(ArbitraryValue),
            ),
            Value::Array(xs) => {
                let ys = xs
                    .iter()
                    .map(|x| ArbitraryValue(x.clone()))
                    .collect::<Vec<_>>();
                Box::new(
                    ys.shrink()
                        .map(|xs| xs.into_iter().map(|x| x.0).collect())
                        .map(Value::Array)
                        .map(ArbitraryValue),
                )
            }
        }
    }
}

fn shrink_line(s: &str) -> Vec<String> {
    if s.is_empty() {
        vec![]
    } else {
        vec![s[..s.len() / 2].to_string(), String::new()]
    }
}

// Inline lines must not contain CR or LF; everything printable goes.
fn ascii_line(g: &mut Gen) -> String {
    let len = usize::arbitrary(g) % 12;
    (0..len)
        .map(|_| (u8::arbitrary(g) % 95 + 32) as char)
        .collect()
}

fn arbitrary_value(g: &mut Gen, depth: usize) -> Value {
    let variants = if depth == 0 { 5 } else { 6 };
    match u8::arbitrary(g) % variants {
        0 => Value::SimpleString(ascii_line(g)),
        1 => Value::Error(ascii_line(g)),
        2 => Value::Int(i64::arbitrary(g)),
        3 => Value::BulkString(Vec::arbitrary(g)),
        4 => {
            if bool::arbitrary(g) {
                Value::NullBulkString
            } else {
                Value::NullArray
            }
        }
        _ => {
            let len = usize::arbitrary(g) % 4;
            Value::Array((0..len).map(|_| arbitrary_value(g, depth - 1)).collect())
        }
    }
}

#[test]
fn serialized_values_parse_back_unchanged() {
    fn prop(v: ArbitraryValue) -> bool {
        parse_redis_value(&v.0.to_resp_bytes()) == Ok(v.0)
    }
    QuickCheck::new()
        .tests(1000)
        .quickcheck(prop as fn(ArbitraryValue) -> bool);
}

#[test]
fn arbitrary_chunk_splits_yield_the_value_exactly_once() {
    fn prop(v: ArbitraryValue, chunk_size: u8) -> bool {
        let encoded = v.0.to_resp_bytes();
        let chunk_size = usize::from(chunk_size % 7) + 1;

        let mut codec = ValueCodec::default();
        let mut buffer = BytesMut::new();
        let mut produced = Vec::new();
        for chunk in encoded.chunks(chunk_size) {
            buffer.extend_from_slice(chunk);
            while let Ok(Some(value)) = codec.decode(&mut buffer) {
                produced.push(value);
            }
        }
        produced == vec![v.0]
    }
    QuickCheck::new()
        .tests(500)
        .quickcheck(prop as fn(ArbitraryValue, u8) -> bool);
}

#[test]
fn bit_flips_never_panic_the_parser() {
    fn prop(v: ArbitraryValue, pos: usize, bit: u8) -> TestResult {
        let mut bytes = v.0.to_resp_bytes();
        if bytes.is_empty() {
            return TestResult::discard();
        }
        let pos = pos % bytes.len();
        bytes[pos] ^= 1 << (bit % 8);
        // Either a clean parse of some value or a clean error; a panic
        // fails the test for us.
        let _ = parse_redis_value(&bytes);
        TestResult::passed()
    }
    QuickCheck::new()
        .tests(1000)
        .quickcheck(prop as fn(ArbitraryValue, usize, u8) -> TestResult);
}

#[test]
fn random_bytes_never_panic_the_parser() {
    fn prop(data: Vec<u8>) -> bool {
        let _ = parse_redis_value(&data);
        true
    }
    QuickCheck::new()
        .tests(1000)
        .quickcheck(prop as fn(Vec<u8>) -> bool);
}

#[test]
fn null_forms_survive_round_trips_distinctly() {
    let null_bulk = Value::NullBulkString;
    let empty_bulk = Value::BulkString(vec![]);
    assert_eq!(
        parse_redis_value(&null_bulk.to_resp_bytes()).unwrap(),
        null_bulk
    );
    assert_eq!(
        parse_redis_value(&empty_bulk.to_resp_bytes()).unwrap(),
        empty_bulk
    );
    assert_ne!(null_bulk.to_resp_bytes(), empty_bulk.to_resp_bytes());

    let null_array = Value::NullArray;
    let empty_array = Value::Array(vec![]);
    assert_eq!(
        parse_redis_value(&null_array.to_resp_bytes()).unwrap(),
        null_array
    );
    assert_eq!(
        parse_redis_value(&empty_array.to_resp_bytes()).unwrap(),
        empty_array
    );
    assert_ne!(null_array.to_resp_bytes(), empty_array.to_resp_bytes());
}
