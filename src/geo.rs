//! Defines types to use with the geospatial commands.

use crate::types::{
    from_redis_value, ErrorKind, FromRedisValue, RedisError, RedisResult, RedisWrite, ToRedisArgs,
    Value,
};

/// Units used by the geospatial commands.
#[derive(Clone, Copy, Debug)]
pub enum Unit {
    /// Distances in meters.
    Meters,
    /// Distances in kilometers.
    Kilometers,
    /// Distances in miles.
    Miles,
    /// Distances in feet.
    Feet,
}

impl ToRedisArgs for Unit {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        let unit = match *self {
            Unit::Meters => "m",
            Unit::Kilometers => "km",
            Unit::Miles => "mi",
            Unit::Feet => "ft",
        };
        out.write_arg(unit.as_bytes());
    }
}

/// A longitude/latitude pair, written and read in that order as the
/// geospatial commands expect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord<T> {
    /// Longitude, the first element on the wire.
    pub longitude: T,
    /// Latitude, the second element on the wire.
    pub latitude: T,
}

impl<T> Coord<T> {
    /// Create a new `Coord` from `(longitude, latitude)`.
    pub fn lon_lat(longitude: T, latitude: T) -> Coord<T> {
        Coord {
            longitude,
            latitude,
        }
    }
}

impl<T: FromRedisValue> FromRedisValue for Coord<T> {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        let values: Vec<T> = FromRedisValue::from_redis_value(v)?;
        let mut values = values.into_iter();
        let (longitude, latitude) = match (values.next(), values.next(), values.next()) {
            (Some(longitude), Some(latitude), None) => (longitude, latitude),
            _ => {
                fail!((
                    ErrorKind::ParseError,
                    "Reply was of unexpected shape",
                    format!("Expected a pair of coordinates (reply was {v:?})"),
                ))
            }
        };
        Ok(Coord {
            longitude,
            latitude,
        })
    }
}

impl<T: ToRedisArgs> ToRedisArgs for Coord<T> {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        ToRedisArgs::write_redis_args(&self.longitude, out);
        ToRedisArgs::write_redis_args(&self.latitude, out);
    }
}

/// Sort order for radius search results.
#[derive(Default, Clone, Copy, Debug)]
pub enum RadiusOrder {
    /// Don't sort the results.
    #[default]
    Unsorted,
    /// Sort from the nearest to the farthest, relative to the center.
    Asc,
    /// Sort from the farthest to the nearest, relative to the center.
    Desc,
}

/// Options for the `GEORADIUS` and `GEORADIUSBYMEMBER` commands.
#[derive(Default)]
pub struct RadiusOptions {
    with_coord: bool,
    with_dist: bool,
    with_hash: bool,
    count: Option<usize>,
    order: RadiusOrder,
    store: Option<Vec<Vec<u8>>>,
    store_dist: Option<Vec<Vec<u8>>>,
}

impl RadiusOptions {
    /// Limit the results to the first N matching items.
    pub fn limit(mut self, n: usize) -> Self {
        self.count = Some(n);
        self
    }

    /// Return the distance of the returned items from the center, in the
    /// unit given as the radius argument of the command.
    pub fn with_dist(mut self) -> Self {
        self.with_dist = true;
        self
    }

    /// Return the longitude/latitude of the matching items.
    pub fn with_coord(mut self) -> Self {
        self.with_coord = true;
        self
    }

    /// Return the raw geohash-encoded sorted set score of the items.
    pub fn with_hash(mut self) -> Self {
        self.with_hash = true;
        self
    }

    /// Sort the returned items.
    pub fn order(mut self, o: RadiusOrder) -> Self {
        self.order = o;
        self
    }

    /// Store the results in a sorted set at `key` instead of returning
    /// them. This cannot be combined with any `with_*` option.
    pub fn store<K: ToRedisArgs>(mut self, key: K) -> Self {
        self.store = Some(ToRedisArgs::to_redis_args(&key));
        self
    }

    /// Store the results in a sorted set at `key`, with the distance from
    /// the center as score. This cannot be combined with any `with_*`
    /// option.
    pub fn store_dist<K: ToRedisArgs>(mut self, key: K) -> Self {
        self.store_dist = Some(ToRedisArgs::to_redis_args(&key));
        self
    }
}

impl ToRedisArgs for RadiusOptions {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        if self.with_coord {
            out.write_arg(b"WITHCOORD");
        }
        if self.with_dist {
            out.write_arg(b"WITHDIST");
        }
        if self.with_hash {
            out.write_arg(b"WITHHASH");
        }
        if let Some(n) = self.count {
            out.write_arg(b"COUNT");
            out.write_arg_fmt(n);
        }
        match self.order {
            RadiusOrder::Asc => out.write_arg(b"ASC"),
            RadiusOrder::Desc => out.write_arg(b"DESC"),
            RadiusOrder::Unsorted => (),
        };
        if let Some(ref store) = self.store {
            out.write_arg(b"STORE");
            for i in store {
                out.write_arg(i);
            }
        }
        if let Some(ref store_dist) = self.store_dist {
            out.write_arg(b"STOREDIST");
            for i in store_dist {
                out.write_arg(i);
            }
        }
    }
}

/// One entry of a radius search reply.
///
/// The shape of the reply depends on the `with_*` options of the search;
/// only the member name is always present.
#[derive(Debug, Clone)]
pub struct RadiusSearchResult {
    /// The member name.
    pub name: String,
    /// The coordinates, when `WITHCOORD` was given.
    pub coord: Option<Coord<f64>>,
    /// The distance from the center, when `WITHDIST` was given.
    pub dist: Option<f64>,
}

impl FromRedisValue for RadiusSearchResult {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        // With options the entry is an array starting with the name;
        // without options it is just the member name.
        if let Some(items) = v.as_sequence() {
            if !items.is_empty() {
                return RadiusSearchResult::parse_with_options(items);
            }
        }
        if let Ok(name) = from_redis_value(v) {
            return Ok(RadiusSearchResult {
                name,
                coord: None,
                dist: None,
            });
        }
        Err(RedisError::from((
            ErrorKind::ParseError,
            "Reply was of unexpected shape",
            format!("Response type not RadiusSearchResult compatible ({v:?})"),
        )))
    }
}

impl RadiusSearchResult {
    fn parse_with_options(items: &[Value]) -> RedisResult<RadiusSearchResult> {
        let name: String = from_redis_value(&items[0])?;
        let mut coord = None;
        let mut dist = None;
        for item in &items[1..] {
            // A nested array is the coordinate pair, a scalar the
            // distance. The geohash score from WITHHASH is an integer
            // and is ignored here.
            match item {
                Value::Array(_) => coord = Some(from_redis_value(item)?),
                Value::Int(_) => (),
                _ => dist = Some(from_redis_value(item)?),
            }
        }
        Ok(RadiusSearchResult { name, coord, dist })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn coord_writes_longitude_first() {
        let args = Coord::lon_lat(13.361389, 38.115556).to_redis_args();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0], b"13.361389".to_vec());
        assert_eq!(args[1], b"38.115556".to_vec());
    }

    #[test]
    fn coord_decodes_pair() {
        let v = Value::Array(vec![bulk("13.361389"), bulk("38.115556")]);
        let coord: Coord<f64> = from_redis_value(&v).unwrap();
        assert!((coord.longitude - 13.361389).abs() < 1e-9);
        assert!((coord.latitude - 38.115556).abs() < 1e-9);

        let too_many = Value::Array(vec![bulk("1"), bulk("2"), bulk("3")]);
        assert!(from_redis_value::<Coord<f64>>(&too_many).is_err());
    }

    #[test]
    fn radius_options_write_tokens() {
        let opts = RadiusOptions::default()
            .with_coord()
            .with_dist()
            .limit(10)
            .order(RadiusOrder::Asc);
        assert_eq!(
            opts.to_redis_args(),
            vec![
                b"WITHCOORD".to_vec(),
                b"WITHDIST".to_vec(),
                b"COUNT".to_vec(),
                b"10".to_vec(),
                b"ASC".to_vec(),
            ]
        );

        let opts = RadiusOptions::default().store_dist("dest");
        assert_eq!(
            opts.to_redis_args(),
            vec![b"STOREDIST".to_vec(), b"dest".to_vec()]
        );
    }

    #[test]
    fn radius_result_with_and_without_options() {
        let plain = bulk("Palermo");
        let r: RadiusSearchResult = from_redis_value(&plain).unwrap();
        assert_eq!(r.name, "Palermo");
        assert!(r.coord.is_none() && r.dist.is_none());

        let full = Value::Array(vec![
            bulk("Palermo"),
            bulk("190.4424"),
            Value::Array(vec![bulk("13.361389"), bulk("38.115556")]),
        ]);
        let r: RadiusSearchResult = from_redis_value(&full).unwrap();
        assert_eq!(r.name, "Palermo");
        assert!((r.dist.unwrap() - 190.4424).abs() < 1e-6);
        assert!(r.coord.is_some());
    }
}
