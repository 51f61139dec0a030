use std::collections::{BTreeMap, HashMap};
use std::error;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::io;
use std::str::{from_utf8, Utf8Error};
use std::string::FromUtf8Error;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

macro_rules! unexpected_reply {
    ($v:expr, $det:expr) => {{
        fail!(unexpected_reply_inner!($v, $det))
    }};
}

macro_rules! unexpected_reply_inner {
    ($v:expr, $det:expr) => {
        RedisError::from((
            ErrorKind::ParseError,
            "Reply was of unexpected shape",
            format!("{:?} (reply was {:?})", $det, $v),
        ))
    };
}

/// An enum of all error kinds.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The server signalled a generic `ERR` failure.
    ResponseError,
    /// Malformed framing or a reply whose shape does not match the
    /// expectation of the decoder.
    ParseError,
    /// A payload could not be converted into the requested type.
    TypeError,
    /// Operation was issued against a key holding the wrong kind of value.
    WrongType,
    /// A transaction was aborted.
    ExecAbortError,
    /// The server cannot respond because it is loading a dump.
    BusyLoadingError,
    /// A script that was requested does not actually exist.
    NoScriptError,
    /// A script is already running.
    Busy,
    /// Attempted to kill a script or function that was not executing.
    NotBusy,
    /// A consumer group with the requested name already exists.
    BusyGroup,
    /// The requested consumer group does not exist.
    NoGroup,
    /// Raised if a key moved to a different node permanently.
    Moved,
    /// Raised if a key is being migrated and the request must be re-asked.
    Ask,
    /// Raised if a request needs to be retried against the same node.
    TryAgain,
    /// Raised if the cluster is down.
    ClusterDown,
    /// A request spans multiple slots.
    CrossSlot,
    /// A cluster master is unavailable.
    MasterDown,
    /// Attempt to write to a read-only server.
    ReadOnly,
    /// The underlying socket failed.
    IoError,
    /// An error that was identified on the client before execution.
    ClientError,
    /// The parameters given to the client were wrong.
    InvalidClientConfig,
    /// A command could not be dispatched to a cluster node.
    ClusterRoutingError,
    /// An error created by the server that is not directly understood by
    /// the library.
    ExtensionError,
}

/// Low-level representation of a RESP2 wire value.
///
/// The two nil forms are kept distinct because the protocol distinguishes
/// them; both decode to `None` through [`FromRedisValue`] for `Option`.
/// Server errors stay inside the value until a typed reply is requested,
/// at which point they are classified into a [`RedisError`].
#[derive(PartialEq, Eq, Clone)]
pub enum Value {
    /// An inline status line such as `+OK`.
    SimpleString(String),
    /// A server-originated error line, unclassified.
    Error(String),
    /// An integer reply.
    Int(i64),
    /// A length-prefixed binary payload.
    BulkString(Vec<u8>),
    /// The `$-1` nil form.
    NullBulkString,
    /// The `*-1` nil form.
    NullArray,
    /// A possibly nested sequence of values.
    Array(Vec<Value>),
}

/// Iterator over the `(key, value)` pairs of a flat reply array.
pub struct MapIter<'a>(std::slice::Iter<'a, Value>);

impl<'a> Iterator for MapIter<'a> {
    type Item = (&'a Value, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        Some((self.0.next()?, self.0.next()?))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (low, high) = self.0.size_hint();
        (low / 2, high.map(|h| h / 2))
    }
}

impl Value {
    /// Checks whether the value looks like a cursor reply: a two element
    /// array whose first element is the cursor and whose second element is
    /// the item batch.
    pub fn looks_like_cursor(&self) -> bool {
        match self {
            Value::Array(items) => {
                items.len() == 2
                    && matches!(items[0], Value::BulkString(_))
                    && matches!(items[1], Value::Array(_))
            }
            _ => false,
        }
    }

    /// Returns an `&[Value]` if `self` is compatible with a sequence type.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(&items[..]),
            Value::NullArray => Some(&[]),
            _ => None,
        }
    }

    /// Returns an iterator of key/value pairs if `self` is a flat array of
    /// even length.
    pub fn as_map_iter(&self) -> Option<MapIter<'_>> {
        match self {
            Value::Array(items) if items.len() % 2 == 0 => Some(MapIter(items.iter())),
            _ => None,
        }
    }

    /// Appends the canonical RESP2 encoding of the value to `out`.
    ///
    /// Encoding is a pure function of the value; feeding the output back
    /// through the parser yields the value unchanged.
    pub fn write_resp_bytes(&self, out: &mut Vec<u8>) {
        let mut buf = itoa::Buffer::new();
        match self {
            Value::SimpleString(s) => {
                out.push(b'+');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Value::Error(s) => {
                out.push(b'-');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Value::Int(i) => {
                out.push(b':');
                out.extend_from_slice(buf.format(*i).as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Value::BulkString(data) => {
                out.push(b'$');
                out.extend_from_slice(buf.format(data.len()).as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
            }
            Value::NullBulkString => out.extend_from_slice(b"$-1\r\n"),
            Value::NullArray => out.extend_from_slice(b"*-1\r\n"),
            Value::Array(items) => {
                out.push(b'*');
                out.extend_from_slice(buf.format(items.len()).as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    item.write_resp_bytes(out);
                }
            }
        }
    }

    /// Returns the canonical RESP2 encoding of the value.
    pub fn to_resp_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_resp_bytes(&mut out);
        out
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::SimpleString(s) => write!(fmt, "simple({s:?})"),
            Value::Error(s) => write!(fmt, "error({s:?})"),
            Value::Int(val) => write!(fmt, "int({val:?})"),
            Value::BulkString(val) => match from_utf8(val) {
                Ok(x) => write!(fmt, "bulk({x:?})"),
                Err(_) => write!(fmt, "binary({val:?})"),
            },
            Value::NullBulkString => write!(fmt, "nil-bulk"),
            Value::NullArray => write!(fmt, "nil-array"),
            Value::Array(values) => {
                write!(fmt, "array(")?;
                let mut is_first = true;
                for val in values.iter() {
                    if !is_first {
                        write!(fmt, ", ")?;
                    }
                    write!(fmt, "{val:?}")?;
                    is_first = false;
                }
                write!(fmt, ")")
            }
        }
    }
}

/// Represents a failure when talking to the server. For the most part you
/// should be using the `Error` trait to interact with this rather than the
/// actual struct.
pub struct RedisError {
    repr: ErrorRepr,
}

#[derive(Debug)]
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    ExtensionError(String, String),
    IoError(io::Error),
}

impl PartialEq for RedisError {
    fn eq(&self, other: &RedisError) -> bool {
        match (&self.repr, &other.repr) {
            (&ErrorRepr::WithDescription(kind_a, _), &ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                &ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                &ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::ExtensionError(a, _), ErrorRepr::ExtensionError(b, _)) => *a == *b,
            _ => false,
        }
    }
}

impl From<io::Error> for RedisError {
    fn from(err: io::Error) -> RedisError {
        RedisError {
            repr: ErrorRepr::IoError(err),
        }
    }
}

impl From<Utf8Error> for RedisError {
    fn from(_: Utf8Error) -> RedisError {
        RedisError {
            repr: ErrorRepr::WithDescription(ErrorKind::TypeError, "Invalid UTF-8"),
        }
    }
}

impl From<FromUtf8Error> for RedisError {
    fn from(_: FromUtf8Error) -> RedisError {
        RedisError {
            repr: ErrorRepr::WithDescription(ErrorKind::TypeError, "Cannot convert from UTF-8"),
        }
    }
}

impl From<(ErrorKind, &'static str)> for RedisError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> RedisError {
        RedisError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for RedisError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> RedisError {
        RedisError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

impl From<tokio::time::error::Elapsed> for RedisError {
    fn from(_: tokio::time::error::Elapsed) -> RedisError {
        RedisError::from(io::Error::new(
            io::ErrorKind::TimedOut,
            "Response deadline elapsed",
        ))
    }
}

impl error::Error for RedisError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.repr {
            ErrorRepr::IoError(ref err) => Some(err as &dyn error::Error),
            _ => None,
        }
    }
}

impl fmt::Display for RedisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                desc.fmt(f)?;
                f.write_str(" - ")?;
                fmt::Debug::fmt(&kind, f)
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                desc.fmt(f)?;
                f.write_str(" - ")?;
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                detail.fmt(f)
            }
            ErrorRepr::ExtensionError(ref code, ref detail) => {
                code.fmt(f)?;
                f.write_str(": ")?;
                detail.fmt(f)
            }
            ErrorRepr::IoError(ref err) => err.fmt(f),
        }
    }
}

impl fmt::Debug for RedisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt::Display::fmt(self, f)
    }
}

impl RedisError {
    /// Returns the kind of the error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::ExtensionError(_, _) => ErrorKind::ExtensionError,
            ErrorRepr::IoError(_) => ErrorKind::IoError,
        }
    }

    /// Returns the error detail.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail)
            | ErrorRepr::ExtensionError(_, ref detail) => Some(detail.as_str()),
            _ => None,
        }
    }

    /// Returns the raw server error code if available.
    pub fn code(&self) -> Option<&str> {
        match self.kind() {
            ErrorKind::ResponseError => Some("ERR"),
            ErrorKind::WrongType => Some("WRONGTYPE"),
            ErrorKind::ExecAbortError => Some("EXECABORT"),
            ErrorKind::BusyLoadingError => Some("LOADING"),
            ErrorKind::NoScriptError => Some("NOSCRIPT"),
            ErrorKind::Busy => Some("BUSY"),
            ErrorKind::NotBusy => Some("NOTBUSY"),
            ErrorKind::BusyGroup => Some("BUSYGROUP"),
            ErrorKind::NoGroup => Some("NOGROUP"),
            ErrorKind::Moved => Some("MOVED"),
            ErrorKind::Ask => Some("ASK"),
            ErrorKind::TryAgain => Some("TRYAGAIN"),
            ErrorKind::ClusterDown => Some("CLUSTERDOWN"),
            ErrorKind::CrossSlot => Some("CROSSSLOT"),
            ErrorKind::MasterDown => Some("MASTERDOWN"),
            ErrorKind::ReadOnly => Some("READONLY"),
            _ => match self.repr {
                ErrorRepr::ExtensionError(ref code, _) => Some(code),
                _ => None,
            },
        }
    }

    /// Indicates that this failure is an I/O failure.
    pub fn is_io_error(&self) -> bool {
        self.kind() == ErrorKind::IoError
    }

    /// Indicates that this is a cluster redirect or a transient cluster
    /// failure.
    pub fn is_cluster_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Moved | ErrorKind::Ask | ErrorKind::TryAgain | ErrorKind::ClusterDown
        )
    }

    /// Returns true if the error was caused by an I/O timeout.
    pub fn is_timeout(&self) -> bool {
        match self.repr {
            ErrorRepr::IoError(ref err) => matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Returns true if the error was caused by a dropped connection.
    pub fn is_connection_dropped(&self) -> bool {
        match self.repr {
            ErrorRepr::IoError(ref err) => matches!(
                err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    /// Returns the node a redirect error refers to as `(addr, slot)`.
    pub fn redirect_node(&self) -> Option<(&str, u16)> {
        match self.kind() {
            ErrorKind::Ask | ErrorKind::Moved => (),
            _ => return None,
        }
        let mut iter = self.detail()?.split_ascii_whitespace();
        let slot: u16 = iter.next()?.parse().ok()?;
        let addr = iter.next()?;
        Some((addr, slot))
    }

    /// Clone the error, throwing away non-cloneable parts of an I/O error.
    ///
    /// The `context` parameter is prepended to the message in case an I/O
    /// error is found.
    pub(crate) fn clone_mostly(&self, context: &'static str) -> Self {
        let repr = match self.repr {
            ErrorRepr::WithDescription(kind, desc) => ErrorRepr::WithDescription(kind, desc),
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                ErrorRepr::WithDescriptionAndDetail(kind, desc, detail.clone())
            }
            ErrorRepr::ExtensionError(ref code, ref detail) => {
                ErrorRepr::ExtensionError(code.clone(), detail.clone())
            }
            ErrorRepr::IoError(ref e) => {
                ErrorRepr::IoError(io::Error::new(e.kind(), format!("{context}: {e}")))
            }
        };
        Self { repr }
    }
}

pub(crate) fn make_extension_error(code: &str, detail: Option<&str>) -> RedisError {
    RedisError {
        repr: ErrorRepr::ExtensionError(
            code.to_string(),
            match detail {
                Some(x) => x.to_string(),
                None => "Unknown extension error encountered".to_string(),
            },
        ),
    }
}

/// Classifies an error line received from the server by its leading token.
///
/// This runs at the command boundary, never inside the reply reader: the
/// reader hands `Value::Error` through untouched so that the cluster layer
/// can intercept redirects before classification.
pub(crate) fn classify_server_error(line: &str) -> RedisError {
    let mut pieces = line.splitn(2, ' ');
    let code = pieces.next().unwrap_or_default();
    let detail = pieces.next();
    let kind = match code {
        "ERR" => ErrorKind::ResponseError,
        "WRONGTYPE" => ErrorKind::WrongType,
        "EXECABORT" => ErrorKind::ExecAbortError,
        "LOADING" => ErrorKind::BusyLoadingError,
        "NOSCRIPT" => ErrorKind::NoScriptError,
        "BUSY" => ErrorKind::Busy,
        "NOTBUSY" => ErrorKind::NotBusy,
        "BUSYGROUP" => ErrorKind::BusyGroup,
        "NOGROUP" => ErrorKind::NoGroup,
        "MOVED" => ErrorKind::Moved,
        "ASK" => ErrorKind::Ask,
        "TRYAGAIN" => ErrorKind::TryAgain,
        "CLUSTERDOWN" => ErrorKind::ClusterDown,
        "CROSSSLOT" => ErrorKind::CrossSlot,
        "MASTERDOWN" => ErrorKind::MasterDown,
        "READONLY" => ErrorKind::ReadOnly,
        code => return make_extension_error(code, detail),
    };
    let desc = "An error was signalled by the server";
    match detail {
        Some(detail) => RedisError::from((kind, desc, detail.to_string())),
        None => RedisError::from((kind, desc)),
    }
}

/// Library generic result type.
pub type RedisResult<T> = Result<T, RedisError>;

/// Library generic future type.
pub type RedisFuture<'a, T> = futures_util::future::BoxFuture<'a, RedisResult<T>>;

/// An info dictionary type.
///
/// This type provides convenient access to the key/value data returned by
/// the `INFO` command. Each line is a `key:value` pair; lines starting
/// with a hash are ignored.
#[derive(Debug, Clone)]
pub struct InfoDict {
    map: HashMap<String, Value>,
}

impl InfoDict {
    /// Creates a new info dictionary from the raw `INFO` payload.
    pub fn new(kvpairs: &str) -> InfoDict {
        let mut map = HashMap::new();
        for line in kvpairs.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut p = line.splitn(2, ':');
            let (k, v) = match (p.next(), p.next()) {
                (Some(k), Some(v)) => (k.to_string(), v.to_string()),
                _ => continue,
            };
            map.insert(k, Value::SimpleString(v));
        }
        InfoDict { map }
    }

    /// Fetches a value by key and converts it into the given type.
    pub fn get<T: FromRedisValue>(&self, key: &str) -> Option<T> {
        self.map.get(key).and_then(|x| from_redis_value(x).ok())
    }

    /// Checks if a key is contained in the info dict.
    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Returns the size of the info dict.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Checks if the dict is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Abstraction over sinks that accept encoded command arguments.
pub trait RedisWrite {
    /// Accepts a single argument as raw bytes.
    fn write_arg(&mut self, arg: &[u8]);

    /// Accepts a single argument rendered through its `Display` impl.
    fn write_arg_fmt(&mut self, arg: impl fmt::Display) {
        self.write_arg(arg.to_string().as_bytes())
    }
}

impl RedisWrite for Vec<Vec<u8>> {
    fn write_arg(&mut self, arg: &[u8]) {
        self.push(arg.to_owned());
    }

    fn write_arg_fmt(&mut self, arg: impl fmt::Display) {
        self.push(arg.to_string().into_bytes())
    }
}

/// Used to convert a value into zero or more command argument strings.
/// Most values produce exactly one argument but option builders and
/// sequences may produce none or several.
pub trait ToRedisArgs: Sized {
    /// Converts the value into a vector of byte arguments.
    fn to_redis_args(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        self.write_redis_args(&mut out);
        out
    }

    /// Writes the value into the given argument sink.
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite;

    /// This only exists internally as a workaround for the lack of
    /// specialization.
    #[doc(hidden)]
    fn write_args_from_slice<W>(items: &[Self], out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        for item in items {
            item.write_redis_args(out);
        }
    }
}

macro_rules! itoa_based_to_redis_impl {
    ($t:ty) => {
        impl ToRedisArgs for $t {
            fn write_redis_args<W>(&self, out: &mut W)
            where
                W: ?Sized + RedisWrite,
            {
                let mut buf = ::itoa::Buffer::new();
                out.write_arg(buf.format(*self).as_bytes())
            }
        }
    };
}

macro_rules! ryu_based_to_redis_impl {
    ($t:ty) => {
        impl ToRedisArgs for $t {
            fn write_redis_args<W>(&self, out: &mut W)
            where
                W: ?Sized + RedisWrite,
            {
                let mut buf = ::ryu::Buffer::new();
                out.write_arg(buf.format(*self).as_bytes())
            }
        }
    };
}

impl ToRedisArgs for u8 {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        let mut buf = ::itoa::Buffer::new();
        out.write_arg(buf.format(*self).as_bytes())
    }

    fn write_args_from_slice<W>(items: &[u8], out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(items);
    }
}

itoa_based_to_redis_impl!(i8);
itoa_based_to_redis_impl!(i16);
itoa_based_to_redis_impl!(u16);
itoa_based_to_redis_impl!(i32);
itoa_based_to_redis_impl!(u32);
itoa_based_to_redis_impl!(i64);
itoa_based_to_redis_impl!(u64);
itoa_based_to_redis_impl!(isize);
itoa_based_to_redis_impl!(usize);

ryu_based_to_redis_impl!(f32);
ryu_based_to_redis_impl!(f64);

impl ToRedisArgs for bool {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(if *self { b"1" } else { b"0" })
    }
}

impl ToRedisArgs for String {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(self.as_bytes())
    }
}

impl ToRedisArgs for &str {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(self.as_bytes())
    }
}

impl<T: ToRedisArgs> ToRedisArgs for Vec<T> {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        ToRedisArgs::write_args_from_slice(self, out)
    }
}

impl<T: ToRedisArgs> ToRedisArgs for &[T] {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        ToRedisArgs::write_args_from_slice(self, out)
    }
}

impl<T: ToRedisArgs, const N: usize> ToRedisArgs for [T; N] {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        ToRedisArgs::write_args_from_slice(self, out)
    }
}

impl<T: ToRedisArgs> ToRedisArgs for Option<T> {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        if let Some(ref x) = *self {
            x.write_redis_args(out);
        }
    }
}

impl<T: ToRedisArgs> ToRedisArgs for &T {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        (*self).write_redis_args(out)
    }
}

macro_rules! to_redis_args_for_tuple {
    () => ();
    ($($name:ident,)+) => (
        #[doc(hidden)]
        impl<$($name: ToRedisArgs),*> ToRedisArgs for ($($name,)*) {
            #[allow(non_snake_case)]
            fn write_redis_args<W>(&self, out: &mut W)
            where
                W: ?Sized + RedisWrite,
            {
                let ($(ref $name,)*) = *self;
                $($name.write_redis_args(out);)*
            }
        }
        to_redis_args_for_tuple_peel!($($name,)*);
    )
}

macro_rules! to_redis_args_for_tuple_peel {
    ($name:ident, $($other:ident,)*) => (to_redis_args_for_tuple!($($other,)*);)
}

to_redis_args_for_tuple! { T1, T2, T3, T4, T5, T6, }

/// Writes a point in time as a unix timestamp in whole seconds.
#[derive(Debug, Clone, Copy)]
pub struct UnixSeconds(pub SystemTime);

/// Writes a point in time as a unix timestamp in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct UnixMillis(pub SystemTime);

/// Writes a duration as whole seconds.
#[derive(Debug, Clone, Copy)]
pub struct DurationSeconds(pub Duration);

/// Writes a duration as milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct DurationMillis(pub Duration);

impl ToRedisArgs for UnixSeconds {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        let secs = self
            .0
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        secs.write_redis_args(out)
    }
}

impl ToRedisArgs for UnixMillis {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        let millis = self
            .0
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis();
        (millis as u64).write_redis_args(out)
    }
}

impl ToRedisArgs for DurationSeconds {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        self.0.as_secs().write_redis_args(out)
    }
}

impl ToRedisArgs for DurationMillis {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        (self.0.as_millis() as u64).write_redis_args(out)
    }
}

/// Helper enum that is used to define expiry time.
#[derive(Clone, Copy, Debug)]
pub enum Expiry {
    /// Expire in the given number of seconds.
    EX(u64),
    /// Expire in the given number of milliseconds.
    PX(u64),
    /// Expire at the given unix time, in seconds.
    EXAT(u64),
    /// Expire at the given unix time, in milliseconds.
    PXAT(u64),
    /// Remove the time to live associated with the key.
    PERSIST,
}

impl ToRedisArgs for Expiry {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        match self {
            Expiry::EX(secs) => ("EX", secs).write_redis_args(out),
            Expiry::PX(millis) => ("PX", millis).write_redis_args(out),
            Expiry::EXAT(ts) => ("EXAT", ts).write_redis_args(out),
            Expiry::PXAT(ts) => ("PXAT", ts).write_redis_args(out),
            Expiry::PERSIST => out.write_arg(b"PERSIST"),
        }
    }
}

/// Helper enum that is used to define expiry time for the `SET` command.
#[derive(Clone, Copy, Debug)]
pub enum SetExpiry {
    /// Expire in the given number of seconds.
    EX(u64),
    /// Expire in the given number of milliseconds.
    PX(u64),
    /// Expire at the given unix time, in seconds.
    EXAT(u64),
    /// Expire at the given unix time, in milliseconds.
    PXAT(u64),
    /// Retain the time to live already associated with the key.
    KEEPTTL,
}

/// Helper enum that is used to define existence checks.
#[derive(Clone, Copy, Debug)]
pub enum ExistenceCheck {
    /// Only set the key if it does not already exist.
    NX,
    /// Only set the key if it already exists.
    XX,
}

impl ToRedisArgs for ExistenceCheck {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        match self {
            ExistenceCheck::NX => out.write_arg(b"NX"),
            ExistenceCheck::XX => out.write_arg(b"XX"),
        }
    }
}

/// Options for the `SET` command.
///
/// ```rust
/// use respite::{cmd, SetOptions, SetExpiry, ExistenceCheck};
///
/// let opts = SetOptions::default()
///     .conditional_set(ExistenceCheck::NX)
///     .get(true)
///     .with_expiration(SetExpiry::EX(60));
/// let command = cmd("SET").arg("key").arg("value").arg(opts).get_packed_command();
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct SetOptions {
    conditional_set: Option<ExistenceCheck>,
    get: bool,
    expiration: Option<SetExpiry>,
}

impl SetOptions {
    /// Set the existence check for the SET command.
    pub fn conditional_set(mut self, expiration: ExistenceCheck) -> Self {
        self.conditional_set = Some(expiration);
        self
    }

    /// Return the old value stored at key, or nil when key did not exist.
    pub fn get(mut self, get: bool) -> Self {
        self.get = get;
        self
    }

    /// Set the expiration for the SET command.
    pub fn with_expiration(mut self, expiration: SetExpiry) -> Self {
        self.expiration = Some(expiration);
        self
    }
}

impl ToRedisArgs for SetOptions {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        if let Some(ref conditional_set) = self.conditional_set {
            conditional_set.write_redis_args(out);
        }
        if self.get {
            out.write_arg(b"GET");
        }
        if let Some(ref expiration) = self.expiration {
            match expiration {
                SetExpiry::EX(secs) => ("EX", secs).write_redis_args(out),
                SetExpiry::PX(millis) => ("PX", millis).write_redis_args(out),
                SetExpiry::EXAT(ts) => ("EXAT", ts).write_redis_args(out),
                SetExpiry::PXAT(ts) => ("PXAT", ts).write_redis_args(out),
                SetExpiry::KEEPTTL => out.write_arg(b"KEEPTTL"),
            }
        }
    }
}

/// Sort order token, `ASC` or `DESC`.
#[derive(Clone, Copy, Debug)]
pub enum SortOrder {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

impl ToRedisArgs for SortOrder {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        match self {
            SortOrder::Asc => out.write_arg(b"ASC"),
            SortOrder::Desc => out.write_arg(b"DESC"),
        }
    }
}

/// The `LIMIT offset count` token pair.
#[derive(Clone, Copy, Debug)]
pub struct Limit {
    /// Number of elements to skip.
    pub offset: i64,
    /// Number of elements to return.
    pub count: i64,
}

impl ToRedisArgs for Limit {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        ("LIMIT", self.offset, self.count).write_redis_args(out)
    }
}

/// Aggregation function for set combination commands.
#[derive(Clone, Copy, Debug)]
pub enum Aggregate {
    /// Sum the scores of an element across inputs.
    Sum,
    /// Take the minimum score of an element across inputs.
    Min,
    /// Take the maximum score of an element across inputs.
    Max,
}

impl ToRedisArgs for Aggregate {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(b"AGGREGATE");
        out.write_arg(match self {
            Aggregate::Sum => b"SUM",
            Aggregate::Min => b"MIN",
            Aggregate::Max => b"MAX",
        });
    }
}

/// The `WEIGHTS` token followed by one weight per input key.
#[derive(Clone, Debug)]
pub struct Weights(pub Vec<f64>);

impl ToRedisArgs for Weights {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(b"WEIGHTS");
        for weight in &self.0 {
            weight.write_redis_args(out);
        }
    }
}

/// Boundary of a sorted set score range.
#[derive(Clone, Copy, Debug)]
pub enum ScoreBound {
    /// Negative infinity, `-inf`.
    NegInf,
    /// Positive infinity, `+inf`.
    PosInf,
    /// An inclusive score.
    Inclusive(f64),
    /// An exclusive score, rendered with a `(` prefix.
    Exclusive(f64),
}

impl ToRedisArgs for ScoreBound {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        let mut buf = ::ryu::Buffer::new();
        match self {
            ScoreBound::NegInf => out.write_arg(b"-inf"),
            ScoreBound::PosInf => out.write_arg(b"+inf"),
            ScoreBound::Inclusive(score) => out.write_arg(buf.format(*score).as_bytes()),
            ScoreBound::Exclusive(score) => {
                out.write_arg_fmt(format_args!("({}", buf.format(*score)))
            }
        }
    }
}

/// Boundary of a lexicographical range.
#[derive(Clone, Debug)]
pub enum LexBound {
    /// The lowest possible member, `-`.
    Min,
    /// The highest possible member, `+`.
    Max,
    /// An inclusive member, rendered with a `[` prefix.
    Inclusive(String),
    /// An exclusive member, rendered with a `(` prefix.
    Exclusive(String),
}

impl ToRedisArgs for LexBound {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        match self {
            LexBound::Min => out.write_arg(b"-"),
            LexBound::Max => out.write_arg(b"+"),
            LexBound::Inclusive(member) => out.write_arg_fmt(format_args!("[{member}")),
            LexBound::Exclusive(member) => out.write_arg_fmt(format_args!("({member}")),
        }
    }
}

/// Options for `SCAN`-family commands, the `MATCH` and `COUNT` tokens.
#[derive(Clone, Debug, Default)]
pub struct ScanOptions {
    pattern: Option<String>,
    count: Option<usize>,
}

impl ScanOptions {
    /// Limit the results to the first N matching items.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Pattern for the scan.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

impl ToRedisArgs for ScanOptions {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        if let Some(ref pattern) = self.pattern {
            ("MATCH", pattern).write_redis_args(out);
        }
        if let Some(count) = self.count {
            ("COUNT", count).write_redis_args(out);
        }
    }
}

/// Options for the `SORT` command.
#[derive(Clone, Debug, Default)]
pub struct SortOptions {
    by: Option<String>,
    limit: Option<Limit>,
    get: Vec<String>,
    order: Option<SortOrder>,
    alpha: bool,
    store: Option<String>,
}

impl SortOptions {
    /// Sort by the values of the given pattern instead of the elements.
    pub fn by(mut self, pattern: impl Into<String>) -> Self {
        self.by = Some(pattern.into());
        self
    }

    /// Limit the returned range.
    pub fn limit(mut self, offset: i64, count: i64) -> Self {
        self.limit = Some(Limit { offset, count });
        self
    }

    /// Retrieve external keys via the given pattern; may be repeated.
    pub fn get(mut self, pattern: impl Into<String>) -> Self {
        self.get.push(pattern.into());
        self
    }

    /// Set the sort order.
    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }

    /// Sort lexicographically instead of numerically.
    pub fn alpha(mut self) -> Self {
        self.alpha = true;
        self
    }

    /// Store the result at the given key instead of returning it.
    pub fn store(mut self, destination: impl Into<String>) -> Self {
        self.store = Some(destination.into());
        self
    }
}

impl ToRedisArgs for SortOptions {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        if let Some(ref by) = self.by {
            ("BY", by).write_redis_args(out);
        }
        if let Some(ref limit) = self.limit {
            limit.write_redis_args(out);
        }
        for pattern in &self.get {
            ("GET", pattern).write_redis_args(out);
        }
        if let Some(order) = self.order {
            order.write_redis_args(out);
        }
        if self.alpha {
            out.write_arg(b"ALPHA");
        }
        if let Some(ref store) = self.store {
            ("STORE", store).write_redis_args(out);
        }
    }
}

/// Options for the `RESTORE` command.
#[derive(Clone, Copy, Debug, Default)]
pub struct RestoreOptions {
    replace: bool,
    absttl: bool,
    idletime: Option<i64>,
    frequency: Option<i64>,
}

impl RestoreOptions {
    /// Overwrite the key if it already exists.
    pub fn replace(mut self) -> Self {
        self.replace = true;
        self
    }

    /// Interpret the TTL as an absolute unix timestamp in milliseconds.
    pub fn absttl(mut self) -> Self {
        self.absttl = true;
        self
    }

    /// Set the idle time of the restored key, for LRU eviction.
    pub fn idletime(mut self, seconds: i64) -> Self {
        self.idletime = Some(seconds);
        self
    }

    /// Set the access frequency of the restored key, for LFU eviction.
    pub fn frequency(mut self, frequency: i64) -> Self {
        self.frequency = Some(frequency);
        self
    }
}

impl ToRedisArgs for RestoreOptions {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        if self.replace {
            out.write_arg(b"REPLACE");
        }
        if self.absttl {
            out.write_arg(b"ABSTTL");
        }
        if let Some(idletime) = self.idletime {
            ("IDLETIME", idletime).write_redis_args(out);
        }
        if let Some(frequency) = self.frequency {
            ("FREQ", frequency).write_redis_args(out);
        }
    }
}

/// Options for the `MIGRATE` command.
#[derive(Clone, Copy, Debug, Default)]
pub struct MigrateOptions {
    copy: bool,
    replace: bool,
}

impl MigrateOptions {
    /// Keep the key on the source instance instead of deleting it.
    pub fn copy(mut self) -> Self {
        self.copy = true;
        self
    }

    /// Replace an existing key on the destination instance.
    pub fn replace(mut self) -> Self {
        self.replace = true;
        self
    }
}

impl ToRedisArgs for MigrateOptions {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        if self.copy {
            out.write_arg(b"COPY");
        }
        if self.replace {
            out.write_arg(b"REPLACE");
        }
    }
}

/// Used to convert a reply value into a more appropriate type.
///
/// While a command reply can be seen in a raw [`Value`] form almost all
/// commands in practice want the value converted: strings, numbers,
/// optionals and collections as well as the typed reply records of the
/// stream and geo commands all come from this trait.
pub trait FromRedisValue: Sized {
    /// Given a reply value this attempts to convert it into the requested
    /// type. A shape mismatch produces a `ParseError`-kinded error, a
    /// payload conversion failure a `TypeError`-kinded one.
    fn from_redis_value(v: &Value) -> RedisResult<Self>;

    /// Owned variant, used where the reply buffer can be consumed.
    fn from_owned_redis_value(v: Value) -> RedisResult<Self> {
        Self::from_redis_value(&v)
    }

    /// Converts all values of a reply sequence. Tuples override this to
    /// also accept a flat sequence chunked by tuple arity.
    fn from_redis_values(items: &[Value]) -> RedisResult<Vec<Self>> {
        items.iter().map(Self::from_redis_value).collect()
    }

    /// This only exists internally as a workaround for the lack of
    /// specialization.
    #[doc(hidden)]
    fn from_byte_vec(_vec: &[u8]) -> Option<Vec<Self>> {
        None
    }
}

/// Shortcut function to invoke [`FromRedisValue::from_redis_value`].
pub fn from_redis_value<T: FromRedisValue>(v: &Value) -> RedisResult<T> {
    FromRedisValue::from_redis_value(v)
}

/// Shortcut function to invoke [`FromRedisValue::from_owned_redis_value`].
pub fn from_owned_redis_value<T: FromRedisValue>(v: Value) -> RedisResult<T> {
    FromRedisValue::from_owned_redis_value(v)
}

impl FromRedisValue for Value {
    fn from_redis_value(v: &Value) -> RedisResult<Value> {
        Ok(v.clone())
    }

    fn from_owned_redis_value(v: Value) -> RedisResult<Value> {
        Ok(v)
    }
}

impl FromRedisValue for () {
    fn from_redis_value(_v: &Value) -> RedisResult<()> {
        Ok(())
    }
}

macro_rules! int_from_redis_value_impl {
    ($t:ty) => {
        impl FromRedisValue for $t {
            fn from_redis_value(v: &Value) -> RedisResult<$t> {
                match v {
                    Value::Int(val) => match (*val).try_into() {
                        Ok(val) => Ok(val),
                        Err(_) => unexpected_reply!(v, "Integer reply out of range"),
                    },
                    Value::BulkString(bytes) => match from_utf8(bytes)?.parse() {
                        Ok(val) => Ok(val),
                        Err(_) => fail!((
                            ErrorKind::TypeError,
                            "Could not convert payload to integer",
                            format!("(reply was {v:?})"),
                        )),
                    },
                    Value::SimpleString(s) => match s.parse() {
                        Ok(val) => Ok(val),
                        Err(_) => fail!((
                            ErrorKind::TypeError,
                            "Could not convert payload to integer",
                            format!("(reply was {v:?})"),
                        )),
                    },
                    _ => unexpected_reply!(v, "Expected an integer reply"),
                }
            }
        }
    };
}

int_from_redis_value_impl!(i8);
int_from_redis_value_impl!(i16);
int_from_redis_value_impl!(u16);
int_from_redis_value_impl!(i32);
int_from_redis_value_impl!(u32);
int_from_redis_value_impl!(i64);
int_from_redis_value_impl!(u64);
int_from_redis_value_impl!(isize);
int_from_redis_value_impl!(usize);

impl FromRedisValue for u8 {
    fn from_redis_value(v: &Value) -> RedisResult<u8> {
        match v {
            Value::Int(val) => match (*val).try_into() {
                Ok(val) => Ok(val),
                Err(_) => unexpected_reply!(v, "Integer reply out of range"),
            },
            _ => unexpected_reply!(v, "Expected an integer reply"),
        }
    }

    fn from_byte_vec(vec: &[u8]) -> Option<Vec<u8>> {
        Some(vec.to_vec())
    }
}

macro_rules! float_from_redis_value_impl {
    ($t:ty) => {
        impl FromRedisValue for $t {
            fn from_redis_value(v: &Value) -> RedisResult<$t> {
                // `inf` and `-inf` parse through the standard float parser.
                let parse = |s: &str| -> RedisResult<$t> {
                    s.trim().parse().map_err(|_| {
                        RedisError::from((
                            ErrorKind::TypeError,
                            "Could not convert payload to float",
                            format!("(reply was {v:?})"),
                        ))
                    })
                };
                match v {
                    Value::Int(val) => Ok(*val as $t),
                    Value::BulkString(bytes) => parse(from_utf8(bytes)?),
                    Value::SimpleString(s) => parse(s),
                    _ => unexpected_reply!(v, "Expected a float reply"),
                }
            }
        }
    };
}

float_from_redis_value_impl!(f32);
float_from_redis_value_impl!(f64);

impl FromRedisValue for bool {
    fn from_redis_value(v: &Value) -> RedisResult<bool> {
        match v {
            Value::NullBulkString | Value::NullArray => Ok(false),
            Value::Int(0) => Ok(false),
            Value::Int(_) => Ok(true),
            Value::BulkString(bytes) => match &bytes[..] {
                b"0" => Ok(false),
                b"1" => Ok(true),
                _ => unexpected_reply!(v, "Expected a boolean reply"),
            },
            Value::SimpleString(s) if s == "OK" => Ok(true),
            _ => unexpected_reply!(v, "Expected a boolean reply"),
        }
    }
}

impl FromRedisValue for String {
    fn from_redis_value(v: &Value) -> RedisResult<String> {
        match v {
            Value::BulkString(bytes) => Ok(from_utf8(bytes)?.to_string()),
            Value::SimpleString(s) => Ok(s.clone()),
            Value::Int(val) => Ok(val.to_string()),
            _ => unexpected_reply!(v, "Expected a string reply"),
        }
    }

    fn from_owned_redis_value(v: Value) -> RedisResult<String> {
        match v {
            Value::BulkString(bytes) => Ok(String::from_utf8(bytes)?),
            Value::SimpleString(s) => Ok(s),
            Value::Int(val) => Ok(val.to_string()),
            v => unexpected_reply!(v, "Expected a string reply"),
        }
    }
}

impl<T: FromRedisValue> FromRedisValue for Option<T> {
    fn from_redis_value(v: &Value) -> RedisResult<Option<T>> {
        match v {
            Value::NullBulkString | Value::NullArray => Ok(None),
            v => Ok(Some(from_redis_value(v)?)),
        }
    }

    fn from_owned_redis_value(v: Value) -> RedisResult<Option<T>> {
        match v {
            Value::NullBulkString | Value::NullArray => Ok(None),
            v => Ok(Some(from_owned_redis_value(v)?)),
        }
    }
}

impl<T: FromRedisValue> FromRedisValue for Vec<T> {
    fn from_redis_value(v: &Value) -> RedisResult<Vec<T>> {
        match v {
            Value::BulkString(bytes) => match T::from_byte_vec(bytes) {
                Some(items) => Ok(items),
                None => unexpected_reply!(v, "Expected an array reply"),
            },
            Value::Array(items) => T::from_redis_values(items),
            Value::NullArray | Value::NullBulkString => Ok(vec![]),
            _ => unexpected_reply!(v, "Expected an array reply"),
        }
    }
}

impl<K, V, S> FromRedisValue for HashMap<K, V, S>
where
    K: FromRedisValue + Eq + Hash,
    V: FromRedisValue,
    S: BuildHasher + Default,
{
    fn from_redis_value(v: &Value) -> RedisResult<HashMap<K, V, S>> {
        match v.as_map_iter() {
            Some(iter) => iter
                .map(|(k, v)| Ok((from_redis_value(k)?, from_redis_value(v)?)))
                .collect(),
            None => unexpected_reply!(v, "Expected a flat key/value array of even length"),
        }
    }
}

impl<K, V> FromRedisValue for BTreeMap<K, V>
where
    K: FromRedisValue + Ord,
    V: FromRedisValue,
{
    fn from_redis_value(v: &Value) -> RedisResult<BTreeMap<K, V>> {
        match v.as_map_iter() {
            Some(iter) => iter
                .map(|(k, v)| Ok((from_redis_value(k)?, from_redis_value(v)?)))
                .collect(),
            None => unexpected_reply!(v, "Expected a flat key/value array of even length"),
        }
    }
}

macro_rules! from_redis_value_for_tuple {
    () => ();
    ($($name:ident,)+) => (
        #[doc(hidden)]
        impl<$($name: FromRedisValue),*> FromRedisValue for ($($name,)*) {
            // we have local variables named T1 as dummies and those
            // variables are unused.
            #[allow(non_snake_case, unused_variables)]
            fn from_redis_value(v: &Value) -> RedisResult<($($name,)*)> {
                let n = from_redis_value_for_tuple!(@count $($name,)*);
                match v {
                    Value::Array(items) if items.len() == n => {
                        let mut it = items.iter();
                        Ok(($({let $name: $name = from_redis_value(
                            it.next().expect("length checked above"))?; $name},)*))
                    }
                    _ => unexpected_reply!(v, "Expected an array reply of matching length"),
                }
            }

            #[allow(non_snake_case, unused_variables)]
            fn from_redis_values(items: &[Value]) -> RedisResult<Vec<($($name,)*)>> {
                let n = from_redis_value_for_tuple!(@count $($name,)*);
                // Replies either nest each tuple in its own array or lay
                // the fields out flat, chunked by arity.
                let direct: RedisResult<Vec<Self>> =
                    items.iter().map(Self::from_redis_value).collect();
                match direct {
                    Ok(values) => Ok(values),
                    Err(err) => {
                        if items.len() % n != 0 {
                            return Err(err);
                        }
                        items
                            .chunks(n)
                            .map(|chunk| {
                                let mut it = chunk.iter();
                                Ok(($({let $name: $name = from_redis_value(
                                    it.next().expect("chunk length is arity"))?; $name},)*))
                            })
                            .collect()
                    }
                }
            }
        }
        from_redis_value_for_tuple_peel!($($name,)*);
    );
    (@count $($name:ident,)*) => (
        [$(from_redis_value_for_tuple!(@unit $name)),*].len()
    );
    (@unit $name:ident) => (());
}

macro_rules! from_redis_value_for_tuple_peel {
    ($name:ident, $($other:ident,)*) => (from_redis_value_for_tuple!($($other,)*);)
}

from_redis_value_for_tuple! { T1, T2, T3, T4, T5, T6, }

impl FromRedisValue for InfoDict {
    fn from_redis_value(v: &Value) -> RedisResult<InfoDict> {
        let s: String = from_redis_value(v)?;
        Ok(InfoDict::new(&s))
    }
}

/// The kind of value a key holds, as reported by the `TYPE` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyType {
    /// The key does not exist.
    None,
    /// A plain string value.
    String,
    /// A list value.
    List,
    /// A set value.
    Set,
    /// A sorted set value.
    ZSet,
    /// A hash value.
    Hash,
    /// A stream value.
    Stream,
}

impl FromRedisValue for KeyType {
    fn from_redis_value(v: &Value) -> RedisResult<KeyType> {
        let s = match v {
            Value::SimpleString(s) => s.as_str(),
            _ => unexpected_reply!(v, "Expected a status reply"),
        };
        match s {
            "none" => Ok(KeyType::None),
            "string" => Ok(KeyType::String),
            "list" => Ok(KeyType::List),
            "set" => Ok(KeyType::Set),
            "zset" => Ok(KeyType::ZSet),
            "hash" => Ok(KeyType::Hash),
            "stream" => Ok(KeyType::Stream),
            _ => unexpected_reply!(v, "Unknown key type"),
        }
    }
}

fn ttl_from_value(v: &Value, unit_to_duration: fn(u64) -> Duration) -> RedisResult<Duration> {
    match v {
        Value::Int(-2) => fail!((
            ErrorKind::ParseError,
            "No time to live: no such key",
            "TTL reply was -2".to_string(),
        )),
        Value::Int(-1) => fail!((
            ErrorKind::ParseError,
            "No time to live: key has no expiration",
            "TTL reply was -1".to_string(),
        )),
        Value::Int(n) if *n >= 0 => Ok(unit_to_duration(*n as u64)),
        _ => unexpected_reply!(v, "Expected an integer TTL reply"),
    }
}

/// A time to live decoded from a `TTL`-style integer reply in seconds.
///
/// The sentinel replies `-1` (key has no expiration) and `-2` (no such
/// key) decode to errors instead of durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlSeconds(pub Duration);

impl FromRedisValue for TtlSeconds {
    fn from_redis_value(v: &Value) -> RedisResult<TtlSeconds> {
        Ok(TtlSeconds(ttl_from_value(v, Duration::from_secs)?))
    }
}

/// A time to live decoded from a `PTTL`-style integer reply in
/// milliseconds. Sentinel replies behave as for [`TtlSeconds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlMillis(pub Duration);

impl FromRedisValue for TtlMillis {
    fn from_redis_value(v: &Value) -> RedisResult<TtlMillis> {
        Ok(TtlMillis(ttl_from_value(v, Duration::from_millis)?))
    }
}

/// A single common subsequence match reported by `LCS` with `IDX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LcsMatch {
    /// Start and end offset of the match in the first key.
    pub first: (u64, u64),
    /// Start and end offset of the match in the second key.
    pub second: (u64, u64),
    /// Match length, only present with `WITHMATCHLEN`.
    pub match_len: Option<u64>,
}

/// Decoded reply of `LCS` with the `IDX` option.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LcsMatches {
    /// All matches, from the rightmost to the leftmost.
    pub matches: Vec<LcsMatch>,
    /// Length of the longest common subsequence.
    pub len: u64,
}

impl FromRedisValue for LcsMatch {
    fn from_redis_value(v: &Value) -> RedisResult<LcsMatch> {
        let items = match v.as_sequence() {
            Some(items) if items.len() == 2 || items.len() == 3 => items,
            _ => unexpected_reply!(v, "Expected an LCS match entry"),
        };
        let first: (u64, u64) = from_redis_value(&items[0])?;
        let second: (u64, u64) = from_redis_value(&items[1])?;
        let match_len = match items.get(2) {
            Some(v) => Some(from_redis_value(v)?),
            None => None,
        };
        Ok(LcsMatch {
            first,
            second,
            match_len,
        })
    }
}

impl FromRedisValue for LcsMatches {
    fn from_redis_value(v: &Value) -> RedisResult<LcsMatches> {
        let mut reply = LcsMatches::default();
        match v.as_map_iter() {
            Some(iter) => {
                for (field, value) in iter {
                    match field {
                        Value::BulkString(name) if name == b"matches" => {
                            reply.matches = from_redis_value(value)?;
                        }
                        Value::BulkString(name) if name == b"len" => {
                            reply.len = from_redis_value(value)?;
                        }
                        _ => {}
                    }
                }
                Ok(reply)
            }
            None => unexpected_reply!(v, "Expected an LCS IDX reply"),
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
    fn classifies_error_tokens() {
        assert_eq!(
            classify_server_error("WRONGTYPE Operation against a key holding the wrong kind of value")
                .kind(),
            ErrorKind::WrongType
        );
        assert_eq!(
            classify_server_error("ERR unknown command").kind(),
            ErrorKind::ResponseError
        );
        assert_eq!(
            classify_server_error("BUSYGROUP Consumer Group name already exists").kind(),
            ErrorKind::BusyGroup
        );
        assert_eq!(
            classify_server_error("NOGROUP No such consumer group").kind(),
            ErrorKind::NoGroup
        );
        assert_eq!(
            classify_server_error("WHATEVER nobody knows this one").kind(),
            ErrorKind::ExtensionError
        );
    }

    #[test]
    fn redirect_node_parses_moved_and_ask() {
        let err = classify_server_error("MOVED 3999 127.0.0.1:6381");
        assert_eq!(err.kind(), ErrorKind::Moved);
        assert_eq!(err.redirect_node(), Some(("127.0.0.1:6381", 3999)));

        let err = classify_server_error("ASK 3999 127.0.0.1:6381");
        assert_eq!(err.kind(), ErrorKind::Ask);
        assert_eq!(err.redirect_node(), Some(("127.0.0.1:6381", 3999)));

        assert_eq!(classify_server_error("ERR oops").redirect_node(), None);
    }

    #[test]
    fn decodes_primitives() {
        assert_eq!(from_redis_value::<i64>(&Value::Int(42)), Ok(42));
        assert_eq!(from_redis_value::<i64>(&bulk("42")), Ok(42));
        assert_eq!(from_redis_value::<f64>(&bulk("1.5")), Ok(1.5));
        assert_eq!(from_redis_value::<f64>(&bulk("inf")), Ok(f64::INFINITY));
        assert_eq!(
            from_redis_value::<f64>(&bulk("-inf")),
            Ok(f64::NEG_INFINITY)
        );
        assert_eq!(
            from_redis_value::<String>(&bulk("hello")),
            Ok("hello".to_string())
        );
        assert_eq!(
            from_redis_value::<Vec<u8>>(&bulk("raw")),
            Ok(b"raw".to_vec())
        );
        assert!(from_redis_value::<i64>(&bulk("abc")).is_err());
    }

    #[test]
    fn decodes_set_style_bool() {
        assert_eq!(from_redis_value::<bool>(&Value::NullBulkString), Ok(false));
        assert_eq!(
            from_redis_value::<bool>(&Value::SimpleString("OK".to_string())),
            Ok(true)
        );
        assert_eq!(from_redis_value::<bool>(&Value::Int(0)), Ok(false));
        assert_eq!(from_redis_value::<bool>(&Value::Int(1)), Ok(true));
    }

    #[test]
    fn optional_distinguishes_nils() {
        assert_eq!(
            from_redis_value::<Option<Vec<u8>>>(&Value::NullBulkString),
            Ok(None)
        );
        assert_eq!(
            from_redis_value::<Option<Vec<String>>>(&Value::NullArray),
            Ok(None)
        );
        assert_eq!(
            from_redis_value::<Option<Vec<u8>>>(&Value::BulkString(vec![])),
            Ok(Some(vec![]))
        );
    }

    #[test]
    fn map_requires_even_length() {
        let odd = Value::Array(vec![bulk("a"), Value::Int(1), bulk("b")]);
        let err = from_redis_value::<HashMap<String, i64>>(&odd).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);

        let even = Value::Array(vec![bulk("a"), Value::Int(1)]);
        let map: HashMap<String, i64> = from_redis_value(&even).unwrap();
        assert_eq!(map.get("a"), Some(&1));
    }

    #[test]
    fn tuple_vec_decodes_flat_chunks() {
        let flat = Value::Array(vec![bulk("a"), bulk("1"), bulk("b"), bulk("2")]);
        let pairs: Vec<(String, i64)> = from_redis_value(&flat).unwrap();
        assert_eq!(pairs, vec![("a".to_string(), 1), ("b".to_string(), 2)]);

        let nested = Value::Array(vec![
            Value::Array(vec![bulk("a"), bulk("1")]),
            Value::Array(vec![bulk("b"), bulk("2")]),
        ]);
        let pairs: Vec<(String, i64)> = from_redis_value(&nested).unwrap();
        assert_eq!(pairs, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
    }

    #[test]
    fn cursor_reply_decodes_as_tuple() {
        let reply = Value::Array(vec![
            bulk("42"),
            Value::Array(vec![bulk("k1"), bulk("k2")]),
        ]);
        assert!(reply.looks_like_cursor());
        let (cursor, keys): (u64, Vec<String>) = from_redis_value(&reply).unwrap();
        assert_eq!(cursor, 42);
        assert_eq!(keys, vec!["k1".to_string(), "k2".to_string()]);
    }

    #[test]
    fn ttl_sentinels_are_errors() {
        assert_eq!(
            from_redis_value::<TtlSeconds>(&Value::Int(10)),
            Ok(TtlSeconds(Duration::from_secs(10)))
        );
        assert_eq!(
            from_redis_value::<TtlMillis>(&Value::Int(1500)),
            Ok(TtlMillis(Duration::from_millis(1500)))
        );
        assert!(from_redis_value::<TtlSeconds>(&Value::Int(-1)).is_err());
        assert!(from_redis_value::<TtlSeconds>(&Value::Int(-2)).is_err());
    }

    #[test]
    fn key_type_from_status() {
        assert_eq!(
            from_redis_value::<KeyType>(&Value::SimpleString("string".to_string())),
            Ok(KeyType::String)
        );
        assert_eq!(
            from_redis_value::<KeyType>(&Value::SimpleString("stream".to_string())),
            Ok(KeyType::Stream)
        );
        assert!(from_redis_value::<KeyType>(&Value::SimpleString("blob".to_string())).is_err());
    }

    #[test]
    fn lcs_matches_with_and_without_len() {
        let reply = Value::Array(vec![
            bulk("matches"),
            Value::Array(vec![Value::Array(vec![
                Value::Array(vec![Value::Int(4), Value::Int(7)]),
                Value::Array(vec![Value::Int(5), Value::Int(8)]),
                Value::Int(4),
            ])]),
            bulk("len"),
            Value::Int(6),
        ]);
        let decoded: LcsMatches = from_redis_value(&reply).unwrap();
        assert_eq!(decoded.len, 6);
        assert_eq!(decoded.matches[0].first, (4, 7));
        assert_eq!(decoded.matches[0].second, (5, 8));
        assert_eq!(decoded.matches[0].match_len, Some(4));
    }

    #[test]
    fn score_bounds_render_tokens() {
        assert_eq!(ScoreBound::NegInf.to_redis_args(), vec![b"-inf".to_vec()]);
        assert_eq!(ScoreBound::PosInf.to_redis_args(), vec![b"+inf".to_vec()]);
        assert_eq!(
            ScoreBound::Exclusive(1.5).to_redis_args(),
            vec![b"(1.5".to_vec()]
        );
        assert_eq!(
            LexBound::Inclusive("a".to_string()).to_redis_args(),
            vec![b"[a".to_vec()]
        );
    }

    #[test]
    fn set_options_write_tokens_in_order() {
        let opts = SetOptions::default()
            .conditional_set(ExistenceCheck::XX)
            .get(true)
            .with_expiration(SetExpiry::PX(1500));
        assert_eq!(
            opts.to_redis_args(),
            vec![
                b"XX".to_vec(),
                b"GET".to_vec(),
                b"PX".to_vec(),
                b"1500".to_vec()
            ]
        );
    }

    #[test]
    fn value_round_trips_through_resp_bytes() {
        let v = Value::Array(vec![
            Value::SimpleString("OK".to_string()),
            Value::Int(-7),
            Value::BulkString(b"payload".to_vec()),
            Value::NullBulkString,
            Value::NullArray,
            Value::Array(vec![]),
        ]);
        let bytes = v.to_resp_bytes();
        assert_eq!(crate::parse_redis_value(&bytes).unwrap(), v);
    }
}
