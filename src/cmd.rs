use std::{fmt, io};

use crate::aio::RedisExecutor;
use crate::types::{
    classify_server_error, from_owned_redis_value, FromRedisValue, RedisResult, RedisWrite,
    ToRedisArgs, Value,
};

fn countdigits(mut v: usize) -> usize {
    let mut result = 1;
    loop {
        if v < 10 {
            return result;
        }
        if v < 100 {
            return result + 1;
        }
        if v < 1000 {
            return result + 2;
        }
        if v < 10000 {
            return result + 3;
        }

        v /= 10000;
        result += 4;
    }
}

#[inline]
fn bulklen(len: usize) -> usize {
    1 + countdigits(len) + 2 + len + 2
}

fn write_command<'a, I>(out: &mut (impl ?Sized + io::Write), args: I) -> io::Result<()>
where
    I: IntoIterator<Item = &'a [u8]> + ExactSizeIterator,
{
    let mut buf = ::itoa::Buffer::new();

    out.write_all(b"*")?;
    out.write_all(buf.format(args.len()).as_bytes())?;
    out.write_all(b"\r\n")?;

    for bytes in args {
        out.write_all(b"$")?;
        out.write_all(buf.format(bytes.len()).as_bytes())?;
        out.write_all(b"\r\n")?;
        out.write_all(bytes)?;
        out.write_all(b"\r\n")?;
    }
    Ok(())
}

/// A command acts as a builder interface for creating encoded requests.
/// This allows you to easily assemble a packed command by chaining
/// arguments together. The verb itself is the first argument; multi word
/// verbs such as `CLUSTER SLOTS` are chained the same way:
///
/// ```rust
/// respite::cmd("SET").arg("my_key").arg(42);
/// respite::cmd("CLUSTER").arg("SLOTS").keyless();
/// ```
///
/// On the wire every command is an array of bulk strings, exactly one per
/// written argument.
#[derive(Clone, Default)]
pub struct Cmd {
    data: Vec<u8>,
    // Offsets into `data` that mark the end of each argument.
    args: Vec<usize>,
    keyless: bool,
}

/// Shortcut function for creating a command with the given verb.
pub fn cmd(name: &str) -> Cmd {
    let mut rv = Cmd::new();
    rv.arg(name);
    rv
}

impl RedisWrite for Cmd {
    fn write_arg(&mut self, arg: &[u8]) {
        self.data.extend_from_slice(arg);
        self.args.push(self.data.len());
    }

    fn write_arg_fmt(&mut self, arg: impl fmt::Display) {
        use std::io::Write;
        write!(self.data, "{arg}").unwrap();
        self.args.push(self.data.len());
    }
}

impl Cmd {
    /// Creates a new empty command.
    pub fn new() -> Cmd {
        Cmd::default()
    }

    /// Creates a new empty command with at least the requested capacity.
    pub fn with_capacity(arg_count: usize, size_of_data: usize) -> Cmd {
        Cmd {
            data: Vec::with_capacity(size_of_data),
            args: Vec::with_capacity(arg_count),
            keyless: false,
        }
    }

    /// Appends an argument to the command. The argument passed must be a
    /// type that implements [`ToRedisArgs`]; most primitive types as well
    /// as vectors of primitive types implement it.
    #[inline]
    pub fn arg<T: ToRedisArgs>(&mut self, arg: T) -> &mut Cmd {
        arg.write_redis_args(self);
        self
    }

    /// Marks the command as carrying no key argument.
    ///
    /// Keyed commands carry their key at argument index 1 and are routed
    /// by slot in cluster mode; commands such as `PING` or `CLUSTER SLOTS`
    /// have no key and must be marked so the router can dispatch them to
    /// an arbitrary node.
    pub fn keyless(&mut self) -> &mut Cmd {
        self.keyless = true;
        self
    }

    /// Whether the command was marked as carrying no key argument.
    pub fn is_keyless(&self) -> bool {
        self.keyless
    }

    /// Returns the number of arguments, the verb included.
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Returns the bytes of the argument at `idx`. Index 0 is the verb.
    pub fn arg_idx(&self, idx: usize) -> Option<&[u8]> {
        if idx >= self.args.len() {
            return None;
        }
        let start = if idx == 0 { 0 } else { self.args[idx - 1] };
        Some(&self.data[start..self.args[idx]])
    }

    /// Returns an iterator over all arguments of the command.
    pub fn args_iter(&self) -> impl Iterator<Item = &[u8]> + Clone + ExactSizeIterator {
        let mut prev = 0;
        self.args.iter().map(move |end| {
            let arg = &self.data[prev..*end];
            prev = *end;
            arg
        })
    }

    /// Returns the packed command as a byte vector: a RESP array of bulk
    /// strings, one per argument.
    pub fn get_packed_command(&self) -> Vec<u8> {
        let mut cmd = Vec::with_capacity(self.packed_command_len());
        write_command(&mut cmd, self.args_iter()).expect("writes to a vec never fail");
        cmd
    }

    fn packed_command_len(&self) -> usize {
        let mut totlen = 1 + countdigits(self.args.len()) + 2;
        for arg in self.args_iter() {
            totlen += bulklen(arg.len());
        }
        totlen
    }

    /// Sends the command to the executor and converts the reply into the
    /// requested type.
    ///
    /// A `Value::Error` reply is classified by its leading token here, at
    /// the command boundary, and surfaces as the corresponding
    /// [`crate::ErrorKind`]; it never reaches the [`FromRedisValue`]
    /// decoder.
    pub async fn query_async<T: FromRedisValue>(
        &self,
        con: &impl RedisExecutor,
    ) -> RedisResult<T> {
        match con.execute(self).await? {
            Value::Error(line) => Err(classify_server_error(&line)),
            value => from_owned_redis_value(value),
        }
    }

    /// Sends the command and discards the reply payload. This is useful
    /// when the caller only cares that the command did not fail.
    pub async fn exec_async(&self, con: &impl RedisExecutor) -> RedisResult<()> {
        self.query_async::<()>(con).await
    }
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for arg in self.args_iter() {
            match std::str::from_utf8(arg) {
                Ok(s) => list.entry(&s),
                Err(_) => list.entry(&arg),
            };
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_set_and_get() {
        let packed = cmd("SET").arg("foo").arg("bar").get_packed_command();
        assert_eq!(&packed, b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");

        let packed = cmd("GET").arg("foo").get_packed_command();
        assert_eq!(&packed, b"*2\r\n$2\r\nGET\r\n$3\r\nfoo\r\n");
    }

    #[test]
    fn multi_word_verbs_are_separate_bulk_strings() {
        let packed = cmd("CLUSTER").arg("SLOTS").get_packed_command();
        assert_eq!(&packed, b"*2\r\n$7\r\nCLUSTER\r\n$5\r\nSLOTS\r\n");
    }

    #[test]
    fn binary_arguments_pass_through_unchanged() {
        let packed = cmd("SET").arg("k").arg(&b"\x00\xffbin"[..]).get_packed_command();
        assert_eq!(&packed, b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$5\r\n\x00\xffbin\r\n");
    }

    #[test]
    fn arg_idx_exposes_verb_and_key() {
        let mut c = cmd("GET");
        c.arg("foo");
        assert_eq!(c.arg_idx(0), Some(&b"GET"[..]));
        assert_eq!(c.arg_idx(1), Some(&b"foo"[..]));
        assert_eq!(c.arg_idx(2), None);
    }

    #[test]
    fn optional_args_may_write_nothing() {
        let mut c = cmd("GET");
        c.arg("foo").arg(None::<i64>);
        assert_eq!(c.arg_count(), 2);
    }

    #[test]
    fn flattens_sequences_into_arguments() {
        let packed = cmd("DEL").arg(&["a", "b"][..]).get_packed_command();
        assert_eq!(&packed, b"*3\r\n$3\r\nDEL\r\n$1\r\na\r\n$1\r\nb\r\n");
    }
}
