//! # RESP2 Encoding and Decoding
//!
//! Purpose: Map typed commands to request frames and raw reply bytes to typed
//! replies. Pure functions only: the connection owns sockets and buffers.
//!
//! ## Design Principles
//! 1. **Incremental Decoding**: `decode` reports how many bytes one reply used,
//!    or `None` while the buffer does not yet hold a complete reply.
//! 2. **Binary-Safe**: Arguments and bulk payloads are raw bytes and lengths
//!    are byte counts, never character counts.
//! 3. **Fail Fast**: Invalid framing returns protocol errors immediately.
//! 4. **Closed Command Set**: Only the commands a cache needs can be built.

use crate::error::{ClientError, ClientResult};

/// A single decoded server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// +OK or +PONG style acknowledgements.
    Status(String),
    /// :123 responses.
    Integer(i64),
    /// $... bulk strings that carry a value.
    Bulk(Vec<u8>),
    /// $-1, an explicit absence (distinct from an empty bulk string).
    Nil,
    /// -ERR ... responses.
    Error(String),
}

/// An immutable store command.
///
/// Commands are built through the named constructors and encode
/// deterministically to one request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Vec<u8>>,
    inline: bool,
}

impl Command {
    /// `PING`, sent as a bare inline line.
    pub fn ping() -> Self {
        Command {
            args: vec![b"PING".to_vec()],
            inline: true,
        }
    }

    /// `GET key`
    pub fn get(key: &[u8]) -> Self {
        Self::array([b"GET".as_slice(), key])
    }

    /// `SET key value`
    pub fn set(key: &[u8], value: &[u8]) -> Self {
        Self::array([b"SET".as_slice(), key, value])
    }

    /// `SET key value EX seconds`
    pub fn set_with_ttl(key: &[u8], value: &[u8], ttl_secs: u64) -> Self {
        let seconds = ttl_secs.to_string();
        Self::array([b"SET".as_slice(), key, value, b"EX", seconds.as_bytes()])
    }

    /// `DEL key`
    pub fn del(key: &[u8]) -> Self {
        Self::array([b"DEL".as_slice(), key])
    }

    /// `INCR key`
    pub fn incr(key: &[u8]) -> Self {
        Self::array([b"INCR".as_slice(), key])
    }

    /// `EXPIRE key seconds`
    pub fn expire(key: &[u8], seconds: u64) -> Self {
        let seconds = seconds.to_string();
        Self::array([b"EXPIRE".as_slice(), key, seconds.as_bytes()])
    }

    /// `AUTH [username] password`
    pub fn auth(username: Option<&str>, password: &str) -> Self {
        match username {
            Some(user) => Self::array([b"AUTH".as_slice(), user.as_bytes(), password.as_bytes()]),
            None => Self::array([b"AUTH".as_slice(), password.as_bytes()]),
        }
    }

    fn array<const N: usize>(args: [&[u8]; N]) -> Self {
        Command {
            args: args.iter().map(|arg| arg.to_vec()).collect(),
            inline: false,
        }
    }

    /// Command name, e.g. `SET`.
    pub fn name(&self) -> &[u8] {
        &self.args[0]
    }

    /// All arguments including the command name.
    pub fn args(&self) -> &[Vec<u8>] {
        &self.args
    }
}

/// Encodes a command into a freshly allocated frame.
pub fn encode(cmd: &Command) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    encode_into(cmd, &mut out);
    out
}

/// Encodes a command into the provided buffer.
///
/// Array commands become `*<argc>\r\n` followed by `$<len>\r\n<bytes>\r\n`
/// per argument. Inline commands are written as one CRLF-terminated line.
pub fn encode_into(cmd: &Command, out: &mut Vec<u8>) {
    if cmd.inline {
        for (idx, arg) in cmd.args.iter().enumerate() {
            if idx > 0 {
                out.push(b' ');
            }
            out.extend_from_slice(arg);
        }
        out.extend_from_slice(b"\r\n");
        return;
    }

    out.push(b'*');
    push_usize(out, cmd.args.len());
    out.extend_from_slice(b"\r\n");
    for arg in &cmd.args {
        out.push(b'$');
        push_usize(out, arg.len());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Decodes one reply from the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the reply and the
/// number of bytes it occupied. Bytes past that count belong to the next reply.
pub fn decode(buf: &[u8]) -> ClientResult<Option<(Reply, usize)>> {
    let newline = match buf.iter().position(|b| *b == b'\n') {
        Some(pos) => pos,
        None => return Ok(None),
    };
    let consumed = newline + 1;
    let line = strip_cr(&buf[..newline]);
    let Some((&tag, payload)) = line.split_first() else {
        // No first byte to recognise: an empty bare status.
        return Ok(Some((Reply::Status(String::new()), consumed)));
    };

    let reply = match tag {
        b'+' => Reply::Status(lossy(payload)),
        b'-' => Reply::Error(lossy(payload)),
        b':' => Reply::Integer(parse_i64(payload)?),
        b'$' => return decode_bulk(buf, consumed, parse_i64(payload)?),
        b'*' => {
            return Err(ClientError::Protocol(
                "array replies are not supported".to_string(),
            ))
        }
        // Anything else is taken as a bare status line.
        _ => Reply::Status(lossy(line)),
    };
    Ok(Some((reply, consumed)))
}

/// Decodes a buffer that must contain exactly one complete reply.
pub fn decode_reply(buf: &[u8]) -> ClientResult<Reply> {
    match decode(buf)? {
        Some((reply, used)) if used == buf.len() => Ok(reply),
        Some(_) => Err(ClientError::Protocol("trailing bytes after reply".to_string())),
        None => Err(ClientError::Protocol("incomplete reply".to_string())),
    }
}

fn decode_bulk(buf: &[u8], header: usize, len: i64) -> ClientResult<Option<(Reply, usize)>> {
    if len == -1 {
        return Ok(Some((Reply::Nil, header)));
    }
    let len = usize::try_from(len)
        .map_err(|_| ClientError::Protocol(format!("invalid bulk length {len}")))?;

    let end = header + len;
    if buf.len() < end + 2 {
        return Ok(None);
    }
    if &buf[end..end + 2] != b"\r\n" {
        return Err(ClientError::Protocol("bulk string missing CRLF".to_string()));
    }
    Ok(Some((Reply::Bulk(buf[header..end].to_vec()), end + 2)))
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn lossy(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

fn parse_i64(data: &[u8]) -> ClientResult<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or_else(|| ClientError::Protocol(format!("invalid integer {:?}", lossy(data))))
}

fn push_usize(out: &mut Vec<u8>, mut value: usize) {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut buf = [0u8; 20];
    let mut len = 0;
    loop {
        buf[len] = b'0' + (value % 10) as u8;
        value /= 10;
        len += 1;
        if value == 0 {
            break;
        }
    }
    out.extend(buf[..len].iter().rev());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_set() {
        assert_eq!(
            encode(&Command::set(b"k", b"v")),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n"
        );
    }

    #[test]
    fn encodes_set_with_ttl_suffix() {
        assert_eq!(
            encode(&Command::set_with_ttl(b"key", b"value", 15)),
            b"*5\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n$2\r\nEX\r\n$2\r\n15\r\n"
        );
    }

    #[test]
    fn encodes_lengths_in_bytes() {
        let frame = encode(&Command::get("clé".as_bytes()));
        assert_eq!(frame, "*2\r\n$3\r\nGET\r\n$4\r\nclé\r\n".as_bytes());
    }

    #[test]
    fn encodes_expire_seconds_as_decimal() {
        assert_eq!(
            encode(&Command::expire(b"k", 120)),
            b"*3\r\n$6\r\nEXPIRE\r\n$1\r\nk\r\n$3\r\n120\r\n"
        );
    }

    #[test]
    fn encodes_ping_inline() {
        assert_eq!(encode(&Command::ping()), b"PING\r\n");
    }

    #[test]
    fn encodes_auth_with_and_without_username() {
        assert_eq!(
            encode(&Command::auth(None, "secret")),
            b"*2\r\n$4\r\nAUTH\r\n$6\r\nsecret\r\n"
        );
        assert_eq!(Command::auth(Some("cache"), "secret").args().len(), 3);
    }

    #[test]
    fn decodes_literal_replies() {
        assert_eq!(decode_reply(b"+OK\r\n").unwrap(), Reply::Status("OK".into()));
        assert_eq!(decode_reply(b":5\r\n").unwrap(), Reply::Integer(5));
        assert_eq!(decode_reply(b"$3\r\nabc\r\n").unwrap(), Reply::Bulk(b"abc".to_vec()));
        assert_eq!(decode_reply(b"$-1\r\n").unwrap(), Reply::Nil);
        assert_eq!(decode_reply(b"-ERR bad\r\n").unwrap(), Reply::Error("ERR bad".into()));
    }

    #[test]
    fn empty_bulk_is_not_nil() {
        assert_eq!(decode_reply(b"$0\r\n\r\n").unwrap(), Reply::Bulk(Vec::new()));
    }

    #[test]
    fn negative_integer() {
        assert_eq!(decode_reply(b":-42\r\n").unwrap(), Reply::Integer(-42));
    }

    #[test]
    fn bulk_payload_may_contain_crlf() {
        let reply = decode_reply(b"$4\r\na\r\nb\r\n").unwrap();
        assert_eq!(reply, Reply::Bulk(b"a\r\nb".to_vec()));
    }

    #[test]
    fn incomplete_input_needs_more() {
        assert!(decode(b"+OK").unwrap().is_none());
        assert!(decode(b"$5\r\nhel").unwrap().is_none());
        assert!(decode(b"$5\r\nhello").unwrap().is_none());
    }

    #[test]
    fn reports_consumed_length_and_leaves_the_rest() {
        let buf = b":1\r\n+OK\r\n";
        let (reply, used) = decode(buf).unwrap().unwrap();
        assert_eq!(reply, Reply::Integer(1));
        assert_eq!(&buf[used..], b"+OK\r\n");
    }

    #[test]
    fn rejects_non_numeric_integer() {
        assert!(matches!(decode(b":abc\r\n"), Err(ClientError::Protocol(_))));
    }

    #[test]
    fn rejects_array_reply() {
        assert!(matches!(decode(b"*1\r\n$1\r\na\r\n"), Err(ClientError::Protocol(_))));
    }

    #[test]
    fn rejects_bulk_without_crlf() {
        assert!(matches!(decode(b"$3\r\nabcXY"), Err(ClientError::Protocol(_))));
    }

    #[test]
    fn unknown_prefix_is_bare_status() {
        assert_eq!(decode_reply(b"PONG\r\n").unwrap(), Reply::Status("PONG".into()));
    }

    #[test]
    fn blank_line_is_empty_status() {
        assert_eq!(decode_reply(b"\r\n").unwrap(), Reply::Status(String::new()));
        let (reply, used) = decode(b"\r\n:1\r\n").unwrap().unwrap();
        assert_eq!(reply, Reply::Status(String::new()));
        assert_eq!(used, 2);
    }
}
