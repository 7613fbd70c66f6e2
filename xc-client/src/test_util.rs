//! # In-Process Fake Store
//!
//! Purpose: A small RESP2 server on `127.0.0.1:0` for integration tests. It
//! understands the cache command subset, records every request, and can be
//! told to delay replies or answer with scripted raw bytes.
//!
//! ## Usage Notes
//! - Values expire lazily on access, using tokio time, so paused-clock tests
//!   can advance past a TTL.
//! - Scripted replies are consumed in order, one per request, before normal
//!   dispatch applies.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct State {
    entries: HashMap<Vec<u8>, Entry>,
    password: Option<String>,
    commands: Vec<Vec<Vec<u8>>>,
    scripted: VecDeque<Vec<u8>>,
    reply_delay: Duration,
    accepted: usize,
    live: usize,
}

/// Handle to a running fake store. The listener stops when it is dropped.
pub struct FakeStore {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    accept: JoinHandle<()>,
}

impl FakeStore {
    /// Starts a store that accepts any client.
    pub async fn start() -> io::Result<Self> {
        Self::start_with(State::default()).await
    }

    /// Starts a store that requires `AUTH password` before other commands.
    pub async fn with_password(password: &str) -> io::Result<Self> {
        Self::start_with(State {
            password: Some(password.to_string()),
            ..State::default()
        })
        .await
    }

    async fn start_with(state: State) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(state));

        let shared = Arc::clone(&state);
        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                {
                    let mut state = lock(&shared);
                    state.accepted += 1;
                    state.live += 1;
                }
                tokio::spawn(serve(stream, Arc::clone(&shared)));
            }
        });

        Ok(FakeStore { addr, state, accept })
    }

    /// Address to pass to the client config.
    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    /// Every request received so far, AUTH and PING included.
    pub fn commands(&self) -> Vec<Vec<Vec<u8>>> {
        lock(&self.state).commands.clone()
    }

    /// Upper-cased names of the requests received so far.
    pub fn command_names(&self) -> Vec<String> {
        lock(&self.state)
            .commands
            .iter()
            .map(|args| String::from_utf8_lossy(&args[0]).to_ascii_uppercase())
            .collect()
    }

    /// Connections accepted since start.
    pub fn accepted(&self) -> usize {
        lock(&self.state).accepted
    }

    /// Connections the server still considers open.
    pub fn live_connections(&self) -> usize {
        lock(&self.state).live
    }

    /// Polls until `live_connections() == expected` or one second passes.
    pub async fn wait_for_live(&self, expected: usize) -> bool {
        self.wait_for(|state| state.live == expected).await
    }

    /// Polls until `accepted() == expected` or one second passes.
    pub async fn wait_for_accepted(&self, expected: usize) -> bool {
        self.wait_for(|state| state.accepted == expected).await
    }

    async fn wait_for(&self, done: impl Fn(&State) -> bool) -> bool {
        let until = Instant::now() + Duration::from_secs(1);
        loop {
            if done(&lock(&self.state)) {
                return true;
            }
            if Instant::now() >= until {
                return false;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }

    /// Delays every subsequent reply.
    pub fn set_reply_delay(&self, delay: Duration) {
        lock(&self.state).reply_delay = delay;
    }

    /// Answers the next request with `raw` instead of dispatching it.
    pub fn push_reply(&self, raw: &[u8]) {
        lock(&self.state).scripted.push_back(raw.to_vec());
    }

    /// Stores a value directly, bypassing the protocol.
    pub fn insert(&self, key: &[u8], value: &[u8]) {
        lock(&self.state).entries.insert(
            key.to_vec(),
            Entry {
                value: value.to_vec(),
                expires_at: None,
            },
        );
    }

    /// Current value of `key`, honouring expiry.
    pub fn value(&self, key: &[u8]) -> Option<Vec<u8>> {
        lock(&self.state).live_entry(key).map(|entry| entry.value.clone())
    }
}

impl Drop for FakeStore {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().expect("fake store mutex poisoned")
}

async fn serve(stream: TcpStream, state: Arc<Mutex<State>>) {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut authed = lock(&state).password.is_none();

    while let Ok(Some(args)) = read_request(&mut reader).await {
        let (delay, reply) = {
            let mut guard = lock(&state);
            guard.commands.push(args.clone());
            let reply = match guard.scripted.pop_front() {
                Some(raw) => raw,
                None => guard.dispatch(&args, &mut authed),
            };
            (guard.reply_delay, reply)
        };
        if !delay.is_zero() {
            sleep(delay).await;
        }
        if write.write_all(&reply).await.is_err() {
            break;
        }
    }

    lock(&state).live -= 1;
}

/// Reads one array or inline request. `Ok(None)` on a clean EOF.
async fn read_request<R>(reader: &mut R) -> io::Result<Option<Vec<Vec<u8>>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(None);
        }
        trim_line(&mut line);
        if !line.is_empty() {
            break;
        }
    }

    if line[0] != b'*' {
        let args = line
            .split(|b| *b == b' ')
            .filter(|arg| !arg.is_empty())
            .map(|arg| arg.to_vec())
            .collect();
        return Ok(Some(args));
    }

    let count = parse_len(&line[1..])?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_until(b'\n', &mut line).await?;
        trim_line(&mut line);
        if line.first() != Some(&b'$') {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "expected bulk"));
        }
        let len = parse_len(&line[1..])?;
        let mut data = vec![0u8; len + 2];
        reader.read_exact(&mut data).await?;
        data.truncate(len);
        args.push(data);
    }
    Ok(Some(args))
}

fn trim_line(line: &mut Vec<u8>) {
    while matches!(line.last(), Some(b'\n') | Some(b'\r')) {
        line.pop();
    }
}

fn parse_len(data: &[u8]) -> io::Result<usize> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "invalid length"))
}

impl State {
    fn dispatch(&mut self, args: &[Vec<u8>], authed: &mut bool) -> Vec<u8> {
        let Some(cmd) = args.first() else {
            return resp_error("ERR empty command");
        };
        let cmd = cmd.to_ascii_uppercase();

        if cmd == b"AUTH" {
            return self.handle_auth(args, authed);
        }
        if !*authed {
            return resp_error("NOAUTH Authentication required.");
        }

        match cmd.as_slice() {
            b"PING" => resp_simple("PONG"),
            b"GET" => self.handle_get(args),
            b"SET" => self.handle_set(args),
            b"DEL" => self.handle_del(args),
            b"INCR" => self.handle_incr(args),
            b"EXPIRE" => self.handle_expire(args),
            _ => resp_error("ERR unknown command"),
        }
    }

    fn handle_auth(&mut self, args: &[Vec<u8>], authed: &mut bool) -> Vec<u8> {
        let Some(expected) = self.password.as_deref() else {
            return resp_error("ERR AUTH called without any password configured");
        };
        match args.last() {
            Some(given) if args.len() >= 2 && given.as_slice() == expected.as_bytes() => {
                *authed = true;
                resp_simple("OK")
            }
            _ => resp_error("WRONGPASS invalid username-password pair"),
        }
    }

    fn handle_get(&mut self, args: &[Vec<u8>]) -> Vec<u8> {
        if args.len() != 2 {
            return resp_error("ERR wrong number of arguments for GET");
        }
        match self.live_entry(&args[1]) {
            Some(entry) => resp_bulk(&entry.value),
            None => resp_null(),
        }
    }

    fn handle_set(&mut self, args: &[Vec<u8>]) -> Vec<u8> {
        let expires_at = match args.len() {
            3 => None,
            5 if args[3].eq_ignore_ascii_case(b"EX") => match parse_u64(&args[4]) {
                Some(seconds) if seconds > 0 => {
                    Some(Instant::now() + Duration::from_secs(seconds))
                }
                _ => return resp_error("ERR invalid expire time in 'set' command"),
            },
            _ => return resp_error("ERR syntax error"),
        };
        self.entries.insert(
            args[1].clone(),
            Entry {
                value: args[2].clone(),
                expires_at,
            },
        );
        resp_simple("OK")
    }

    fn handle_del(&mut self, args: &[Vec<u8>]) -> Vec<u8> {
        if args.len() < 2 {
            return resp_error("ERR wrong number of arguments for DEL");
        }
        let mut removed = 0i64;
        for key in &args[1..] {
            if self.live_entry(key).is_some() {
                self.entries.remove(key);
                removed += 1;
            }
        }
        resp_integer(removed)
    }

    fn handle_incr(&mut self, args: &[Vec<u8>]) -> Vec<u8> {
        if args.len() != 2 {
            return resp_error("ERR wrong number of arguments for INCR");
        }
        let current = match self.live_entry(&args[1]) {
            Some(entry) => match std::str::from_utf8(&entry.value)
                .ok()
                .and_then(|text| text.parse::<i64>().ok())
            {
                Some(value) => value,
                None => return resp_error("ERR value is not an integer or out of range"),
            },
            None => 0,
        };
        let Some(next) = current.checked_add(1) else {
            return resp_error("ERR increment or decrement would overflow");
        };
        let expires_at = self.live_entry(&args[1]).and_then(|entry| entry.expires_at);
        self.entries.insert(
            args[1].clone(),
            Entry {
                value: next.to_string().into_bytes(),
                expires_at,
            },
        );
        resp_integer(next)
    }

    fn handle_expire(&mut self, args: &[Vec<u8>]) -> Vec<u8> {
        if args.len() != 3 {
            return resp_error("ERR wrong number of arguments for EXPIRE");
        }
        let Some(seconds) = parse_u64(&args[2]) else {
            return resp_error("ERR value is not an integer or out of range");
        };
        match self.live_entry(&args[1]) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
                resp_integer(1)
            }
            None => resp_integer(0),
        }
    }

    fn live_entry(&mut self, key: &[u8]) -> Option<&mut Entry> {
        let expired = self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .is_some_and(|at| Instant::now() >= at);
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get_mut(key)
    }
}

fn parse_u64(arg: &[u8]) -> Option<u64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

fn resp_simple(message: &str) -> Vec<u8> {
    format!("+{message}\r\n").into_bytes()
}

fn resp_error(message: &str) -> Vec<u8> {
    format!("-{message}\r\n").into_bytes()
}

fn resp_integer(value: i64) -> Vec<u8> {
    format!(":{value}\r\n").into_bytes()
}

fn resp_bulk(data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(data.len() + 16);
    buf.extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
    buf
}

fn resp_null() -> Vec<u8> {
    b"$-1\r\n".to_vec()
}
