use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

// =============================================================================
// Wire Messages
// =============================================================================

/// Key-state vector sent to the remote game. The four gameplay flags and the
/// restart flag are mutually exclusive in usage: a restart click sets only `r`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keys {
    #[serde(default)]
    pub q: bool,
    #[serde(default)]
    pub w: bool,
    #[serde(default)]
    pub o: bool,
    #[serde(default)]
    pub p: bool,
    #[serde(default)]
    pub r: bool,
}

impl Keys {
    pub fn restart() -> Self {
        Keys {
            r: true,
            ..Keys::default()
        }
    }
}

/// One rendered grayscale frame. `pixels` is row-major, length width*height.
/// Produced fresh on each query; never retained by the remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub finished: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Request {
    Click { keys: Keys },
    GetScore,
    GetScreen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Response {
    Ack,
    Score { score: f64 },
    Screen(ScreenFrame),
    Error { message: String },
}

// =============================================================================
// Game Control
// =============================================================================

/// Blocking control channel to the remote game process. Each call holds the
/// caller until the reply arrives or the bounded wait expires.
pub trait GameControl {
    /// Set which keys are currently held down.
    fn click(&mut self, keys: &Keys) -> Result<()>;

    /// Current cumulative score. Not monotone: progress can regress.
    fn score(&mut self) -> Result<f64>;

    /// Current frame plus the episode-finished flag.
    fn screen(&mut self) -> Result<ScreenFrame>;
}

/// Newline-delimited JSON client over a single TCP connection. The connection
/// is acquired once at construction and held for the client's lifetime; there
/// is no reconnection or retry policy here.
pub struct TcpGameClient {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
    timeout: Duration,
}

impl TcpGameClient {
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let connect_err = |source| Error::Transport {
            call: "connect",
            source,
        };
        let stream = TcpStream::connect(addr).map_err(connect_err)?;
        stream.set_read_timeout(Some(timeout)).map_err(connect_err)?;
        let _ = stream.set_nodelay(true);
        let reader = BufReader::new(stream.try_clone().map_err(connect_err)?);
        Ok(Self {
            writer: stream,
            reader,
            timeout,
        })
    }

    fn round_trip(&mut self, call: &'static str, request: &Request) -> Result<Response> {
        let mut line = serde_json::to_string(request).map_err(|e| Error::Transport {
            call,
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .map_err(|source| self.classify(call, source))?;

        let mut reply = String::new();
        let n = self
            .reader
            .read_line(&mut reply)
            .map_err(|source| self.classify(call, source))?;
        if n == 0 {
            return Err(Error::Transport {
                call,
                source: io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"),
            });
        }
        debug!(call, bytes = n, "rpc reply");
        serde_json::from_str(reply.trim_end()).map_err(|e| Error::Transport {
            call,
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })
    }

    fn classify(&self, call: &'static str, source: io::Error) -> Error {
        match source.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Error::Timeout {
                call,
                timeout: self.timeout,
            },
            _ => Error::Transport { call, source },
        }
    }
}

impl GameControl for TcpGameClient {
    fn click(&mut self, keys: &Keys) -> Result<()> {
        match self.round_trip("Click", &Request::Click { keys: *keys })? {
            Response::Ack => Ok(()),
            Response::Error { message } => Err(Error::Remote {
                call: "Click",
                message,
            }),
            _ => Err(Error::UnexpectedReply { call: "Click" }),
        }
    }

    fn score(&mut self) -> Result<f64> {
        match self.round_trip("GetScore", &Request::GetScore)? {
            Response::Score { score } => Ok(score),
            Response::Error { message } => Err(Error::Remote {
                call: "GetScore",
                message,
            }),
            _ => Err(Error::UnexpectedReply { call: "GetScore" }),
        }
    }

    fn screen(&mut self) -> Result<ScreenFrame> {
        match self.round_trip("GetScreen", &Request::GetScreen)? {
            Response::Screen(frame) => Ok(frame),
            Response::Error { message } => Err(Error::Remote {
                call: "GetScreen",
                message,
            }),
            _ => Err(Error::UnexpectedReply { call: "GetScreen" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn request_wire_shape() {
        let req = Request::Click {
            keys: Keys {
                q: true,
                p: true,
                ..Keys::default()
            },
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"type":"Click","keys":{"q":true,"w":false,"o":false,"p":true,"r":false}}"#
        );
        assert_eq!(
            serde_json::to_string(&Request::GetScore).unwrap(),
            r#"{"type":"GetScore"}"#
        );
    }

    #[test]
    fn response_parses_with_missing_key_flags() {
        let keys: Keys = serde_json::from_str(r#"{"r":true}"#).unwrap();
        assert_eq!(keys, Keys::restart());
    }

    fn spawn_scripted_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let reader = BufReader::new(stream);
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(_) => break,
                };
                let request: Request = serde_json::from_str(&line).unwrap();
                let response = match request {
                    Request::Click { .. } => Response::Ack,
                    Request::GetScore => Response::Score { score: 12.5 },
                    Request::GetScreen => Response::Screen(ScreenFrame {
                        width: 2,
                        height: 2,
                        pixels: vec![0, 1, 2, 3],
                        finished: true,
                    }),
                };
                let mut out = serde_json::to_string(&response).unwrap();
                out.push('\n');
                if writer.write_all(out.as_bytes()).is_err() {
                    break;
                }
            }
        });
        addr
    }

    #[test]
    fn loopback_round_trips() {
        let addr = spawn_scripted_server();
        let mut client = TcpGameClient::connect(&addr, Duration::from_secs(5)).unwrap();

        client.click(&Keys::restart()).unwrap();
        assert_eq!(client.score().unwrap(), 12.5);
        let frame = client.screen().unwrap();
        assert_eq!((frame.width, frame.height), (2, 2));
        assert_eq!(frame.pixels, vec![0, 1, 2, 3]);
        assert!(frame.finished);
    }

    #[test]
    fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        // Accept the connection, then never reply.
        let guard = thread::spawn(move || listener.accept().unwrap());

        let mut client = TcpGameClient::connect(&addr, Duration::from_millis(50)).unwrap();
        match client.score() {
            Err(Error::Timeout { call, .. }) => assert_eq!(call, "GetScore"),
            other => panic!("expected timeout, got {other:?}"),
        }
        drop(guard.join().unwrap());
    }
}
