//! RL environment adapter for a remote, RPC-controlled QWOP instance.
//!
//! The adapter performs no game logic and no learning: it forwards discrete
//! key-combination actions to the remote game over a blocking control channel
//! and turns the remote's pixel buffer and score signal into
//! (observation, reward, done, info).

/// Declared observation-space shape, independent of the frame dimensions the
/// remote actually reports.
pub const OBS_HEIGHT: usize = 50;
pub const OBS_WIDTH: usize = 80;

pub mod env;
pub mod error;
pub mod rpc;

pub use env::{Action, EnvConfig, Observation, QwopEnv, Step};
pub use error::{Error, Result};
pub use rpc::{GameControl, Keys, ScreenFrame, TcpGameClient};
