use std::collections::HashMap;
use std::ops::Range;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::rpc::{GameControl, Keys, ScreenFrame};
use crate::{OBS_HEIGHT, OBS_WIDTH};

// =============================================================================
// Action Space
// =============================================================================

/// The 16 discrete action codes: every combination of the four gameplay keys,
/// including none. The mapping is fixed at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Action {
    Q = 0,
    W = 1,
    O = 2,
    P = 3,
    Qw = 4,
    Qo = 5,
    Qp = 6,
    Wo = 7,
    Wp = 8,
    Op = 9,
    Qwo = 10,
    Qwp = 11,
    Qop = 12,
    Wop = 13,
    Qwop = 14,
    Nothing = 15,
}

impl Action {
    pub const COUNT: usize = 16;

    pub fn from_index(i: usize) -> Result<Self> {
        if i >= Self::COUNT {
            return Err(Error::InvalidAction(i));
        }
        // Variants are contiguous from 0 with repr(u8).
        Ok(unsafe { std::mem::transmute::<u8, Action>(i as u8) })
    }

    pub fn label(self) -> &'static str {
        match self {
            Action::Q => "Q",
            Action::W => "W",
            Action::O => "O",
            Action::P => "P",
            Action::Qw => "QW",
            Action::Qo => "QO",
            Action::Qp => "QP",
            Action::Wo => "WO",
            Action::Wp => "WP",
            Action::Op => "OP",
            Action::Qwo => "QWO",
            Action::Qwp => "QWP",
            Action::Qop => "QOP",
            Action::Wop => "WOP",
            Action::Qwop => "QWOP",
            Action::Nothing => "NTHING",
        }
    }

    /// Key-state vector for this action. A key is held iff its letter appears
    /// in the action's label; the restart flag is never set here.
    pub fn to_keys(self) -> Keys {
        let label = self.label();
        Keys {
            q: label.contains('Q'),
            w: label.contains('W'),
            o: label.contains('O'),
            p: label.contains('P'),
            r: false,
        }
    }
}

// =============================================================================
// Observation
// =============================================================================

/// A 2-D grayscale frame, row-major (height x width), unflattened from a
/// [`ScreenFrame`]: flat index `y * width + x` maps to cell `(y, x)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    rows: Vec<Vec<u8>>,
}

impl Observation {
    fn from_frame(frame: &ScreenFrame) -> Result<Self> {
        let (w, h) = (frame.width as usize, frame.height as usize);
        if frame.pixels.len() != w * h {
            return Err(Error::MalformedScreen {
                width: frame.width,
                height: frame.height,
                len: frame.pixels.len(),
            });
        }
        let mut rows = vec![vec![0u8; w]; h];
        for (y, row) in rows.iter_mut().enumerate() {
            for (x, cell) in row.iter_mut().enumerate() {
                *cell = frame.pixels[y * w + x];
            }
        }
        Ok(Self { rows })
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn get(&self, y: usize, x: usize) -> Option<u8> {
        self.rows.get(y)?.get(x).copied()
    }

    pub fn rows(&self) -> &[Vec<u8>] {
        &self.rows
    }

    /// Flatten back to the row-major pixel sequence the frame arrived as.
    pub fn to_flat(&self) -> Vec<u8> {
        self.rows.iter().flatten().copied().collect()
    }
}

// =============================================================================
// Environment
// =============================================================================

#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Half-open range the per-step key-repeat count is drawn from. Each
    /// discrete decision holds the chosen keys for this many consecutive
    /// clicks, emulating variable human-like key-hold duration while the
    /// remote game advances continuously.
    pub key_repeat_range: Range<u32>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            key_repeat_range: 2..5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
    pub score: f64,
    pub total_reward: f64,
    pub info: HashMap<String, String>,
}

/// Episode controller over a remote QWOP instance. Two conceptual states:
/// reset (score tracker zeroed) and running; termination is signaled per-step
/// via the finished flag the remote reports with each frame.
///
/// Not safe for concurrent step/reset: `last_score` is per-episode mutable
/// state, which `&mut self` enforces at compile time.
pub struct QwopEnv<C: GameControl> {
    ctrl: C,
    last_score: f64,
    total_reward: f64,
    steps: u64,
    shape_warned: bool,
    rng: SmallRng,
    config: EnvConfig,
}

impl<C: GameControl> QwopEnv<C> {
    pub fn new(ctrl: C) -> Self {
        Self::with_config(ctrl, EnvConfig::default())
    }

    pub fn with_config(ctrl: C, config: EnvConfig) -> Self {
        Self {
            ctrl,
            last_score: 0.0,
            total_reward: 0.0,
            steps: 0,
            shape_warned: false,
            rng: SmallRng::from_os_rng(),
            config,
        }
    }

    /// Number of discrete actions.
    pub fn action_count(&self) -> usize {
        Action::COUNT
    }

    /// Declared observation-space shape `(height, width)`. This is a contract
    /// independent of the dimensions the remote actually reports; a mismatch
    /// is logged, not an error.
    pub fn observation_shape(&self) -> (usize, usize) {
        (OBS_HEIGHT, OBS_WIDTH)
    }

    /// Reseed the adapter's random source and return the seed used, so a run
    /// is reproducible given a fixed seed.
    pub fn seed(&mut self, seed: Option<u64>) -> u64 {
        let seed = seed.unwrap_or_else(|| rand::rng().random());
        self.rng = SmallRng::seed_from_u64(seed);
        seed
    }

    pub fn last_score(&self) -> f64 {
        self.last_score
    }

    pub fn total_reward(&self) -> f64 {
        self.total_reward
    }

    /// Restart the remote game and zero the score tracker. Callable at any
    /// time, including immediately after construction.
    pub fn reset(&mut self) -> Result<Observation> {
        self.ctrl.click(&Keys::restart())?;
        self.last_score = 0.0;
        self.total_reward = 0.0;
        self.steps = 0;
        self.shape_warned = false;
        let frame = self.ctrl.screen()?;
        self.observation(&frame)
    }

    /// Hold the action's keys for a randomly drawn number of consecutive
    /// clicks, accumulating the signed score delta as reward, then fetch the
    /// frame that becomes the observation.
    ///
    /// Any remote failure aborts immediately: no partial reward is returned
    /// and `last_score` stays at its last successfully observed value.
    pub fn step(&mut self, action: Action) -> Result<Step> {
        let keys = action.to_keys();
        let repeats = self.rng.random_range(self.config.key_repeat_range.clone());
        let mut reward = 0.0;
        for _ in 0..repeats {
            self.ctrl.click(&keys)?;
            let score = self.ctrl.score()?;
            reward += score - self.last_score;
            self.last_score = score;
        }

        let frame = self.ctrl.screen()?;
        let observation = self.observation(&frame)?;
        self.steps += 1;
        self.total_reward += reward;
        debug!(
            step = self.steps,
            action = action.label(),
            repeats,
            reward,
            score = self.last_score,
            done = frame.finished,
            "step"
        );

        Ok(Step {
            observation,
            reward,
            done: frame.finished,
            score: self.last_score,
            total_reward: self.total_reward,
            info: HashMap::new(),
        })
    }

    fn observation(&mut self, frame: &ScreenFrame) -> Result<Observation> {
        let actual = (frame.height as usize, frame.width as usize);
        if actual != (OBS_HEIGHT, OBS_WIDTH) && !self.shape_warned {
            warn!(
                declared = ?(OBS_HEIGHT, OBS_WIDTH),
                reported = ?actual,
                "remote frame shape differs from declared observation space"
            );
            self.shape_warned = true;
        }
        Observation::from_frame(frame)
    }
}
