//! Temporal fall confirmation.
//!
//! Converts the noisy per-frame "actually fallen" verdict into a single
//! confirmation once the verdict has held continuously for the sustain
//! duration. Any frame with a negative verdict resets the timer; there is no
//! flicker tolerance.

use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmState {
    Idle,
    Suspect { onset: Instant },
}

/// Emitted on the frame a sustained episode is confirmed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub onset: Instant,
    pub confirmed_at: Instant,
}

impl Confirmation {
    pub fn elapsed(&self) -> Duration {
        self.confirmed_at.saturating_duration_since(self.onset)
    }
}

/// Serializable view of the confirmer for status reporting.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfirmSnapshot {
    pub state: &'static str,
    pub elapsed_secs: Option<f64>,
    pub sustain_secs: f64,
}

#[derive(Debug)]
pub struct FallConfirmer {
    sustain: Duration,
    state: ConfirmState,
}

impl FallConfirmer {
    pub fn new(sustain: Duration) -> Self {
        Self {
            sustain,
            state: ConfirmState::Idle,
        }
    }

    pub fn sustain(&self) -> Duration {
        self.sustain
    }

    pub fn state(&self) -> ConfirmState {
        self.state
    }

    pub fn onset(&self) -> Option<Instant> {
        match self.state {
            ConfirmState::Idle => None,
            ConfirmState::Suspect { onset } => Some(onset),
        }
    }

    /// Time since onset, or `None` while idle.
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.onset()
            .map(|onset| now.saturating_duration_since(onset))
    }

    pub fn reset(&mut self) {
        self.state = ConfirmState::Idle;
    }

    /// Feed one frame's verdict observed at `now`.
    ///
    /// Returns a confirmation on the frame where the unbroken run of positive
    /// verdicts first reaches the sustain duration, then returns to idle.
    pub fn update(&mut self, actually_fallen: bool, now: Instant) -> Option<Confirmation> {
        if !actually_fallen {
            if let ConfirmState::Suspect { onset } = self.state {
                log::debug!(
                    "fall suspicion cleared after {:.2}s",
                    now.saturating_duration_since(onset).as_secs_f64()
                );
            }
            self.state = ConfirmState::Idle;
            return None;
        }

        let onset = match self.state {
            ConfirmState::Idle => {
                log::info!("unsupported lying person: confirming for {:?}", self.sustain);
                self.state = ConfirmState::Suspect { onset: now };
                now
            }
            ConfirmState::Suspect { onset } => onset,
        };

        if now.saturating_duration_since(onset) >= self.sustain {
            self.state = ConfirmState::Idle;
            return Some(Confirmation {
                onset,
                confirmed_at: now,
            });
        }
        None
    }

    pub fn snapshot(&self, now: Instant) -> ConfirmSnapshot {
        ConfirmSnapshot {
            state: match self.state {
                ConfirmState::Idle => "idle",
                ConfirmState::Suspect { .. } => "suspect",
            },
            elapsed_secs: self.elapsed(now).map(|d| d.as_secs_f64()),
            sustain_secs: self.sustain.as_secs_f64(),
        }
    }
}

impl Default for FallConfirmer {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
