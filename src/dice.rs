use rand::Rng;
use std::time::{
    Duration,
    Instant,
};

pub const DICE_COUNT: usize = 6;
pub const INITIAL_FACE: u8 = 1;

const MAX_FACE: u8 = 6;
const FAST_SPIN_INTERVAL: Duration = Duration::from_millis(75);
const SLOWDOWN_STEPS: u8 = 4;
const SLOWDOWN_BASE_INTERVAL: Duration = Duration::from_millis(100);
const SLOWDOWN_STEP_INCREMENT: Duration = Duration::from_millis(75);
const FINAL_HOLD: Duration = Duration::from_millis(500);

/// How often the run loop polls animators while any die is in motion.
pub const ANIMATION_POLL_INTERVAL: Duration = Duration::from_millis(25);

fn random_face() -> u8 {
    rand::rng().random_range(1..=MAX_FACE)
}

/// One die's animation timeline. There is at most one timer chain per die:
/// the phase value is the chain, and replacing it cancels whatever was
/// scheduled before.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Idle,
    FastSpin { next_tick: Instant },
    Slowing { step: u8, next_tick: Instant },
    Holding { until: Instant },
    Done,
}

/// What a `poll` call observed: whether the displayed face changed and
/// whether the animation finished (reported at most once per resolved roll).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TickOutcome {
    pub changed: bool,
    pub completed: bool,
}

impl TickOutcome {
    fn merge(self, other: TickOutcome) -> TickOutcome {
        TickOutcome {
            changed: self.changed || other.changed,
            completed: self.completed || other.completed,
        }
    }
}

pub struct DieAnimator {
    placeholder: u8,
    face: u8,
    target: Option<u8>,
    inputs: (bool, Option<u8>),
    phase: Phase,
}

impl DieAnimator {
    pub fn new(placeholder: u8) -> Self {
        Self {
            placeholder,
            face: placeholder,
            target: None,
            inputs: (false, None),
            phase: Phase::Idle,
        }
    }

    pub fn face(&self) -> u8 {
        self.face
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, Phase::Idle | Phase::Done)
    }

    /// Re-evaluates the animation regime. Identical inputs are a no-op so a
    /// redraw-driven caller does not restart the fast-spin chain every frame.
    pub fn set_inputs(&mut self, spinning: bool, target: Option<u8>, now: Instant) {
        if self.inputs == (spinning, target) {
            return;
        }
        let fast_spin_running = matches!(self.phase, Phase::FastSpin { .. });
        self.inputs = (spinning, target);
        self.target = target;

        if spinning && target.is_none() {
            self.face = random_face();
            self.phase = Phase::FastSpin {
                next_tick: now + FAST_SPIN_INTERVAL,
            };
        } else if let Some(value) = target {
            if spinning || fast_spin_running {
                self.phase = Phase::Slowing {
                    step: 0,
                    next_tick: now + SLOWDOWN_BASE_INTERVAL,
                };
            } else {
                // No spin to wind down; show the value directly.
                self.face = value;
                self.phase = Phase::Idle;
            }
        } else {
            self.face = self.placeholder;
            self.phase = Phase::Idle;
        }
    }

    /// Advances the timeline through every deadline at or before `now`.
    pub fn poll(&mut self, now: Instant) -> TickOutcome {
        let mut out = TickOutcome::default();
        loop {
            match self.phase {
                Phase::FastSpin { next_tick } if next_tick <= now => {
                    self.face = random_face();
                    out.changed = true;
                    self.phase = Phase::FastSpin {
                        next_tick: next_tick + FAST_SPIN_INTERVAL,
                    };
                }
                Phase::Slowing { step, next_tick } if next_tick <= now => {
                    if step < SLOWDOWN_STEPS {
                        self.face = random_face();
                        out.changed = true;
                        let step = step + 1;
                        let delay = SLOWDOWN_BASE_INTERVAL
                            + SLOWDOWN_STEP_INCREMENT * u32::from(step - 1);
                        self.phase = Phase::Slowing {
                            step,
                            next_tick: next_tick + delay,
                        };
                    } else {
                        self.face = self.target.unwrap_or(self.placeholder);
                        out.changed = true;
                        self.phase = Phase::Holding {
                            until: next_tick + FINAL_HOLD,
                        };
                    }
                }
                Phase::Holding { until } if until <= now => {
                    self.phase = Phase::Done;
                    out.completed = true;
                }
                _ => break,
            }
        }
        out
    }
}

/// The six dice of a game, synced as a unit from controller state.
pub struct DiceRow {
    dice: [DieAnimator; DICE_COUNT],
}

impl DiceRow {
    pub fn new(placeholder: u8) -> Self {
        Self {
            dice: std::array::from_fn(|_| DieAnimator::new(placeholder)),
        }
    }

    pub fn sync(&mut self, spinning: bool, targets: Option<[u8; DICE_COUNT]>, now: Instant) {
        for (i, die) in self.dice.iter_mut().enumerate() {
            die.set_inputs(spinning, targets.map(|t| t[i]), now);
        }
    }

    pub fn poll(&mut self, now: Instant) -> TickOutcome {
        self.dice
            .iter_mut()
            .map(|die| die.poll(now))
            .fold(TickOutcome::default(), TickOutcome::merge)
    }

    pub fn faces(&self) -> [u8; DICE_COUNT] {
        std::array::from_fn(|i| self.dice[i].face())
    }

    pub fn is_active(&self) -> bool {
        self.dice.iter().any(DieAnimator::is_active)
    }

    /// True once no die has an animation outstanding, i.e. the row shows its
    /// final values.
    pub fn settled(&self) -> bool {
        !self.is_active()
    }
}
