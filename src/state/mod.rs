//! Participant and fleet state model.
//!
//! Participant states form a total order. The fleet ("system") state is the
//! lowest contributing participant state plus a flag telling whether every
//! contributing participant agrees on it.

use std::fmt;

/// State of one participant's state machine as seen by the control plane.
///
/// Variant order is the aggregation order: the derived `Ord` is what
/// [`aggregate`] and [`next_transition`] compare against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParticipantState {
    /// The participant answered with a state name the control plane does not know.
    #[default]
    Undefined,
    /// No state machine could be reached.
    Unreachable,
    Unloaded,
    Loaded,
    Initialized,
    Paused,
    Running,
}

impl ParticipantState {
    /// Every state, lowest first.
    pub const ALL: [ParticipantState; 7] = [
        ParticipantState::Undefined,
        ParticipantState::Unreachable,
        ParticipantState::Unloaded,
        ParticipantState::Loaded,
        ParticipantState::Initialized,
        ParticipantState::Paused,
        ParticipantState::Running,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantState::Undefined => "undefined",
            ParticipantState::Unreachable => "unreachable",
            ParticipantState::Unloaded => "unloaded",
            ParticipantState::Loaded => "loaded",
            ParticipantState::Initialized => "initialized",
            ParticipantState::Paused => "paused",
            ParticipantState::Running => "running",
        }
    }

    /// Map a state name reported by a remote state machine.
    ///
    /// Names the control plane does not know map to `Undefined`.
    pub fn from_remote_name(name: &str) -> Self {
        match name {
            "Unloaded" => ParticipantState::Unloaded,
            "Loaded" => ParticipantState::Loaded,
            "Initialized" => ParticipantState::Initialized,
            "Paused" => ParticipantState::Paused,
            "Running" => ParticipantState::Running,
            _ => ParticipantState::Undefined,
        }
    }

    /// The name a remote state machine uses for this state, if it has one.
    pub fn remote_name(&self) -> Option<&'static str> {
        match self {
            ParticipantState::Unloaded => Some("Unloaded"),
            ParticipantState::Loaded => Some("Loaded"),
            ParticipantState::Initialized => Some("Initialized"),
            ParticipantState::Paused => Some("Paused"),
            ParticipantState::Running => Some("Running"),
            ParticipantState::Undefined | ParticipantState::Unreachable => None,
        }
    }

    /// States a fleet can be driven to.
    pub fn is_settable(&self) -> bool {
        !matches!(
            self,
            ParticipantState::Undefined | ParticipantState::Unreachable
        )
    }
}

impl fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated state of a whole fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemState {
    /// True iff every contributing participant reported the same state.
    pub homogeneous: bool,
    /// Lowest contributing participant state.
    pub state: ParticipantState,
}

impl SystemState {
    pub fn new(homogeneous: bool, state: ParticipantState) -> Self {
        Self { homogeneous, state }
    }
}

impl Default for SystemState {
    fn default() -> Self {
        Self::new(true, ParticipantState::Undefined)
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.homogeneous {
            write!(f, "{}", self.state)
        } else {
            write!(f, "{} (non-homogeneous)", self.state)
        }
    }
}

/// Aggregate participant states into one fleet state.
///
/// `Undefined` entries do not contribute. A fleet with no contributing entry
/// (including an empty fleet) aggregates to `{homogeneous: true, Undefined}`.
pub fn aggregate<I>(states: I) -> SystemState
where
    I: IntoIterator<Item = ParticipantState>,
{
    let mut lowest = ParticipantState::Running;
    let mut homogeneous = true;
    let mut contributed = false;

    for state in states {
        if state == ParticipantState::Undefined {
            continue;
        }
        if contributed && state != lowest {
            homogeneous = false;
        }
        if state < lowest {
            lowest = state;
        }
        contributed = true;
    }

    if contributed {
        SystemState::new(homogeneous, lowest)
    } else {
        SystemState::default()
    }
}

/// Which participant priority orders a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriorityKind {
    Init,
    Start,
}

/// Direction of a fleet walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Highest priority first; insertion order reversed within a priority.
    Ascending,
    /// Lowest priority first; insertion order kept within a priority.
    Descending,
}

/// One edge of the participant state machine, issued fleet-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Load,
    Unload,
    Initialize,
    Deinitialize,
    Start,
    Pause,
    Stop,
    Shutdown,
}

impl Transition {
    /// Remote state machine method name.
    pub fn method(&self) -> &'static str {
        match self {
            Transition::Load => "load",
            Transition::Unload => "unload",
            Transition::Initialize => "initialize",
            Transition::Deinitialize => "deinitialize",
            Transition::Start => "start",
            Transition::Pause => "pause",
            Transition::Stop => "stop",
            Transition::Shutdown => "exit",
        }
    }

    /// Verb used in timeout diagnostics ("timeout while loading: ...").
    pub fn progressive(&self) -> &'static str {
        match self {
            Transition::Load => "loading",
            Transition::Unload => "unloading",
            Transition::Initialize => "initializing",
            Transition::Deinitialize => "deinitializing",
            Transition::Start => "starting",
            Transition::Pause => "pausing",
            Transition::Stop => "stopping",
            Transition::Shutdown => "shutting down",
        }
    }

    /// Verb used in success messages ("system loaded successfully").
    pub fn past_tense(&self) -> &'static str {
        match self {
            Transition::Load => "loaded",
            Transition::Unload => "unloaded",
            Transition::Initialize => "initialized",
            Transition::Deinitialize => "deinitialized",
            Transition::Start => "started",
            Transition::Pause => "paused",
            Transition::Stop => "stopped",
            Transition::Shutdown => "shut down",
        }
    }

    /// Fleet walk order, or `None` for insertion order (shutdown).
    pub fn ordering(&self) -> Option<(Direction, PriorityKind)> {
        match self {
            Transition::Load | Transition::Initialize => {
                Some((Direction::Ascending, PriorityKind::Init))
            }
            Transition::Start | Transition::Pause => {
                Some((Direction::Ascending, PriorityKind::Start))
            }
            Transition::Unload | Transition::Deinitialize => {
                Some((Direction::Descending, PriorityKind::Init))
            }
            Transition::Stop => Some((Direction::Descending, PriorityKind::Start)),
            Transition::Shutdown => None,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::Shutdown => "shutdown",
            other => other.method(),
        };
        f.write_str(name)
    }
}

/// The single state machine edge that moves `current` one step toward `target`.
///
/// Returns `None` when no edge applies (already there, or one side is not a
/// settable state).
pub fn next_transition(
    current: ParticipantState,
    target: ParticipantState,
) -> Option<Transition> {
    use ParticipantState as S;

    if !current.is_settable() || !target.is_settable() {
        return None;
    }

    if current > target {
        match current {
            S::Running if target == S::Paused => Some(Transition::Pause),
            S::Running | S::Paused => Some(Transition::Stop),
            S::Initialized => Some(Transition::Deinitialize),
            S::Loaded => Some(Transition::Unload),
            _ => None,
        }
    } else if current < target {
        match current {
            S::Unloaded => Some(Transition::Load),
            S::Loaded => Some(Transition::Initialize),
            S::Initialized if target == S::Paused => Some(Transition::Pause),
            S::Initialized | S::Paused => Some(Transition::Start),
            _ => None,
        }
    } else {
        None
    }
}
