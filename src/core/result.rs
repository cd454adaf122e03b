//! Outcome of a node's finalize phase.

use super::domain::Domain;

/// Status of a state result, without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Transition,
    Terminal,
    Waiting,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transition => write!(f, "transition"),
            Self::Terminal => write!(f, "terminal"),
            Self::Waiting => write!(f, "waiting"),
        }
    }
}

/// Result of a node's finalize phase.
///
/// This is the sole mechanism by which the driver advances.
#[derive(Clone, Debug, PartialEq)]
pub enum StateResult<D: Domain> {
    /// Move to another state and keep going
    Transition {
        to: D::State,
        actions: Vec<D::Event>,
    },

    /// The automaton is finished
    Terminal { actions: Vec<D::Event> },

    /// Stop advancing until new events arrive
    Waiting { actions: Vec<D::Event> },
}

impl<D: Domain> StateResult<D> {
    pub fn transition(to: D::State) -> Self {
        Self::Transition {
            to,
            actions: Vec::new(),
        }
    }

    pub fn terminal() -> Self {
        Self::Terminal {
            actions: Vec::new(),
        }
    }

    pub fn waiting() -> Self {
        Self::Waiting {
            actions: Vec::new(),
        }
    }

    /// Attach outgoing actions to this result.
    pub fn with_actions(self, actions: Vec<D::Event>) -> Self {
        match self {
            Self::Transition { to, .. } => Self::Transition { to, actions },
            Self::Terminal { .. } => Self::Terminal { actions },
            Self::Waiting { .. } => Self::Waiting { actions },
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Transition { .. } => Status::Transition,
            Self::Terminal { .. } => Status::Terminal,
            Self::Waiting { .. } => Status::Waiting,
        }
    }

    pub fn actions(&self) -> &[D::Event] {
        match self {
            Self::Transition { actions, .. }
            | Self::Terminal { actions }
            | Self::Waiting { actions } => actions,
        }
    }

    pub fn into_actions(self) -> Vec<D::Event> {
        match self {
            Self::Transition { actions, .. }
            | Self::Terminal { actions }
            | Self::Waiting { actions } => actions,
        }
    }
}
