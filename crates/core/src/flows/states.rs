use std::fmt;

use serde::{Deserialize, Serialize};

/// Participants of the analysis loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorKind {
    Router,
    Worker,
    ToolExecutor,
}

impl ActorKind {
    /// Name used in trace entries and log fields.
    pub fn trace_name(&self) -> &'static str {
        match self {
            Self::Router => "Router",
            Self::Worker => "Worker",
            Self::ToolExecutor => "Tool",
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.trace_name())
    }
}

/// What an actor invocation produced, as far as routing is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepSignal {
    Continue,
    Finish,
    ToolRequested,
    Answered,
    ToolCompleted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextHop {
    Actor(ActorKind),
    Terminal,
}

/// The Router's verdict. Closed: anything else the model says is a protocol violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutingDecision {
    Continue,
    Finish,
}

impl RoutingDecision {
    pub fn signal(&self) -> StepSignal {
        match self {
            Self::Continue => StepSignal::Continue,
            Self::Finish => StepSignal::Finish,
        }
    }

    /// Label written into the Router's control message.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Continue => "Worker",
            Self::Finish => "FINISH",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ActorKind,
    pub signal: StepSignal,
    pub to: NextHop,
}

impl TransitionOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self.to, NextHop::Terminal)
    }
}
