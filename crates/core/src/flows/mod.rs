pub mod engine;
pub mod states;

pub use engine::{
    AnalysisFlow, FlowDefinition, FlowEngine, FlowTransitionError, RouterFallbackPolicy,
    ANALYSIS_TRANSITIONS,
};
pub use states::{ActorKind, NextHop, RoutingDecision, StepSignal, TransitionOutcome};
