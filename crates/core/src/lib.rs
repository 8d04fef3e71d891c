pub mod analysis;
pub mod audit;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod flows;

pub use analysis::{run_script, AnalysisError};
pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use dataset::{DatasetError, Datasets, Table};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    ActorKind, FlowEngine, NextHop, RouterFallbackPolicy, RoutingDecision, StepSignal,
};
