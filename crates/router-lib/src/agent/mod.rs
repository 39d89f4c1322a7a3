//! Agent lifecycle: probing backends, bootstrapping and publishing an
//! agent, and serving requests against the published generation.

mod bootstrap;
mod executor;
mod handle;
mod probe;


pub use bootstrap::{
    AgentFactory, AgentSlot, BootstrapConfig, BootstrapOrchestrator, HttpAgentFactory,
    ModelSettings,
};
pub use executor::{Outcome, RequestExecutor, INITIALIZING_MESSAGE};
pub use handle::{AgentHandle, DEFAULT_MAX_STEPS};
pub use probe::{EndpointReport, EndpointState, ProbeConfig, ProbeFailure, ReadinessProbe};
