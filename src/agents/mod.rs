// Rocket agents
//
// Workers that pull capture tasks from the shared work queue one at a time,
// plus the registry the HTTP layer spawns and stops them through.

pub mod chance;
pub mod errors;
pub mod registry;
pub mod state;
pub mod worker;

pub use chance::{Chance, ScriptedChance, ThreadChance};
pub use errors::{AgentError, AgentResult};
pub use registry::AgentRegistry;
pub use state::AgentState;
pub use worker::{AgentContext, AgentSettings, AgentSnapshot, RocketAgent, AGENT_LOG};
