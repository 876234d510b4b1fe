pub mod agent_event;
pub mod call_agent;

pub use agent_event::AgentEvent;
pub use call_agent::CallAgent;
