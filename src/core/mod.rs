//! 核心协同层：参与者目录、会话模型、评分、会话注册表与协同引擎

pub mod actor;
pub mod builder;
pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod registry;
pub mod scorer;
pub mod session;
pub mod shutdown;

pub use actor::{ActorDirectory, ActorId, ActorRole};
pub use builder::EngineBuilder;
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{CoordinationEngine, EngineSettings};
pub use error::{CoordinationError, Result};
pub use events::{CoordinationEvent, EventDetails, EventFeed};
pub use registry::{SessionHandle, SessionRegistry};
pub use session::{
    Decision, DecisionInput, DecisionStatus, DecisionType, FinalMetrics, Message, MessageStatus,
    MessageType, Session, SessionId, SessionMetrics, SessionStatus, SessionSummary, Task,
    TaskInput, TaskMetadata, TaskStatus,
};
pub use shutdown::{ShutdownManager, ShutdownReason};
