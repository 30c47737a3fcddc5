//! payload-services — link transport, command queue and the payload
//! controller that executes queued tasks.

pub mod command_queue;
pub mod context;
pub mod controller;
pub mod handlers;
pub mod link;
pub mod registry;
pub mod serial;
pub mod task;
pub mod transport;

pub use command_queue::{CommandQueue, QueuedTask};
pub use context::{ControllerError, MissionClock, PayloadContext};
pub use controller::{ControllerConfig, NoopStartup, PayloadController, StartupHooks};
pub use link::{Link, LinkError};
pub use registry::{handler_fn, TaskHandler, TaskRegistry};
pub use task::{Task, TaskError, MAX_ATTEMPTS};
pub use transport::{Transport, TransportConfig, TransportError};
