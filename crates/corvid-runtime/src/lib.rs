//! The message-loop daemon (`Worker`), the start/shutdown + request-reply
//! service abstraction (`Actor`/`ActorWorker`), and a shared-queue worker
//! pool, all layered on `corvid-core`'s signal/status/queue primitives.

pub mod actor;
pub mod pool;
pub mod worker;

pub use actor::{Actor, ActorWorker};
pub use pool::{SocketThreadPool, ThreadPool};
pub use worker::{Worker, WorkerImpl, WorkerParams};
