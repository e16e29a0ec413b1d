//! Foundational value types shared by every component of the runtime: the
//! `Status`/`Error::Kind` taxonomy, the one-shot `Signal` latch, the
//! blocking `SafeQueue`, the seekable `MemFile` buffer, and the dynamically
//! typed message/payload carriers used by the worker runtime.

pub mod memfile;
pub mod message;
pub mod queue;
pub mod signal;
pub mod status;

pub use memfile::{Blob, Bytes, MemFile, Whence};
pub use message::{Message, Reply, Request, is_null, nullmsg};
pub use queue::SafeQueue;
pub use signal::{OnExit, Signal};
pub use status::{Kind, Status, UNSPECIFIED};
