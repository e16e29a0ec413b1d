//! Facade crate re-exporting the runtime's split crates under one name:
//! value types and `Status`/`Signal` primitives (`corvid-core`), the
//! NetData wire codec (`corvid-codec`), the actor/worker/thread-pool
//! runtime (`corvid-runtime`), the TCP transport layer (`corvid-net`), and
//! assorted support utilities (`corvid-utils`).

pub use corvid_codec as codec;
pub use corvid_core as core;
pub use corvid_net as net;
pub use corvid_runtime as runtime;
pub use corvid_utils as utils;
pub use tracing;
