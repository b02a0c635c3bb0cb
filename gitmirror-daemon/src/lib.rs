//! Process runtime for gitmirror: the sync supervisor, the status socket and
//! tracing setup.

mod error;
pub mod protocol;
mod runtime;
pub mod server;
pub mod supervisor;

pub use error::DaemonError;
pub use protocol::{
    request_health, request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{init_tracing, run, start_blocking, Exit};
pub use supervisor::SyncSupervisor;
