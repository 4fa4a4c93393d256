//! Jump-host-tunnelled SSH/SFTP connector to the HPC cluster front-end
//! (§4.3). `gateway-remote` is the only consumer: it calls [`Connector::exec`]
//! to submit and poll batch jobs and [`Connector::sftp`] to stage workspaces.

mod handler;
mod ops;
mod pairs;
mod session;

pub use ops::RemoteOps;
pub use pairs::PairSequence;
pub use session::{CommandOutput, Connector};
