//! Remote Job Executor and Remote I/O Transfer (§4.4, §4.5), both layered
//! on top of [`gateway_connector::Connector`].

mod executor;
mod parse;
mod transfer;

pub use executor::{clamp_process_forks, CheckStatePolicy, Executor, JobSpec};
pub use parse::{parse_state_line, parse_submit_output, ParsedState};
pub use transfer::{get_and_unpack_workspace, pack_and_put_workspace, put_batch_script};
