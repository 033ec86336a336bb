//! pppd invocation, process control and output streaming.

mod codes;
mod process;
mod stream;

pub use codes::*;
pub use process::*;
pub use stream::*;
