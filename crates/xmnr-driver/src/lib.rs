//! Test-driver supervision for the xmnr configuration test harness.
//!
//! Long-running xmnr operations are delegated to an external driver program.
//! This crate starts that program as a child process, hands it a single
//! [`DriverRequest`] over a Unix socket, and reads back the
//! [`DriverEvent`]s it produces until it exits.
//!
//! # Architecture
//!
//! - [`process`] owns the child: process group, socket pair, stderr capture,
//!   and the `SIGTERM`-then-`SIGKILL` termination sequence.
//! - [`channel`] reassembles newline-delimited JSON messages from chunked,
//!   possibly partial reads, and never blocks for longer than the socket's
//!   read timeout.
//! - [`abort`] is the flag through which a concurrent caller asks a running
//!   operation to stop. The supervisor checks it once per poll interval.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use xmnr_driver::{AbortFlag, DriverEvent, DriverProcess, DriverRequest, LaunchSpec, Received};
//!
//! let spec = LaunchSpec::new("/usr/libexec/xmnr-driver", "/var/lib/xmnr/ios0/test")
//!     .with_poll_interval(Duration::from_millis(100));
//! let mut driver = DriverProcess::spawn(&spec)?;
//! driver.send(&DriverRequest::new("walk-states", "ios0"))?;
//! loop {
//!     match driver.receive::<DriverEvent>()? {
//!         Received::Message(event) => println!("{event:?}"),
//!         Received::Idle => continue,
//!         Received::Closed => break,
//!     }
//! }
//! let outcome = driver.wait(&AbortFlag::new())?;
//! # let _ = outcome;
//! # Ok::<(), xmnr_driver::DriverError>(())
//! ```

pub mod abort;
pub mod channel;
pub mod error;
pub mod process;
pub mod protocol;

pub use self::abort::AbortFlag;
pub use self::channel::{MessageChannel, Received};
pub use self::error::DriverError;
pub use self::process::{DriverProcess, ExitOutcome, LaunchSpec};
pub use self::protocol::{DriverEvent, DriverRequest};
