#![deny(
    // The following are allowed by default lints according to
    // https://doc.rust-lang.org/rustc/lints/listing/allowed-by-default.html
    anonymous_parameters,
    bare_trait_objects,
    unstable_features,
    unused_extern_crates,
    unused_import_braces,
)]
#![warn(
    // elided_lifetimes_in_paths, // allow anonymous lifetime
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    single_use_lifetimes,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications,
    unused_results,
    clippy::all,
    clippy::pedantic,
)]
#![allow(
    // Some explicitly allowed Clippy lints, must have clear reason to allow
    clippy::implicit_return, // actually omitting the return keyword is idiomatic Rust code
    clippy::module_name_repetitions, // repeation of module name in a struct name is not big deal
    clippy::multiple_crate_versions, // multi-version dependency crates is not able to fix
    clippy::missing_errors_doc,
    clippy::wildcard_imports,
)]

//! An event-loop driver for hosts that speak the callback-registration dialect
//! (`add`/`del` interest, get a handle back) while every dispatch actually runs
//! on a single-threaded cooperative scheduler.
//!
//! ```no_run
//! use ripple_driver::{Callback, Config, Driver, Event, EventLoop, Handler};
//! use std::time::Duration;
//!
//! let driver = Driver::new(Config::default())?;
//! let _handle = driver.add(
//!     Event::Timer(Duration::from_secs(1)),
//!     Callback::from(Handler::sync(|fired| {
//!         println!("tick {}", fired.target());
//!         Ok(())
//!     })),
//!     Vec::new(),
//! )?;
//! driver.run();
//! # Ok::<(), std::io::Error>(())
//! ```

#[cfg(not(unix))]
compile_error!("ripple-driver only supports unix-like platforms");

#[allow(missing_docs)]
pub mod log;

/// Constants.
pub mod constants;

/// Common traits and impl.
pub mod common;

/// Driver configuration.
pub mod config;

/// Interest, key and handle types.
pub mod event;

/// Callback normalization.
pub mod callback;

/// Scheduler abstraction and impl.
pub mod scheduler;

/// Process identity and fork detection.
pub mod process;

/// Dispatch boundary and fatal stop.
pub mod dispatch;

mod registry;

mod timer;

mod signal;

/// The event-loop driver.
pub mod driver;

pub use callback::{Callback, CallbackFuture, Handler, Methods, Resolver};
pub use common::{Blocker, Named, SleepBlocker};
pub use config::Config;
pub use constants::DriverState;
pub use dispatch::{ProcessSupervisor, Supervisor};
pub use driver::{current, Driver, EventLoop};
pub use event::{Args, Event, Fired, Handle, Key, Kind, Target};
pub use process::{OsProcess, ProcessIdentity};
pub use scheduler::{Scheduler, TokioScheduler};
