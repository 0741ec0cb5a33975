//! # Parley Engine
//!
//! Runs command lines against a [`parley_registry::CommandRegistry`]:
//!
//! - **Dispatch**: placeholder substitution, filter chain, parameter parsing, handler invocation
//! - **Sessions**: per-thread or explicitly named variable pools and bounded history
//! - **Background tasks**: a fixed worker pool with per-task output capture
//! - **Configuration**: history size, worker count and failure detail, from JSON and environment
//!
//! ## Usage
//!
//! ```rust
//! use parley_engine::{Interpreter, InterpreterConfig};
//! use parley_types::{CommandDescriptor, DeclaredType, ParameterDescriptor};
//! use serde_json::json;
//!
//! let interpreter = Interpreter::builder(InterpreterConfig::default())
//!     .register(
//!         CommandDescriptor::command("add", |args| Ok(json!(args.int(0)? + args.int(1)?)))
//!             .param(ParameterDescriptor::positional("left", DeclaredType::Int))
//!             .param(ParameterDescriptor::positional("right", DeclaredType::Int)),
//!     )
//!     .build()?;
//!
//! let record = interpreter.execute("add 2 3").expect("non-blank line");
//! assert_eq!(record.result, json!(5));
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod config;
pub mod dispatch;
pub mod interpreter;
pub mod resolve;
pub mod session;
pub mod tasks;

pub use config::{InterpreterConfig, default_config_path};
pub use dispatch::{Dispatcher, Stage};
pub use interpreter::{Interpreter, InterpreterBuilder, SubmitError, WeakInterpreter};
pub use session::{HistoryQuery, SessionContext, SessionGuard, SessionKey, SessionManager, run_as};
pub use tasks::{OutputBuffer, TaskHandle, TaskIndex, TaskRunner, TaskStatus, TaskSummary};
