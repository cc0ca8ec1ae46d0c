//! Multi-language semantic input-tracer: discovers untrusted input sources
//! and traces their flow through a codebase via static analysis over
//! tree-sitter syntax trees.

pub mod cache;
pub mod carriers;
pub mod cli;
pub mod config;
pub mod error;
pub mod expander;
pub mod flow;
pub mod logging;
pub mod output;
pub mod parsing;
pub mod symbol;
pub mod tracer;
pub mod types;

pub use config::{Settings, TraceOptions};
pub use error::{TraceError, TraceResult};
pub use tracer::{TraceRun, Tracer};
