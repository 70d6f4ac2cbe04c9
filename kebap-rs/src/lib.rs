pub mod cli;
pub mod config;
pub mod formula;
pub mod script;

pub use formula::Formula;
pub use script::{ScriptError, ScriptResult, Value};
