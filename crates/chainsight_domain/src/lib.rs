mod config;
mod env;
mod error;
mod event;
mod tool_call;
mod tool_name;

pub use config::*;
pub use env::*;
pub use error::*;
pub use event::*;
pub use tool_call::*;
pub use tool_name::*;
