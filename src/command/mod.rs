//! Custom commands: records, the template wrapper, the security scanner,
//! the guard evaluator and the authoring service.

pub mod guard;
pub mod scanner;
pub mod service;
pub mod template;
pub mod types;

pub use scanner::{scan, ScanReport};
pub use service::{check_snippet, CheckReport, CommandService, NewCommand, Requester};
pub use types::{CommandRecord, Gates, Shape, TriggerType};
