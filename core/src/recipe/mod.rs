//! Ready-made recipes for rules declared in `kiln.toml`.

pub mod command;
pub mod copy;
pub mod template;

pub use command::{execute_step, CommandRecipe, ExecutionResult};
pub use copy::{copy_file, CopyRecipe};
pub use template::{expand, regex_escape};
