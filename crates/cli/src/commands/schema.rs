use vitalis_core::dataset::SCHEMA_CONTEXT;

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    CommandResult::raw(SCHEMA_CONTEXT.trim_end())
}
