//! Process exit codes shared by all subcommands.

pub const SUCCESS: i32 = 0;
/// Bad arguments, configuration or input paths
pub const INPUT_ERROR: i32 = 1;
/// Analysis or output failed
pub const EXECUTION_ERROR: i32 = 2;
/// Some subjects were skipped, others produced rows
pub const PARTIAL_FAILURE: i32 = 3;
