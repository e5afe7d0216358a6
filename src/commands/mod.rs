//! CLI command implementations

pub mod config_cmd;
pub mod down;
pub mod status;
pub mod up;
pub mod validate;
