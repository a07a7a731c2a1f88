pub mod commands;
pub mod host;
pub mod stats;
pub mod status;
