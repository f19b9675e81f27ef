pub mod check;
pub mod config_cmd;
pub mod watch;

pub use check::CheckCommand;
pub use config_cmd::ConfigCommand;
pub use watch::WatchCommand;
