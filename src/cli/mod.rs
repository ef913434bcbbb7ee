mod args;

pub use args::{Cli, LogFormat, LogLevel};
