//! linkback command-line front end

pub mod cmd;
pub mod config;
pub mod locks;
pub mod logging;
pub mod progress;
pub mod util;
