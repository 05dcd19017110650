pub mod bootstrap;
pub mod build;
pub mod cancel;
pub mod cli;
pub mod compile;
pub mod config;
pub mod dispatch;
pub mod env_override;
pub mod filter;
pub mod platform;
pub mod results;
pub mod toolchain;
