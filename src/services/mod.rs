pub mod board;
pub mod config_loader;
pub mod poll_loop;
pub mod roster;
pub mod runtime_log;
pub mod score_source;
pub mod scoring;
