//! Interactive terminal chat: slash commands, message rendering and the
//! input/update loop. Entry point: [`loop_runner::run_chat_loop`].

pub mod commands;
pub mod loop_runner;
pub mod render;
