//! Integration test common infrastructure.
//!
//! Provides a scripted IRC server to accept the bot, and a way to spawn
//! the `sopel` binary against it.

pub mod bot;
pub mod server;

#[allow(unused_imports)]
pub use bot::TestBot;
#[allow(unused_imports)]
pub use server::{FakeServer, ServerConnection};
