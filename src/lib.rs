//! Typing-game autopilot: screenshot the game, ask a vision model which
//! words to type, and type them into the game window.

pub mod automation;
pub mod capture;
pub mod config;
#[cfg(feature = "desktop")]
pub mod desktop;
pub mod planner;
pub mod typing;
pub mod window;
