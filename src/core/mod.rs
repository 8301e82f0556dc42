pub mod config;
pub mod error;
pub mod notice;
pub mod session;
pub mod story;
pub mod voice;
