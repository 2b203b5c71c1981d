//! Pomodoro session engine with a live server sync channel.

pub mod app;
pub mod channel;
pub mod clock;
pub mod config;
pub mod credential;
pub mod engine;
pub mod ipc;
pub mod notify;
pub mod persistence;
pub mod session;
pub mod settings;
pub mod ui;
