#![deny(warnings)]

pub mod capture;
pub mod chat;
pub mod config;
pub mod decode;
pub mod emotion;
pub mod face;
pub mod history;
pub mod physiognomy;
pub mod playback;
pub mod session;
pub mod tts;
pub mod util;
