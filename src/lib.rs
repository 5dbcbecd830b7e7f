pub mod certificate;
pub mod config;
pub mod conflict;
pub mod database;
pub mod error;
pub mod inventory;
pub mod ipc;  // 로컬 제어 API
pub mod launcher;
pub mod orchestrator;
pub mod process_monitor;
pub mod settings;
pub mod state;
pub mod supervisor;
pub mod utils;

pub use launcher::{Launcher, LauncherStatus};
