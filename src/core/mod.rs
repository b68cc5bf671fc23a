pub mod config;
pub mod io;
pub mod preferences;
pub mod state;
