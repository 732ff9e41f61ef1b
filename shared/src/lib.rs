pub mod config;
pub mod history;
pub mod types;
pub mod wav;

pub use config::*;
pub use history::*;
pub use types::*;
pub use wav::*;
