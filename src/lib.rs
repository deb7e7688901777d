pub mod config;
pub mod db;
pub mod error;
pub mod geometry;
pub mod report;
pub mod transfer;

pub use config::Config;
pub use error::{Result, TransferError};
