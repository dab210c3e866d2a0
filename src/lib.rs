pub mod artifact;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod state;
pub mod ui;
pub mod units;
pub mod wallet;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;

pub use client::AppController;
pub use config::AppConfig;
pub use error::BankError;
pub use gateway::{
    BankCall,
    BankGateway,
    Friend,
};
