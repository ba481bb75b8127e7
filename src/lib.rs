pub mod api;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod events;     // Observer registry behind every contract handle
pub mod paging;
pub mod providers;
pub mod reload;
pub mod settings;
pub mod utils;
pub mod value;
pub mod wallet;
