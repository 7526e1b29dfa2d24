pub mod admin;
pub mod affiliate;
pub mod backup;
pub mod blog;
pub mod catalog;
pub mod comparator;
pub mod config;
pub mod error;
pub mod fire;
pub mod format;
pub mod logging;
pub mod market;
pub mod portfolio;
pub mod seo;
pub mod server;
pub mod simulator;
pub mod storage;
pub mod watchlist;
