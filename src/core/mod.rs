pub mod asset;
pub mod cache;
pub mod config;
pub mod features;
pub mod report;
pub mod scanner;
pub mod search;
pub mod similarity;
pub mod usage;
pub mod verbosity;
