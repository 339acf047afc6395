pub mod config;
pub mod output;
pub mod parser;
pub mod resample;
pub mod stats;
pub mod summary;
pub mod table;
