pub mod command;
pub mod compare;
pub mod config;
pub mod convert;
pub mod noise;
pub mod output;
pub mod progress;
pub mod scan;
