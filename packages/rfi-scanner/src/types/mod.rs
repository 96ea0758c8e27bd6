pub mod category;
pub mod classification;
pub mod config;
pub mod document;
pub mod job;
pub mod matching;
