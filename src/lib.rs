pub mod config;
pub mod fetch;
pub mod generate;
pub mod package;
pub mod run;
pub mod series;
pub mod source;
