pub mod alias;
pub mod command;
pub mod config;
pub mod errors;
pub mod matcher;
pub mod normalize;
pub mod repl;
pub mod report;
pub mod runner;
pub mod store;
pub mod supervisor;
pub mod voice;
