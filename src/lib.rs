pub mod broadcast;
pub mod cli;
pub mod error;
pub mod node;
pub mod settings;
