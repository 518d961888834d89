pub mod commands;
pub mod health;
