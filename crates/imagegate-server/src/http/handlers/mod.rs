pub mod gallery;
pub mod generate;
pub mod health;
pub mod models;
pub mod prompt;
