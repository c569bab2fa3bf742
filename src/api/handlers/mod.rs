pub mod files;
pub mod health;
pub mod system;
pub mod ui;
