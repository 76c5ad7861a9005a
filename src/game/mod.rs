pub mod constants;
pub mod state;
pub mod battle;
pub mod upgrade;
pub mod registry;
pub mod tick;
