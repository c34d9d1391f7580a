pub mod fleet;
pub mod mission;
pub mod node;
