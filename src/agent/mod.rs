pub mod player;
pub mod policy;
pub mod tables;
