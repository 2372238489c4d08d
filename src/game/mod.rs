pub mod action;
pub mod role;
pub mod strategy;
pub mod transition;
