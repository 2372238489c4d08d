pub mod bimap;
pub mod buffer;
pub mod qtable;
