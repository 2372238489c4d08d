pub mod census;
pub mod fermi;
pub mod population;
pub mod qlearning;
