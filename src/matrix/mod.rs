pub mod expr;
pub mod matrix;
