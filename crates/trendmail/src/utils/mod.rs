pub mod date;
pub mod hash;
