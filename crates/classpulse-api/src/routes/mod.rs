pub mod polls;
pub mod students;
