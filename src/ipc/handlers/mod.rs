pub mod core;
pub mod fees;
pub mod halqas;
pub mod progress;
pub mod students;
pub mod teachers;
pub mod withdrawals;
