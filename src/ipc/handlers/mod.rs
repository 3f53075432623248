pub mod assignments;
pub mod backup_exchange;
pub mod cells;
pub mod core;
pub mod grades;
pub mod notebooks;
pub mod stats;
pub mod students;
pub mod submissions;
