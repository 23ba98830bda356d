pub mod attendance;
pub mod backup;
pub mod classes;
pub mod core;
pub mod dashboard;
pub mod exams;
pub mod marks;
pub mod rankings;
pub mod settings;
pub mod students;
pub mod subjects;
pub mod teachers;
