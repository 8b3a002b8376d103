pub mod dashboard;
pub mod deploy;
pub mod emit;
