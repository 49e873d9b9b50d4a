pub mod compare;
pub mod domain;
pub mod runner;
pub mod scenario;
pub mod suite;
