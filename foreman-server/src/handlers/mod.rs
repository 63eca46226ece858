pub mod browse;
pub mod counter;
pub mod health;
pub mod repos;
