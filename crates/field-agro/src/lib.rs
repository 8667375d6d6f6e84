pub mod gdd;
pub mod health;
