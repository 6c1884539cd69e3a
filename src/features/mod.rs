pub mod auth;
pub mod tests;
