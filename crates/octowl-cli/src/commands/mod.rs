pub mod dump;
pub mod list;
