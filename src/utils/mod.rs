pub mod sanitize;
pub mod time;
pub mod upload;
