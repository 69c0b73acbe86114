mod not_found;

pub use not_found::{error_response, not_found_handler};
