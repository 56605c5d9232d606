pub mod one_time_tokens;
pub mod users;
