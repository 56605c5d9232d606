mod create_user;
mod info;
mod unlock;

pub use create_user::cmd_create_user;
pub use info::cmd_user_info;
pub use unlock::cmd_unlock_user;
