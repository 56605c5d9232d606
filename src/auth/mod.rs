pub mod lockout;
pub mod one_time;
pub mod password;
pub mod session;

pub use lockout::{LockoutPolicy, LockoutState};
pub use one_time::TokenPurpose;
pub use session::{SessionClaims, SessionCodec};
