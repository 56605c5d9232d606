use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use std::fmt;

/// Flow a one-time token may be consumed by. A token issued for one purpose
/// is never accepted by another purpose's flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenPurpose {
    FirstLogin,
    PasswordReset,
}

impl TokenPurpose {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstLogin => "FIRST_LOGIN",
            Self::PasswordReset => "PASSWORD_RESET",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FIRST_LOGIN" => Some(Self::FirstLogin),
            "PASSWORD_RESET" => Some(Self::PasswordReset),
            _ => None,
        }
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a token value with 256 bits of entropy, encoded URL-safe with
/// no padding so it can ride in a query parameter unescaped.
#[must_use]
pub fn generate_token_value() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    URL_SAFE_NO_PAD.encode(bytes)
}
