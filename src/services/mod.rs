pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{
    AuthError, AuthService, CreatedUser, FirstLoginValidation, LoginResult, RegisterUser,
    ROLE_SUPERADMIN, ROLE_TECHADMIN, ROLE_USER, SessionUser, UserInfo,
};
pub use auth_service_impl::SeaOrmAuthService;

pub mod one_time_token_service;
pub use one_time_token_service::{OneTimeTokenError, OneTimeTokenManager};

pub mod mailer;
pub use mailer::{LogMailer, Mailer};
