//! Service-level tests for the login, first-login, and lockout flows,
//! exercising the auth service directly without the HTTP layer.

use std::sync::{Arc, Mutex};

use chrono::Duration;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};

use gatehouse::auth::TokenPurpose;
use gatehouse::config::Config;
use gatehouse::db::Store;
use gatehouse::entities::users;
use gatehouse::services::{
    AuthError, AuthService, Mailer, OneTimeTokenError, OneTimeTokenManager, RegisterUser,
};
use gatehouse::state::SharedState;

const ADMIN_TEMP_PASSWORD: &str = "password";
const STRONG_PASSWORD: &str = "NewSecure@Pass1";
const OTHER_PASSWORD: &str = "Another$ecret9";

struct CapturingMailer {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl CapturingMailer {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    fn links(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, link)| link.clone())
            .collect()
    }

    fn tokens(&self) -> Vec<String> {
        self.links()
            .iter()
            .filter_map(|link| link.split("token=").nth(1).map(ToString::to_string))
            .collect()
    }
}

#[async_trait::async_trait]
impl Mailer for CapturingMailer {
    async fn send_first_login_email(
        &self,
        username: &str,
        email: &str,
        link: &str,
    ) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((
            username.to_string(),
            email.to_string(),
            link.to_string(),
        ));
        Ok(())
    }
}

fn test_config() -> Config {
    let db_path =
        std::env::temp_dir().join(format!("gatehouse-flow-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.security.argon2_memory_cost_kib = 8192;
    config.security.argon2_time_cost = 1;
    config
}

async fn spawn_service() -> (SharedState, Arc<CapturingMailer>) {
    let mailer = Arc::new(CapturingMailer::new());
    let shared = SharedState::with_mailer(test_config(), mailer.clone())
        .await
        .expect("Failed to create shared state");
    (shared, mailer)
}

async fn test_store() -> Store {
    let db_path =
        std::env::temp_dir().join(format!("gatehouse-flow-test-{}.db", uuid::Uuid::new_v4()));
    Store::with_pool_options(&format!("sqlite:{}", db_path.display()), 5, 1)
        .await
        .expect("Failed to create store")
}

async fn admin_id(store: &Store) -> i32 {
    store
        .get_user_by_username("admin")
        .await
        .unwrap()
        .expect("seeded admin missing")
        .id
}

#[tokio::test]
async fn test_bootstrap_first_login_end_to_end() {
    let (shared, mailer) = spawn_service().await;

    // Startup mailed exactly one first-login link for the seeded admin.
    let links = mailer.links();
    assert_eq!(links.len(), 1);
    assert!(links[0].starts_with(&shared.config.email.frontend_base_url));
    assert!(links[0].contains("/first-login?token="));

    let token = mailer.tokens().remove(0);

    let validation = shared.auth.validate_first_login_token(&token).await.unwrap();
    assert_eq!(validation.username, "admin");
    assert_eq!(validation.email, "admin@example.com");

    let result = shared
        .auth
        .set_password_with_first_login_token(&token, STRONG_PASSWORD, STRONG_PASSWORD)
        .await
        .unwrap();
    assert_eq!(result.username, "admin");
    assert!(!result.must_change_password);

    // The flow minted a working session.
    let session = shared
        .auth
        .authenticate(&format!("Bearer {}", result.token))
        .await
        .unwrap();
    assert_eq!(session.username, "admin");
    assert_eq!(session.roles, vec!["TECHADMIN".to_string()]);

    // The token is burned for both probing and reuse.
    let err = shared
        .auth
        .validate_first_login_token(&token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::OneTimeTokenInvalid));

    let err = shared
        .auth
        .set_password_with_first_login_token(&token, OTHER_PASSWORD, OTHER_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::OneTimeTokenInvalid));

    // The temporary password no longer works, the chosen one does.
    let err = shared
        .auth
        .login("admin", ADMIN_TEMP_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::BadCredentials));

    shared.auth.login("admin", STRONG_PASSWORD).await.unwrap();

    let info = shared.auth.user_info("admin").await.unwrap();
    assert!(!info.must_change_password);
    assert!(!info.temporary_password);
}

#[tokio::test]
async fn test_bootstrap_links_issue_once() {
    let mailer_a = Arc::new(CapturingMailer::new());
    let config = test_config();
    SharedState::with_mailer(config.clone(), mailer_a.clone())
        .await
        .unwrap();
    assert_eq!(mailer_a.links().len(), 1);

    // A restart over the same database must not mail a second link.
    let mailer_b = Arc::new(CapturingMailer::new());
    SharedState::with_mailer(config, mailer_b.clone())
        .await
        .unwrap();
    assert!(mailer_b.links().is_empty());
}

#[tokio::test]
async fn test_reissue_invalidates_prior_token() {
    let store = test_store().await;
    let user_id = admin_id(&store).await;
    let manager = OneTimeTokenManager::new(None);

    let first = manager
        .issue(&store.conn, user_id, TokenPurpose::FirstLogin, true)
        .await
        .unwrap();
    let second = manager
        .issue(&store.conn, user_id, TokenPurpose::FirstLogin, true)
        .await
        .unwrap();
    assert_ne!(first, second);

    let err = manager
        .validate(&store.conn, &first, TokenPurpose::FirstLogin)
        .await
        .unwrap_err();
    assert!(matches!(err, OneTimeTokenError::AlreadyUsed));

    let token = manager
        .validate(&store.conn, &second, TokenPurpose::FirstLogin)
        .await
        .unwrap();
    assert_eq!(token.user_id, user_id);
    assert!(!token.consumed);
}

#[tokio::test]
async fn test_token_is_single_use() {
    let store = test_store().await;
    let user_id = admin_id(&store).await;
    let manager = OneTimeTokenManager::new(None);

    let value = manager
        .issue(&store.conn, user_id, TokenPurpose::FirstLogin, false)
        .await
        .unwrap();

    manager.consume(&store.conn, &value).await.unwrap();

    let err = manager
        .validate(&store.conn, &value, TokenPurpose::FirstLogin)
        .await
        .unwrap_err();
    assert!(matches!(err, OneTimeTokenError::AlreadyUsed));

    // A second consume finds no unconsumed row to claim.
    let err = manager.consume(&store.conn, &value).await.unwrap_err();
    assert!(matches!(err, OneTimeTokenError::AlreadyUsed));
}

#[tokio::test]
async fn test_racing_set_password_calls_burn_the_token_once() {
    let (shared, mailer) = spawn_service().await;
    let token = mailer.tokens().remove(0);

    let auth_a = shared.auth.clone();
    let auth_b = shared.auth.clone();
    let token_a = token.clone();
    let token_b = token;

    let a = tokio::spawn(async move {
        auth_a
            .set_password_with_first_login_token(&token_a, STRONG_PASSWORD, STRONG_PASSWORD)
            .await
    });
    let b = tokio::spawn(async move {
        auth_b
            .set_password_with_first_login_token(&token_b, OTHER_PASSWORD, OTHER_PASSWORD)
            .await
    });

    let results = [a.await.unwrap(), b.await.unwrap()];
    let winners = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(winners, 1, "exactly one racer may set the password");

    // Whatever the interleaving, the loser sees a spent token, never an
    // infrastructure error.
    let loser = results
        .iter()
        .find_map(|result| result.as_ref().err())
        .expect("one racer must lose");
    assert!(
        matches!(loser, AuthError::OneTimeTokenInvalid),
        "unexpected loser error: {loser}"
    );

    // The winner's password is the one that logs in afterwards.
    let winner_password = if results[0].is_ok() {
        STRONG_PASSWORD
    } else {
        OTHER_PASSWORD
    };
    shared.auth.login("admin", winner_password).await.unwrap();
}

#[tokio::test]
async fn test_wrong_purpose_is_rejected() {
    let (shared, _) = spawn_service().await;
    let user_id = admin_id(&shared.store).await;
    let manager = OneTimeTokenManager::new(None);

    let value = manager
        .issue(
            &shared.store.conn,
            user_id,
            TokenPurpose::PasswordReset,
            false,
        )
        .await
        .unwrap();

    let err = manager
        .validate(&shared.store.conn, &value, TokenPurpose::FirstLogin)
        .await
        .unwrap_err();
    assert!(matches!(err, OneTimeTokenError::WrongPurpose));

    // The service collapses the purpose mismatch into the generic token
    // error so callers cannot probe for token existence.
    let err = shared
        .auth
        .validate_first_login_token(&value)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::OneTimeTokenInvalid));
    assert_eq!(
        err.to_string(),
        "Token is invalid, expired, or has already been used"
    );
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let store = test_store().await;
    let user_id = admin_id(&store).await;

    let issuing = OneTimeTokenManager::new(None);
    let value = issuing
        .issue(&store.conn, user_id, TokenPurpose::FirstLogin, false)
        .await
        .unwrap();

    // A manager with a negative TTL treats every token as expired.
    let strict = OneTimeTokenManager::new(Some(Duration::hours(-1)));
    let err = strict
        .validate(&store.conn, &value, TokenPurpose::FirstLogin)
        .await
        .unwrap_err();
    assert!(matches!(err, OneTimeTokenError::NotFound));

    // Expiry does not consume: a lenient manager still accepts it.
    issuing
        .validate(&store.conn, &value, TokenPurpose::FirstLogin)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failed_attempts_reset_on_success() {
    let (shared, _) = spawn_service().await;

    for _ in 0..4 {
        let err = shared.auth.login("admin", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::BadCredentials));
    }

    // Four failures stay below the threshold; a good login clears them.
    shared.auth.login("admin", ADMIN_TEMP_PASSWORD).await.unwrap();

    let info = shared.auth.user_info("admin").await.unwrap();
    assert_eq!(info.failed_attempts, 0);
    assert!(info.locked_until.is_none());
}

#[tokio::test]
async fn test_lockout_blocks_correct_password_until_unlocked() {
    let (shared, _) = spawn_service().await;

    for _ in 0..5 {
        let err = shared.auth.login("admin", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::BadCredentials));
    }

    let info = shared.auth.user_info("admin").await.unwrap();
    assert_eq!(info.failed_attempts, 5);
    assert!(info.locked_until.is_some());

    // The lockout answer is indistinguishable from a bad password.
    let err = shared
        .auth
        .login("admin", ADMIN_TEMP_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::BadCredentials));

    shared.auth.unlock_user("admin", "test").await.unwrap();

    let info = shared.auth.user_info("admin").await.unwrap();
    assert_eq!(info.failed_attempts, 0);
    assert!(info.locked_until.is_none());

    shared.auth.login("admin", ADMIN_TEMP_PASSWORD).await.unwrap();
}

#[tokio::test]
async fn test_logout_invalidates_every_session() {
    let (shared, _) = spawn_service().await;

    let first = shared
        .auth
        .login("admin", ADMIN_TEMP_PASSWORD)
        .await
        .unwrap();
    let second = shared
        .auth
        .login("admin", ADMIN_TEMP_PASSWORD)
        .await
        .unwrap();

    for result in [&first, &second] {
        shared
            .auth
            .authenticate(&format!("Bearer {}", result.token))
            .await
            .unwrap();
    }

    shared.auth.logout("admin").await.unwrap();

    for result in [&first, &second] {
        let err = shared
            .auth
            .authenticate(&format!("Bearer {}", result.token))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));
    }
}

#[tokio::test]
async fn test_change_temporary_password_clears_flags() {
    let (shared, _) = spawn_service().await;

    shared
        .auth
        .change_temporary_password(
            "admin",
            ADMIN_TEMP_PASSWORD,
            STRONG_PASSWORD,
            STRONG_PASSWORD,
        )
        .await
        .unwrap();

    let info = shared.auth.user_info("admin").await.unwrap();
    assert!(!info.must_change_password);
    assert!(!info.temporary_password);

    // Once the flags are cleared the flow refuses to run again.
    let err = shared
        .auth
        .change_temporary_password("admin", STRONG_PASSWORD, OTHER_PASSWORD, OTHER_PASSWORD)
        .await
        .unwrap_err();
    match err {
        AuthError::PolicyViolation(msg) => {
            assert_eq!(msg, "Account does not require a temporary password change");
        }
        other => panic!("unexpected error: {other}"),
    }

    shared.auth.login("admin", STRONG_PASSWORD).await.unwrap();
}

#[tokio::test]
async fn test_stale_first_login_link_stops_validating() {
    let (shared, mailer) = spawn_service().await;

    let token = mailer.tokens().remove(0);
    shared.auth.validate_first_login_token(&token).await.unwrap();

    // The deprecated credential flow clears both flags but leaves the
    // emailed token unconsumed.
    shared
        .auth
        .change_temporary_password(
            "admin",
            ADMIN_TEMP_PASSWORD,
            STRONG_PASSWORD,
            STRONG_PASSWORD,
        )
        .await
        .unwrap();

    // The link must now read as spent, not resolve to the account.
    let err = shared
        .auth
        .validate_first_login_token(&token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::OneTimeTokenInvalid));

    let err = shared
        .auth
        .set_password_with_first_login_token(&token, OTHER_PASSWORD, OTHER_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PolicyViolation(_)));
}

#[tokio::test]
async fn test_disabled_account_is_rejected() {
    let (shared, _) = spawn_service().await;

    let result = shared
        .auth
        .login("admin", ADMIN_TEMP_PASSWORD)
        .await
        .unwrap();

    let model = users::Entity::find_by_id(admin_id(&shared.store).await)
        .one(&shared.store.conn)
        .await
        .unwrap()
        .unwrap();
    let mut active: users::ActiveModel = model.into();
    active.enabled = Set(false);
    active.update(&shared.store.conn).await.unwrap();

    let err = shared
        .auth
        .login("admin", ADMIN_TEMP_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::BadCredentials));

    // Sessions minted before the account was disabled die with it.
    let err = shared
        .auth
        .authenticate(&format!("Bearer {}", result.token))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid));
}

#[tokio::test]
async fn test_register_user_emails_the_link() {
    let (shared, mailer) = spawn_service().await;

    let created = shared
        .auth
        .register_user(
            RegisterUser {
                username: "bob".to_string(),
                email: "bob@example.com".to_string(),
                roles: vec!["USER".to_string()],
            },
            "test",
        )
        .await
        .unwrap();

    assert_eq!(created.username, "bob");
    assert_eq!(created.roles, vec!["USER".to_string()]);
    assert!(
        created
            .first_login_link
            .starts_with(&shared.config.email.frontend_base_url)
    );

    // The captured email carries the same link the service returned.
    let (username, email, link) = mailer.sent.lock().unwrap().last().unwrap().clone();
    assert_eq!(username, "bob");
    assert_eq!(email, "bob@example.com");
    assert_eq!(link, created.first_login_link);

    let token = mailer.tokens().pop().unwrap();
    let validation = shared.auth.validate_first_login_token(&token).await.unwrap();
    assert_eq!(validation.username, "bob");
}
