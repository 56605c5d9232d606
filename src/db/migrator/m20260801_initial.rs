use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

use crate::entities::{one_time_tokens, users};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Seeded administrator account. Ships with a temporary password and both
/// change-required flags set, so the first-login flow is the intended path.
const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";

/// Hash the default password using Argon2id
fn hash_default_password() -> String {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
    };

    let password = b"password";
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password, &salt)
        .expect("Failed to hash default password")
        .to_string()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(users::Entity)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(one_time_tokens::Entity)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Seed default admin user with hashed temporary password
        let now = chrono::Utc::now().to_rfc3339();
        let password_hash = hash_default_password();

        let insert = sea_orm_migration::sea_query::Query::insert()
            .into_table(users::Entity)
            .columns([
                users::Column::Username,
                users::Column::Email,
                users::Column::PasswordHash,
                users::Column::Enabled,
                users::Column::Locked,
                users::Column::FailedAttempts,
                users::Column::TokenVersion,
                users::Column::MustChangePassword,
                users::Column::TemporaryPassword,
                users::Column::Roles,
                users::Column::CreatedAt,
                users::Column::UpdatedAt,
            ])
            .values_panic([
                DEFAULT_ADMIN_USERNAME.into(),
                DEFAULT_ADMIN_EMAIL.into(),
                password_hash.into(),
                true.into(),
                false.into(),
                0.into(),
                1.into(),
                true.into(),
                true.into(),
                "TECHADMIN".into(),
                now.clone().into(),
                now.into(),
            ])
            .to_owned();

        manager.exec_stmt(insert).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(one_time_tokens::Entity).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(users::Entity).to_owned())
            .await?;

        Ok(())
    }
}
