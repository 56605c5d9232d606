use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub username: String,

    #[sea_orm(unique)]
    pub email: String,

    /// Argon2id password hash
    pub password_hash: String,

    /// Administrative on/off switch for the account.
    pub enabled: bool,

    /// Permanent administrative lock, distinct from the timed lockout below.
    pub locked: bool,

    pub failed_attempts: i32,

    pub last_failed_at: Option<String>,

    /// While now is before this timestamp, authentication is refused even
    /// for correct credentials.
    pub locked_until: Option<String>,

    /// Stamped into every session token at mint time; incrementing it
    /// invalidates all previously issued tokens for this account.
    pub token_version: i32,

    /// Forces password rotation on first login/bootstrap.
    pub must_change_password: bool,

    /// Set while the current password is an admin-generated temporary one.
    pub temporary_password: bool,

    /// Comma-separated role names, e.g. "USER" or "TECHADMIN,SUPERADMIN".
    pub roles: String,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::one_time_tokens::Entity")]
    OneTimeTokens,
}

impl Related<super::one_time_tokens::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OneTimeTokens.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
