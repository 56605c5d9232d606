use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
};

use crate::auth::TokenPurpose;
use crate::entities::one_time_tokens;

pub async fn find_by_value<C: ConnectionTrait>(
    conn: &C,
    value: &str,
) -> Result<Option<one_time_tokens::Model>> {
    one_time_tokens::Entity::find()
        .filter(one_time_tokens::Column::Token.eq(value))
        .one(conn)
        .await
        .context("Failed to query one-time token")
}

pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    value: &str,
    purpose: TokenPurpose,
) -> Result<one_time_tokens::Model> {
    let now = chrono::Utc::now().to_rfc3339();

    let active = one_time_tokens::ActiveModel {
        token: Set(value.to_string()),
        user_id: Set(user_id),
        purpose: Set(purpose.as_str().to_string()),
        consumed: Set(false),
        created_at: Set(now),
        ..Default::default()
    };

    active
        .insert(conn)
        .await
        .context("Failed to insert one-time token")
}

/// How many tokens, consumed or not, were ever issued for `(owner, purpose)`.
pub async fn count_for_user<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    purpose: TokenPurpose,
) -> Result<u64> {
    one_time_tokens::Entity::find()
        .filter(one_time_tokens::Column::UserId.eq(user_id))
        .filter(one_time_tokens::Column::Purpose.eq(purpose.as_str()))
        .count(conn)
        .await
        .context("Failed to count one-time tokens")
}

/// Mark every unconsumed token of this purpose for this owner as consumed.
/// Returns how many were invalidated.
pub async fn invalidate_unconsumed<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    purpose: TokenPurpose,
) -> Result<u64> {
    let result = one_time_tokens::Entity::update_many()
        .col_expr(
            one_time_tokens::Column::Consumed,
            sea_orm::sea_query::Expr::value(true),
        )
        .filter(one_time_tokens::Column::UserId.eq(user_id))
        .filter(one_time_tokens::Column::Purpose.eq(purpose.as_str()))
        .filter(one_time_tokens::Column::Consumed.eq(false))
        .exec(conn)
        .await
        .context("Failed to invalidate prior one-time tokens")?;

    Ok(result.rows_affected)
}

/// Flip `consumed` with a compare-and-set so two racing callers cannot both
/// succeed. Returns false when the token was already consumed (or missing).
pub async fn consume<C: ConnectionTrait>(conn: &C, value: &str) -> Result<bool> {
    let result = one_time_tokens::Entity::update_many()
        .col_expr(
            one_time_tokens::Column::Consumed,
            sea_orm::sea_query::Expr::value(true),
        )
        .filter(one_time_tokens::Column::Token.eq(value))
        .filter(one_time_tokens::Column::Consumed.eq(false))
        .exec(conn)
        .await
        .context("Failed to consume one-time token")?;

    Ok(result.rows_affected == 1)
}
