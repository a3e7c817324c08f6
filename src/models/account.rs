use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::query::new_id;
use super::schema::accounts;
use crate::error::StoreError;

/// An OAuth provider account linked to a user.
#[derive(
    Associations,
    Queryable,
    Identifiable,
    Serialize,
    Deserialize,
    Debug,
    Clone,
    PartialEq,
    Eq,
)]
#[diesel(primary_key(id))]
#[diesel(belongs_to(crate::models::user::User, foreign_key = user_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub provider: String,
    pub provider_account_id: String,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub expires_at: Option<i32>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
    pub session_state: Option<String>,
}

#[derive(Insertable, Default, Debug, Clone)]
#[diesel(table_name = accounts)]
pub struct NewAccount<'a> {
    pub user_id: &'a str,
    pub type_: &'a str,
    pub provider: &'a str,
    pub provider_account_id: &'a str,
    pub refresh_token: Option<&'a str>,
    pub access_token: Option<&'a str>,
    pub expires_at: Option<i32>,
    pub token_type: Option<&'a str>,
    pub scope: Option<&'a str>,
    pub id_token: Option<&'a str>,
    pub session_state: Option<&'a str>,
}

/// Token columns a provider refreshes on sign in.
#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = accounts)]
#[diesel(treat_none_as_null = true)]
pub struct AccountTokens<'a> {
    pub refresh_token: Option<&'a str>,
    pub access_token: Option<&'a str>,
    pub expires_at: Option<i32>,
    pub token_type: Option<&'a str>,
    pub scope: Option<&'a str>,
    pub id_token: Option<&'a str>,
    pub session_state: Option<&'a str>,
}

impl<'a> NewAccount<'a> {
    pub fn tokens(&self) -> AccountTokens<'a> {
        AccountTokens {
            refresh_token: self.refresh_token,
            access_token: self.access_token,
            expires_at: self.expires_at,
            token_type: self.token_type,
            scope: self.scope,
            id_token: self.id_token,
            session_state: self.session_state,
        }
    }
}

impl Account {
    /// Links a provider account. A provider account already linked to
    /// anyone fails with a unique violation.
    pub fn create(conn: &mut PgConnection, new_account: &NewAccount) -> anyhow::Result<Self> {
        let account = diesel::insert_into(accounts::table)
            .values((accounts::id.eq(new_id()), new_account))
            .get_result::<Self>(conn)?;

        Ok(account)
    }

    /// Links the account, or refreshes its tokens when the same user already
    /// has it linked. The owner of an existing link never changes.
    pub fn upsert_tokens(
        conn: &mut PgConnection,
        new_account: &NewAccount,
    ) -> anyhow::Result<Self> {
        conn.transaction(|conn| {
            let existing = Self::find_by_provider(
                conn,
                new_account.provider,
                new_account.provider_account_id,
            )?;

            match existing {
                None => Self::create(conn, new_account),
                Some(account) if account.user_id != new_account.user_id => {
                    Err(StoreError::UniqueViolation(
                        "accounts_provider_provider_account_id_unique".to_string(),
                    )
                    .into())
                }
                Some(account) => Ok(diesel::update(accounts::table.find(&account.id))
                    .set(&new_account.tokens())
                    .get_result::<Self>(conn)?),
            }
        })
    }

    pub fn count(conn: &mut PgConnection) -> anyhow::Result<i64> {
        Ok(accounts::table.count().get_result(conn)?)
    }

    pub fn find_by_id(conn: &mut PgConnection, id: &str) -> anyhow::Result<Option<Self>> {
        Ok(accounts::table
            .filter(accounts::id.eq(id))
            .first::<Self>(conn)
            .optional()?)
    }

    pub fn find_by_provider(
        conn: &mut PgConnection,
        provider: &str,
        provider_account_id: &str,
    ) -> anyhow::Result<Option<Self>> {
        Ok(accounts::table
            .filter(accounts::provider.eq(provider))
            .filter(accounts::provider_account_id.eq(provider_account_id))
            .first::<Self>(conn)
            .optional()?)
    }

    pub fn find_by_user(conn: &mut PgConnection, user_id: &str) -> anyhow::Result<Vec<Self>> {
        Ok(accounts::table
            .filter(accounts::user_id.eq(user_id))
            .order(accounts::provider.asc())
            .load::<Self>(conn)?)
    }

    pub fn delete_by_id(conn: &mut PgConnection, id: &str) -> anyhow::Result<usize> {
        Ok(diesel::delete(accounts::table.filter(accounts::id.eq(id))).execute(conn)?)
    }

    pub fn delete_by_provider(
        conn: &mut PgConnection,
        provider: &str,
        provider_account_id: &str,
    ) -> anyhow::Result<Option<Self>> {
        Ok(diesel::delete(
            accounts::table
                .filter(accounts::provider.eq(provider))
                .filter(accounts::provider_account_id.eq(provider_account_id)),
        )
        .get_result::<Self>(conn)
        .optional()?)
    }
}
