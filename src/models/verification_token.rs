use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::schema::verification_tokens;

#[derive(
    Queryable,
    Insertable,
    Identifiable,
    Serialize,
    Deserialize,
    Debug,
    Clone,
    PartialEq,
    Eq,
)]
#[diesel(primary_key(identifier, token))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(table_name = verification_tokens)]
pub struct VerificationToken {
    pub identifier: String,
    pub token: String,
    pub expires: NaiveDateTime,
}

impl VerificationToken {
    pub fn create(
        conn: &mut PgConnection,
        identifier: &str,
        token: &str,
        expires: NaiveDateTime,
    ) -> anyhow::Result<Self> {
        let res = diesel::insert_into(verification_tokens::table)
            .values((
                verification_tokens::identifier.eq(identifier),
                verification_tokens::token.eq(token),
                verification_tokens::expires.eq(expires),
            ))
            .get_result::<Self>(conn)?;

        Ok(res)
    }

    pub fn count(conn: &mut PgConnection) -> anyhow::Result<i64> {
        Ok(verification_tokens::table.count().get_result(conn)?)
    }

    pub fn find(
        conn: &mut PgConnection,
        identifier: &str,
        token: &str,
    ) -> anyhow::Result<Option<Self>> {
        Ok(verification_tokens::table
            .find((identifier, token))
            .first::<Self>(conn)
            .optional()?)
    }

    /// Deletes and returns the token, so a token can only be redeemed once.
    pub fn use_token(
        conn: &mut PgConnection,
        identifier: &str,
        token: &str,
    ) -> anyhow::Result<Option<Self>> {
        Ok(
            diesel::delete(verification_tokens::table.find((identifier, token)))
                .get_result::<Self>(conn)
                .optional()?,
        )
    }

    pub fn delete_expired(conn: &mut PgConnection, now: NaiveDateTime) -> anyhow::Result<usize> {
        Ok(
            diesel::delete(verification_tokens::table.filter(verification_tokens::expires.le(now)))
                .execute(conn)?,
        )
    }
}
