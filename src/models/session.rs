use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::query::new_id;
use super::schema::{sessions, users};
use super::user::User;

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
#[diesel(belongs_to(User, foreign_key = user_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub session_token: String,
    pub user_id: String,
    pub expires: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
struct NewSession<'a> {
    id: &'a str,
    session_token: &'a str,
    user_id: &'a str,
    expires: NaiveDateTime,
}

impl Session {
    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.expires <= now
    }

    pub fn create(
        conn: &mut PgConnection,
        session_token: &str,
        user_id: &str,
        expires: NaiveDateTime,
    ) -> anyhow::Result<Self> {
        let id = new_id();
        let session = diesel::insert_into(sessions::table)
            .values(&NewSession {
                id: &id,
                session_token,
                user_id,
                expires,
            })
            .get_result::<Self>(conn)?;

        Ok(session)
    }

    pub fn count(conn: &mut PgConnection) -> anyhow::Result<i64> {
        Ok(sessions::table.count().get_result(conn)?)
    }

    pub fn find_by_id(conn: &mut PgConnection, id: &str) -> anyhow::Result<Option<Self>> {
        Ok(sessions::table
            .filter(sessions::id.eq(id))
            .first::<Self>(conn)
            .optional()?)
    }

    pub fn find_by_token(conn: &mut PgConnection, token: &str) -> anyhow::Result<Option<Self>> {
        Ok(sessions::table
            .filter(sessions::session_token.eq(token))
            .first::<Self>(conn)
            .optional()?)
    }

    pub fn find_with_user(
        conn: &mut PgConnection,
        token: &str,
    ) -> anyhow::Result<Option<(Self, User)>> {
        Ok(sessions::table
            .inner_join(users::table)
            .filter(sessions::session_token.eq(token))
            .select((sessions::all_columns, users::all_columns))
            .first::<(Self, User)>(conn)
            .optional()?)
    }

    pub fn update_expires(
        conn: &mut PgConnection,
        token: &str,
        expires: NaiveDateTime,
    ) -> anyhow::Result<Option<Self>> {
        Ok(diesel::update(sessions::table)
            .filter(sessions::session_token.eq(token))
            .set(sessions::expires.eq(expires))
            .get_result::<Self>(conn)
            .optional()?)
    }

    pub fn delete_by_id(conn: &mut PgConnection, id: &str) -> anyhow::Result<usize> {
        Ok(diesel::delete(sessions::table.filter(sessions::id.eq(id))).execute(conn)?)
    }

    pub fn delete_by_token(conn: &mut PgConnection, token: &str) -> anyhow::Result<Option<Self>> {
        Ok(
            diesel::delete(sessions::table.filter(sessions::session_token.eq(token)))
                .get_result::<Self>(conn)
                .optional()?,
        )
    }

    pub fn delete_expired(conn: &mut PgConnection, now: NaiveDateTime) -> anyhow::Result<usize> {
        Ok(diesel::delete(sessions::table.filter(sessions::expires.le(now))).execute(conn)?)
    }
}
