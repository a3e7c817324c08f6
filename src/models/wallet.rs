use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::upsert::on_constraint;
use serde::{Deserialize, Serialize};

use super::query::new_id;
use super::schema::wallets;

/// Provider recorded for addresses typed in by hand on the profile page.
pub const MANUAL_PROVIDER: &str = "Manual";

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
pub struct Wallet {
    pub id: String,
    pub address: String,
    pub wallet_type: String,
    pub provider: Option<String>,
    pub user_id: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = wallets)]
pub struct NewWallet<'a> {
    pub address: &'a str,
    pub wallet_type: &'a str,
    pub provider: Option<&'a str>,
    pub user_id: &'a str,
}

impl Wallet {
    pub fn create(conn: &mut PgConnection, new_wallet: &NewWallet) -> anyhow::Result<Self> {
        let wallet = diesel::insert_into(wallets::table)
            .values((wallets::id.eq(new_id()), new_wallet))
            .get_result::<Self>(conn)?;

        Ok(wallet)
    }

    /// One wallet per (user, type): an existing one gets the new address.
    pub fn upsert(conn: &mut PgConnection, new_wallet: &NewWallet) -> anyhow::Result<Self> {
        let wallet = diesel::insert_into(wallets::table)
            .values((wallets::id.eq(new_id()), new_wallet))
            .on_conflict(on_constraint("wallets_user_id_wallet_type_unique"))
            .do_update()
            .set((
                wallets::address.eq(new_wallet.address),
                wallets::updated_at.eq(diesel::dsl::now),
            ))
            .get_result::<Self>(conn)?;

        Ok(wallet)
    }

    pub fn count(conn: &mut PgConnection) -> anyhow::Result<i64> {
        Ok(wallets::table.count().get_result(conn)?)
    }

    pub fn find_by_id(conn: &mut PgConnection, id: &str) -> anyhow::Result<Option<Self>> {
        Ok(wallets::table
            .filter(wallets::id.eq(id))
            .first::<Self>(conn)
            .optional()?)
    }

    pub fn find_first(
        conn: &mut PgConnection,
        user_id: &str,
        wallet_type: &str,
    ) -> anyhow::Result<Option<Self>> {
        Ok(wallets::table
            .filter(wallets::user_id.eq(user_id))
            .filter(wallets::wallet_type.eq(wallet_type))
            .first::<Self>(conn)
            .optional()?)
    }

    /// Oldest wallet of the user, whatever its type.
    pub fn find_any_for_user(
        conn: &mut PgConnection,
        user_id: &str,
    ) -> anyhow::Result<Option<Self>> {
        Ok(wallets::table
            .filter(wallets::user_id.eq(user_id))
            .order(wallets::created_at.asc())
            .first::<Self>(conn)
            .optional()?)
    }

    /// Wallet matching `preferred_type`, falling back to any wallet of the user.
    pub fn find_preferred(
        conn: &mut PgConnection,
        user_id: &str,
        preferred_type: &str,
    ) -> anyhow::Result<Option<Self>> {
        match Self::find_first(conn, user_id, preferred_type)? {
            Some(wallet) => Ok(Some(wallet)),
            None => Self::find_any_for_user(conn, user_id),
        }
    }

    pub fn find_by_user(conn: &mut PgConnection, user_id: &str) -> anyhow::Result<Vec<Self>> {
        Ok(wallets::table
            .filter(wallets::user_id.eq(user_id))
            .order(wallets::wallet_type.asc())
            .load::<Self>(conn)?)
    }

    pub fn update_address(
        conn: &mut PgConnection,
        id: &str,
        address: &str,
    ) -> anyhow::Result<Option<Self>> {
        Ok(diesel::update(wallets::table.filter(wallets::id.eq(id)))
            .set((
                wallets::address.eq(address),
                wallets::updated_at.eq(diesel::dsl::now),
            ))
            .get_result::<Self>(conn)
            .optional()?)
    }

    pub fn delete_by_id(conn: &mut PgConnection, id: &str) -> anyhow::Result<usize> {
        Ok(diesel::delete(wallets::table.filter(wallets::id.eq(id))).execute(conn)?)
    }

    /// Deletes every wallet of the user whose type is not in `keep_types`.
    pub fn delete_many_except(
        conn: &mut PgConnection,
        user_id: &str,
        keep_types: &[&str],
    ) -> anyhow::Result<usize> {
        let count = diesel::delete(
            wallets::table
                .filter(wallets::user_id.eq(user_id))
                .filter(wallets::wallet_type.ne_all(keep_types)),
        )
        .execute(conn)?;

        Ok(count)
    }
}
