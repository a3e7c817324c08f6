use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::query::{new_id, Page, Pagination};
use super::schema::users;

#[derive(
    Queryable,
    Insertable,
    Identifiable,
    AsChangeset,
    Serialize,
    Deserialize,
    Debug,
    Clone,
    PartialEq,
)]
#[diesel(primary_key(id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<NaiveDateTime>,
    pub image: Option<String>,
    pub bio: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub image: Option<&'a str>,
    pub bio: Option<&'a str>,
}

/// Partial update, `None` leaves the column untouched.
#[derive(AsChangeset, Default, Debug, Clone, Deserialize)]
#[diesel(table_name = users)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<NaiveDateTime>,
    pub image: Option<String>,
    pub bio: Option<String>,
}

impl UserChanges {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.email_verified.is_none()
            && self.image.is_none()
            && self.bio.is_none()
    }
}

impl User {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or("Anonymous")
    }

    /// Inserts a user, generating an id when none is given.
    pub fn create(conn: &mut PgConnection, new_user: NewUser) -> anyhow::Result<Self> {
        let generated;
        let new_user = if new_user.id.is_empty() {
            generated = new_id();
            NewUser {
                id: &generated,
                ..new_user
            }
        } else {
            new_user
        };

        let user = diesel::insert_into(users::table)
            .values(&new_user)
            .get_result::<Self>(conn)?;

        Ok(user)
    }

    pub fn get_user_count(conn: &mut PgConnection) -> anyhow::Result<i64> {
        let count = users::table.count().get_result(conn)?;
        Ok(count)
    }

    pub fn find_by_id(conn: &mut PgConnection, id: &str) -> anyhow::Result<Option<Self>> {
        Ok(users::table
            .filter(users::id.eq(id))
            .first::<Self>(conn)
            .optional()?)
    }

    pub fn find_by_email(conn: &mut PgConnection, email: &str) -> anyhow::Result<Option<Self>> {
        Ok(users::table
            .filter(users::email.eq(email))
            .first::<Self>(conn)
            .optional()?)
    }

    /// Sessions can carry an id that never made it to the database, so
    /// lookups fall back to the email address.
    pub fn find_by_id_or_email(
        conn: &mut PgConnection,
        id: &str,
        email: &str,
    ) -> anyhow::Result<Option<Self>> {
        Ok(users::table
            .filter(users::id.eq(id).or(users::email.eq(email)))
            .order(users::created_at.asc())
            .first::<Self>(conn)
            .optional()?)
    }

    pub fn upsert_by_email(
        conn: &mut PgConnection,
        email: &str,
        name: Option<&str>,
        image: Option<&str>,
    ) -> anyhow::Result<Self> {
        let id = new_id();
        let new_user = NewUser {
            id: &id,
            name,
            email: Some(email),
            image,
            bio: None,
        };

        let user = diesel::insert_into(users::table)
            .values(&new_user)
            .on_conflict(users::email)
            .do_update()
            .set(users::updated_at.eq(diesel::dsl::now))
            .get_result::<Self>(conn)?;

        Ok(user)
    }

    pub fn update(
        conn: &mut PgConnection,
        id: &str,
        changes: &UserChanges,
    ) -> anyhow::Result<Option<Self>> {
        if changes.is_empty() {
            return Self::find_by_id(conn, id);
        }

        Ok(diesel::update(users::table.filter(users::id.eq(id)))
            .set((changes, users::updated_at.eq(diesel::dsl::now)))
            .get_result::<Self>(conn)
            .optional()?)
    }

    pub fn find_many(
        conn: &mut PgConnection,
        pagination: Pagination,
    ) -> anyhow::Result<Page<Self>> {
        conn.transaction(|conn| {
            let total = Self::get_user_count(conn)?;
            let items = users::table
                .order(users::created_at.desc())
                .offset(pagination.skip())
                .limit(pagination.take())
                .load::<Self>(conn)?;

            Ok(Page::new(items, total, pagination))
        })
    }

    pub fn get_by_user_ids(
        conn: &mut PgConnection,
        user_ids: &[String],
    ) -> anyhow::Result<Vec<Self>> {
        let users = users::table
            .filter(users::id.eq_any(user_ids))
            .load::<Self>(conn)?;

        Ok(users)
    }

    /// Accounts, sessions, wallets and campaigns go with the user through
    /// the foreign keys.
    pub fn delete_by_id(conn: &mut PgConnection, id: &str) -> anyhow::Result<usize> {
        let count = diesel::delete(users::table.filter(users::id.eq(id))).execute(conn)?;
        Ok(count)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::test_utils::test_conn;

    #[test]
    fn test_display_name() {
        let now = chrono::Utc::now().naive_utc();
        let mut user = User {
            id: "u".to_string(),
            name: None,
            email: None,
            email_verified: None,
            image: None,
            bio: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(user.display_name(), "Anonymous");
        user.name = Some(String::new());
        assert_eq!(user.display_name(), "Anonymous");
        user.name = Some("Alice".to_string());
        assert_eq!(user.display_name(), "Alice");
    }

    #[test]
    fn test_create_and_find() {
        let mut conn = test_conn();

        let user = User::create(
            &mut conn,
            NewUser {
                id: "",
                name: Some("Alice"),
                email: Some("alice@example.com"),
                image: None,
                bio: None,
            },
        )
        .unwrap();
        assert!(!user.id.is_empty());

        let by_email = User::find_by_email(&mut conn, "alice@example.com").unwrap();
        assert_eq!(by_email.as_ref().map(|u| &u.id), Some(&user.id));

        let by_either = User::find_by_id_or_email(&mut conn, "missing", "alice@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(by_either.id, user.id);

        assert!(User::find_by_id(&mut conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_by_email_keeps_row() {
        let mut conn = test_conn();

        let first =
            User::upsert_by_email(&mut conn, "seed@example.com", Some("Seed"), None).unwrap();
        let second =
            User::upsert_by_email(&mut conn, "seed@example.com", Some("Other"), None).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name.as_deref(), Some("Seed"));
    }

    #[test]
    fn test_partial_update() {
        let mut conn = test_conn();

        let user = User::upsert_by_email(&mut conn, "bob@example.com", Some("Bob"), None).unwrap();
        let changes = UserChanges {
            bio: Some("Early adopter".to_string()),
            ..Default::default()
        };
        let updated = User::update(&mut conn, &user.id, &changes).unwrap().unwrap();

        assert_eq!(updated.bio.as_deref(), Some("Early adopter"));
        assert_eq!(updated.name.as_deref(), Some("Bob"));

        let missing = User::update(&mut conn, "missing", &changes).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_find_many_pages() {
        let mut conn = test_conn();
        for email in ["page1@example.com", "page2@example.com", "page3@example.com"] {
            User::upsert_by_email(&mut conn, email, None, None).unwrap();
        }

        let page = User::find_many(&mut conn, Pagination::new(Some(1), Some(2))).unwrap();
        assert!(page.total >= 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.limit, 2);
        assert_eq!(page.total_pages, (page.total + 1) / 2);
        assert!(page
            .items
            .windows(2)
            .all(|w| w[0].created_at >= w[1].created_at));

        let beyond = User::find_many(&mut conn, Pagination::new(Some(page.total + 1), Some(2)))
            .unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, page.total);
    }
}

