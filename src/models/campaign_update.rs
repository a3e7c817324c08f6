use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::campaign::Campaign;
use super::query::new_id;
use super::schema::campaign_updates;

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
#[diesel(belongs_to(Campaign, foreign_key = campaign_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct CampaignUpdate {
    pub id: String,
    pub title: String,
    pub content: String,
    pub campaign_id: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = campaign_updates)]
pub struct NewCampaignUpdate {
    pub id: String,
    pub title: String,
    pub content: String,
    pub campaign_id: String,
}

impl NewCampaignUpdate {
    pub fn new(campaign_id: &str, title: &str, content: &str) -> Self {
        NewCampaignUpdate {
            id: new_id(),
            title: title.to_string(),
            content: content.to_string(),
            campaign_id: campaign_id.to_string(),
        }
    }
}

impl CampaignUpdate {
    pub fn create(
        conn: &mut PgConnection,
        campaign_id: &str,
        title: &str,
        content: &str,
    ) -> anyhow::Result<Self> {
        let update = diesel::insert_into(campaign_updates::table)
            .values(&NewCampaignUpdate::new(campaign_id, title, content))
            .get_result::<Self>(conn)?;

        Ok(update)
    }

    pub fn create_many(
        conn: &mut PgConnection,
        updates: &[NewCampaignUpdate],
    ) -> anyhow::Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }

        Ok(diesel::insert_into(campaign_updates::table)
            .values(updates)
            .execute(conn)?)
    }

    pub fn count(conn: &mut PgConnection) -> anyhow::Result<i64> {
        Ok(campaign_updates::table.count().get_result(conn)?)
    }

    pub fn find_by_id(conn: &mut PgConnection, id: &str) -> anyhow::Result<Option<Self>> {
        Ok(campaign_updates::table
            .filter(campaign_updates::id.eq(id))
            .first::<Self>(conn)
            .optional()?)
    }

    pub fn find_by_campaign(
        conn: &mut PgConnection,
        campaign_id: &str,
    ) -> anyhow::Result<Vec<Self>> {
        Ok(campaign_updates::table
            .filter(campaign_updates::campaign_id.eq(campaign_id))
            .order((campaign_updates::created_at.desc(), campaign_updates::id.asc()))
            .load::<Self>(conn)?)
    }

    pub fn delete_by_id(conn: &mut PgConnection, id: &str) -> anyhow::Result<usize> {
        Ok(
            diesel::delete(campaign_updates::table.filter(campaign_updates::id.eq(id)))
                .execute(conn)?,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::test_utils::{create_test_campaign, create_test_user, test_conn};

    #[test]
    fn test_create_many_and_find() {
        let mut conn = test_conn();
        let user = create_test_user(&mut conn, "updates@example.com");
        let campaign = create_test_campaign(&mut conn, &user.id, "Updates", 10.0);
        let other = create_test_campaign(&mut conn, &user.id, "Other updates", 10.0);

        let updates = vec![
            NewCampaignUpdate::new(&campaign.id, "Milestone 1", "Contracts deployed"),
            NewCampaignUpdate::new(&campaign.id, "Milestone 2", "Audit finished"),
            NewCampaignUpdate::new(&other.id, "Kickoff", "Started"),
        ];
        let first_id = updates[0].id.clone();
        assert_eq!(CampaignUpdate::create_many(&mut conn, &updates).unwrap(), 3);
        assert_eq!(CampaignUpdate::create_many(&mut conn, &[]).unwrap(), 0);

        let found = CampaignUpdate::find_by_campaign(&mut conn, &campaign.id).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|u| u.campaign_id == campaign.id));

        let first = CampaignUpdate::find_by_id(&mut conn, &first_id)
            .unwrap()
            .unwrap();
        assert_eq!(first.content, "Contracts deployed");

        assert_eq!(CampaignUpdate::delete_by_id(&mut conn, &first_id).unwrap(), 1);
        assert_eq!(
            CampaignUpdate::find_by_campaign(&mut conn, &campaign.id)
                .unwrap()
                .len(),
            1
        );
    }
}

