use chrono::NaiveDateTime;
use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use super::campaign_update::{CampaignUpdate, NewCampaignUpdate};
use super::query::{new_id, Page, Pagination, SortOrder};
use super::schema::{campaign_updates, campaigns, donations};
use super::user::User;
use crate::error::StoreError;
use crate::utils::{days_left, percent_funded};

/// Category value the explore page sends when no category is selected.
pub const ALL_CATEGORIES: &str = "All Categories";

#[derive(
    Associations,
    Queryable,
    Identifiable,
    Serialize,
    Deserialize,
    Debug,
    Clone,
    PartialEq,
)]
#[diesel(primary_key(id))]
#[diesel(belongs_to(User, foreign_key = user_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub title: String,
    pub description: String,
    pub goal: f64,
    pub raised: f64,
    pub image: Option<String>,
    pub end_date: Option<NaiveDateTime>,
    pub is_active: bool,
    pub category: Option<String>,
    pub user_id: String,
    pub target_currency: Option<String>,
    pub creator_wallet_address: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = campaigns)]
pub struct NewCampaign<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub goal: f64,
    pub image: Option<&'a str>,
    pub end_date: Option<NaiveDateTime>,
    pub category: Option<&'a str>,
    pub user_id: &'a str,
    pub target_currency: Option<&'a str>,
    pub creator_wallet_address: Option<&'a str>,
}

impl NewCampaign<'_> {
    fn validate(&self) -> Result<(), StoreError> {
        if self.title.trim().is_empty() {
            return Err(StoreError::Validation("campaign title is empty".to_string()));
        }
        if !self.goal.is_finite() || self.goal <= 0.0 {
            return Err(StoreError::Validation(format!(
                "campaign goal must be positive, got {}",
                self.goal
            )));
        }
        Ok(())
    }
}

#[derive(AsChangeset, Default, Debug, Clone, Deserialize)]
#[diesel(table_name = campaigns)]
#[serde(rename_all = "camelCase")]
pub struct CampaignChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub goal: Option<f64>,
    pub raised: Option<f64>,
    pub image: Option<String>,
    pub end_date: Option<NaiveDateTime>,
    pub is_active: Option<bool>,
    pub category: Option<String>,
    pub target_currency: Option<String>,
    pub creator_wallet_address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignFilter {
    pub active: Option<bool>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub user_id: Option<String>,
}

impl CampaignFilter {
    /// What the explore page shows: active campaigns only.
    pub fn listing() -> Self {
        CampaignFilter {
            active: Some(true),
            ..Default::default()
        }
    }

    fn category(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && *c != ALL_CATEGORIES)
    }

    fn search(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CampaignOrderBy {
    #[default]
    CreatedAt,
    EndDate,
    Goal,
    Raised,
    MostFunded,
}

impl FromStr for CampaignOrderBy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createdAt" => Ok(CampaignOrderBy::CreatedAt),
            "endDate" => Ok(CampaignOrderBy::EndDate),
            "goal" => Ok(CampaignOrderBy::Goal),
            "raised" => Ok(CampaignOrderBy::Raised),
            "mostFunded" => Ok(CampaignOrderBy::MostFunded),
            _ => Err(anyhow::anyhow!("Invalid CampaignOrderBy")),
        }
    }
}

impl CampaignOrderBy {
    /// Unknown sort keys sort by creation time.
    pub fn from_param(s: Option<&str>) -> Self {
        s.and_then(|s| CampaignOrderBy::from_str(s).ok())
            .unwrap_or_default()
    }
}

/// Listing row: the campaign plus what the cards render next to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSummary {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub creator_name: String,
    pub creator_image: Option<String>,
    pub donation_count: i64,
    pub days_left: i64,
    pub percent_funded: i64,
}

pub(crate) fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn filtered(filter: &CampaignFilter) -> campaigns::BoxedQuery<'static, Pg> {
    let mut query = campaigns::table.into_boxed();

    if let Some(active) = filter.active {
        query = query.filter(campaigns::is_active.eq(active));
    }
    if let Some(category) = filter.category() {
        query = query.filter(campaigns::category.eq(category.to_string()));
    }
    if let Some(search) = filter.search() {
        let pattern = format!("%{}%", escape_like(search));
        query = query.filter(
            campaigns::title
                .ilike(pattern.clone())
                .or(campaigns::description.ilike(pattern)),
        );
    }
    if let Some(user_id) = filter.user_id.clone() {
        query = query.filter(campaigns::user_id.eq(user_id));
    }

    query
}

fn ordered(
    query: campaigns::BoxedQuery<'static, Pg>,
    order_by: CampaignOrderBy,
    order: SortOrder,
) -> campaigns::BoxedQuery<'static, Pg> {
    let query = match (order_by, order) {
        (CampaignOrderBy::CreatedAt, SortOrder::Asc) => query.order(campaigns::created_at.asc()),
        (CampaignOrderBy::CreatedAt, SortOrder::Desc) => query.order(campaigns::created_at.desc()),
        (CampaignOrderBy::EndDate, SortOrder::Asc) => query.order(campaigns::end_date.asc()),
        (CampaignOrderBy::EndDate, SortOrder::Desc) => query.order(campaigns::end_date.desc()),
        (CampaignOrderBy::Goal, SortOrder::Asc) => query.order(campaigns::goal.asc()),
        (CampaignOrderBy::Goal, SortOrder::Desc) => query.order(campaigns::goal.desc()),
        (CampaignOrderBy::Raised | CampaignOrderBy::MostFunded, SortOrder::Asc) => {
            query.order(campaigns::raised.asc())
        }
        (CampaignOrderBy::Raised | CampaignOrderBy::MostFunded, SortOrder::Desc) => {
            query.order(campaigns::raised.desc())
        }
    };

    query.then_order_by(campaigns::id.asc())
}

impl Campaign {
    pub fn days_left(&self, now: NaiveDateTime) -> i64 {
        self.end_date.map(|end| days_left(end, now)).unwrap_or(0)
    }

    pub fn percent_funded(&self) -> i64 {
        percent_funded(self.raised, self.goal)
    }

    pub fn has_ended(&self, now: NaiveDateTime) -> bool {
        self.end_date.map(|end| end <= now).unwrap_or(false)
    }

    pub fn create(conn: &mut PgConnection, new_campaign: &NewCampaign) -> anyhow::Result<Self> {
        new_campaign.validate()?;

        let campaign = diesel::insert_into(campaigns::table)
            .values((campaigns::id.eq(new_id()), new_campaign))
            .get_result::<Self>(conn)?;

        Ok(campaign)
    }

    /// Creates the campaign and its first update in one transaction.
    pub fn create_with_update(
        conn: &mut PgConnection,
        new_campaign: &NewCampaign,
        update_title: &str,
        update_content: &str,
    ) -> anyhow::Result<(Self, Vec<CampaignUpdate>)> {
        conn.transaction(|conn| {
            let campaign = Self::create(conn, new_campaign)?;

            let update = diesel::insert_into(campaign_updates::table)
                .values(&NewCampaignUpdate::new(
                    &campaign.id,
                    update_title,
                    update_content,
                ))
                .get_result::<CampaignUpdate>(conn)?;

            Ok((campaign, vec![update]))
        })
    }

    pub fn find_by_id(conn: &mut PgConnection, id: &str) -> anyhow::Result<Option<Self>> {
        Ok(campaigns::table
            .filter(campaigns::id.eq(id))
            .first::<Self>(conn)
            .optional()?)
    }

    pub fn get_campaign_count(conn: &mut PgConnection) -> anyhow::Result<i64> {
        Self::count(conn, &CampaignFilter::default())
    }

    pub fn count(conn: &mut PgConnection, filter: &CampaignFilter) -> anyhow::Result<i64> {
        let count = filtered(filter).count().get_result(conn)?;
        Ok(count)
    }

    pub fn find_many(
        conn: &mut PgConnection,
        filter: &CampaignFilter,
        order_by: CampaignOrderBy,
        order: SortOrder,
        pagination: Pagination,
    ) -> anyhow::Result<Page<Self>> {
        conn.transaction(|conn| {
            let total = Self::count(conn, filter)?;
            let items = ordered(filtered(filter), order_by, order)
                .offset(pagination.skip())
                .limit(pagination.take())
                .load::<Self>(conn)?;

            Ok(Page::new(items, total, pagination))
        })
    }

    /// [`Campaign::find_many`] with creator and donation counts attached.
    pub fn find_summaries(
        conn: &mut PgConnection,
        filter: &CampaignFilter,
        order_by: CampaignOrderBy,
        order: SortOrder,
        pagination: Pagination,
        now: NaiveDateTime,
    ) -> anyhow::Result<Page<CampaignSummary>> {
        conn.transaction(|conn| {
            let page = Self::find_many(conn, filter, order_by, order, pagination)?;

            let ids = page.items.iter().map(|c| c.id.clone()).collect::<Vec<_>>();
            let user_ids = page
                .items
                .iter()
                .map(|c| c.user_id.clone())
                .collect::<Vec<_>>();

            let counts = Self::donation_counts(conn, &ids)?;
            let creators = User::get_by_user_ids(conn, &user_ids)?
                .into_iter()
                .map(|u| (u.id.clone(), u))
                .collect::<HashMap<_, _>>();

            Ok(page.map(|campaign| {
                let creator = creators.get(&campaign.user_id);
                CampaignSummary {
                    creator_name: creator
                        .map(|u| u.display_name().to_string())
                        .unwrap_or_else(|| "Anonymous".to_string()),
                    creator_image: creator.and_then(|u| u.image.clone()),
                    donation_count: counts.get(&campaign.id).copied().unwrap_or_default(),
                    days_left: campaign.days_left(now),
                    percent_funded: campaign.percent_funded(),
                    campaign,
                }
            }))
        })
    }

    pub fn find_by_user(conn: &mut PgConnection, user_id: &str) -> anyhow::Result<Vec<Self>> {
        Ok(campaigns::table
            .filter(campaigns::user_id.eq(user_id))
            .order(campaigns::created_at.desc())
            .load::<Self>(conn)?)
    }

    /// Active campaigns whose end date has passed.
    pub fn find_ended_active(
        conn: &mut PgConnection,
        now: NaiveDateTime,
    ) -> anyhow::Result<Vec<Self>> {
        Ok(campaigns::table
            .filter(campaigns::is_active.eq(true))
            .filter(campaigns::end_date.le(now))
            .order(campaigns::end_date.asc())
            .load::<Self>(conn)?)
    }

    /// Number of donations per campaign id. Campaigns without donations are
    /// absent from the map.
    pub fn donation_counts(
        conn: &mut PgConnection,
        ids: &[String],
    ) -> anyhow::Result<HashMap<String, i64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = donations::table
            .filter(donations::campaign_id.eq_any(ids))
            .group_by(donations::campaign_id)
            .select((donations::campaign_id, count_star()))
            .load::<(String, i64)>(conn)?;

        Ok(rows.into_iter().collect())
    }

    pub fn update(
        conn: &mut PgConnection,
        id: &str,
        changes: &CampaignChanges,
    ) -> anyhow::Result<Option<Self>> {
        if let Some(goal) = changes.goal {
            if !goal.is_finite() || goal <= 0.0 {
                return Err(StoreError::Validation(format!(
                    "campaign goal must be positive, got {goal}"
                ))
                .into());
            }
        }

        Ok(diesel::update(campaigns::table.filter(campaigns::id.eq(id)))
            .set((changes, campaigns::updated_at.eq(diesel::dsl::now)))
            .get_result::<Self>(conn)
            .optional()?)
    }

    pub fn increment_raised(
        conn: &mut PgConnection,
        id: &str,
        amount: f64,
    ) -> anyhow::Result<Option<Self>> {
        Ok(diesel::update(campaigns::table.filter(campaigns::id.eq(id)))
            .set((
                campaigns::raised.eq(campaigns::raised + amount),
                campaigns::updated_at.eq(diesel::dsl::now),
            ))
            .get_result::<Self>(conn)
            .optional()?)
    }

    pub fn set_active(conn: &mut PgConnection, id: &str, active: bool) -> anyhow::Result<usize> {
        Ok(diesel::update(campaigns::table.filter(campaigns::id.eq(id)))
            .set((
                campaigns::is_active.eq(active),
                campaigns::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)?)
    }

    /// Updates, payouts and donations are removed through the foreign keys.
    pub fn delete_by_id(conn: &mut PgConnection, id: &str) -> anyhow::Result<usize> {
        Ok(diesel::delete(campaigns::table.filter(campaigns::id.eq(id))).execute(conn)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::test_utils::{create_test_campaign, create_test_user, test_conn, test_now};
    use chrono::Duration;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_real\\"), "100\\%\\_real\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_order_by_param() {
        assert_eq!(
            CampaignOrderBy::from_param(Some("mostFunded")),
            CampaignOrderBy::MostFunded
        );
        assert_eq!(
            CampaignOrderBy::from_param(Some("whatever")),
            CampaignOrderBy::CreatedAt
        );
        assert_eq!(CampaignOrderBy::from_param(None), CampaignOrderBy::CreatedAt);
    }

    #[test]
    fn test_filter_ignores_all_categories() {
        let filter = CampaignFilter {
            category: Some(ALL_CATEGORIES.to_string()),
            search: Some("   ".to_string()),
            ..CampaignFilter::listing()
        };
        assert_eq!(filter.category(), None);
        assert_eq!(filter.search(), None);
        assert_eq!(filter.active, Some(true));
    }

    #[test]
    fn test_create_rejects_bad_goal() {
        let mut conn = test_conn();
        let user = create_test_user(&mut conn, "badgoal@example.com");

        let err = Campaign::create(
            &mut conn,
            &NewCampaign {
                title: "Nothing",
                description: "",
                goal: 0.0,
                image: None,
                end_date: None,
                category: None,
                user_id: &user.id,
                target_currency: None,
                creator_wallet_address: None,
            },
        )
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_create_with_update() {
        let mut conn = test_conn();
        let user = create_test_user(&mut conn, "creator@example.com");

        let (campaign, updates) = Campaign::create_with_update(
            &mut conn,
            &NewCampaign {
                title: "Supply chain tracking",
                description: "On-chain provenance",
                goal: 50.0,
                image: None,
                end_date: None,
                category: Some("Infrastructure"),
                user_id: &user.id,
                target_currency: Some("ETH"),
                creator_wallet_address: None,
            },
            "Cryptocurrency Usage Plan",
            "Smart contract settlement",
        )
        .unwrap();

        assert_eq!(campaign.raised, 0.0);
        assert!(campaign.is_active);
        assert_eq!(updates.len(), 1);
        assert_eq!(
            CampaignUpdate::find_by_campaign(&mut conn, &campaign.id)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_find_many_filters_and_pages() {
        let mut conn = test_conn();
        let user = create_test_user(&mut conn, "lister@example.com");

        let a = create_test_campaign(&mut conn, &user.id, "Identity platform", 25.0);
        let b = create_test_campaign(&mut conn, &user.id, "Supply Chain", 50.0);
        let c = create_test_campaign(&mut conn, &user.id, "Retired", 10.0);
        Campaign::set_active(&mut conn, &c.id, false).unwrap();
        Campaign::increment_raised(&mut conn, &a.id, 20.0).unwrap();

        let filter = CampaignFilter {
            user_id: Some(user.id.clone()),
            ..CampaignFilter::listing()
        };
        let page = Campaign::find_many(
            &mut conn,
            &filter,
            CampaignOrderBy::Goal,
            SortOrder::Asc,
            Pagination::new(Some(1), Some(1)),
        )
        .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items[0].id, a.id);

        let funded = Campaign::find_many(
            &mut conn,
            &filter,
            CampaignOrderBy::MostFunded,
            SortOrder::Desc,
            Pagination::default(),
        )
        .unwrap();
        assert_eq!(funded.items[0].id, a.id);
        assert_eq!(funded.items[0].raised, 20.0);

        let search = CampaignFilter {
            search: Some("supply".to_string()),
            ..filter.clone()
        };
        let found = Campaign::find_many(
            &mut conn,
            &search,
            CampaignOrderBy::CreatedAt,
            SortOrder::Desc,
            Pagination::default(),
        )
        .unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.items[0].id, b.id);
    }

    #[test]
    fn test_find_ended_active() {
        let mut conn = test_conn();
        let user = create_test_user(&mut conn, "ended@example.com");
        let now = test_now();

        let ended = create_test_campaign(&mut conn, &user.id, "Ended", 5.0);
        let running = create_test_campaign(&mut conn, &user.id, "Running", 5.0);
        Campaign::update(
            &mut conn,
            &ended.id,
            &CampaignChanges {
                end_date: Some(now - Duration::days(1)),
                ..Default::default()
            },
        )
        .unwrap();
        Campaign::update(
            &mut conn,
            &running.id,
            &CampaignChanges {
                end_date: Some(now + Duration::days(10)),
                ..Default::default()
            },
        )
        .unwrap();

        let found = Campaign::find_ended_active(&mut conn, now)
            .unwrap()
            .into_iter()
            .filter(|c| c.user_id == user.id)
            .collect::<Vec<_>>();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, ended.id);
        assert!(found[0].has_ended(now));
    }

    #[test]
    fn test_find_summaries() {
        use crate::models::donation::{Donation, NewDonation};
        use crate::models::user::NewUser;

        let mut conn = test_conn();
        let now = test_now();
        let creator = User::create(
            &mut conn,
            NewUser {
                id: "",
                name: None,
                email: Some("nameless@example.com"),
                image: Some("https://example.com/a.png"),
                bio: None,
            },
        )
        .unwrap();

        let quiet = create_test_campaign(&mut conn, &creator.id, "Quiet", 40.0);
        let busy = create_test_campaign(&mut conn, &creator.id, "Busy", 40.0);
        Campaign::update(
            &mut conn,
            &busy.id,
            &CampaignChanges {
                end_date: Some(now + Duration::days(3)),
                ..Default::default()
            },
        )
        .unwrap();
        Campaign::increment_raised(&mut conn, &busy.id, 10.0).unwrap();
        Donation::create_many(
            &mut conn,
            &[
                NewDonation::new(&busy.id, 4.0, "ETH"),
                NewDonation::new(&busy.id, 6.0, "ETH"),
            ],
        )
        .unwrap();

        let filter = CampaignFilter {
            user_id: Some(creator.id.clone()),
            ..CampaignFilter::listing()
        };
        let page = Campaign::find_summaries(
            &mut conn,
            &filter,
            CampaignOrderBy::Raised,
            SortOrder::Desc,
            Pagination::default(),
            now,
        )
        .unwrap();

        assert_eq!(page.total, 2);
        let busy_row = &page.items[0];
        assert_eq!(busy_row.campaign.id, busy.id);
        assert_eq!(busy_row.donation_count, 2);
        assert_eq!(busy_row.days_left, 3);
        assert_eq!(busy_row.percent_funded, 25);
        assert_eq!(busy_row.creator_name, "Anonymous");
        assert_eq!(
            busy_row.creator_image.as_deref(),
            Some("https://example.com/a.png")
        );

        let quiet_row = &page.items[1];
        assert_eq!(quiet_row.campaign.id, quiet.id);
        assert_eq!(quiet_row.donation_count, 0);
        assert_eq!(quiet_row.days_left, 0);
        assert_eq!(quiet_row.percent_funded, 0);

        let json = serde_json::to_value(quiet_row).unwrap();
        assert_eq!(json["donationCount"], 0);
        assert_eq!(json["creatorName"], "Anonymous");
        assert_eq!(json["title"], "Quiet");
    }

    #[test]
    fn test_donation_counts() {
        use crate::models::donation::{Donation, NewDonation};

        let mut conn = test_conn();
        let user = create_test_user(&mut conn, "counted@example.com");
        let a = create_test_campaign(&mut conn, &user.id, "Counted", 10.0);
        let b = create_test_campaign(&mut conn, &user.id, "Uncounted", 10.0);
        Donation::create_many(
            &mut conn,
            &[
                NewDonation::new(&a.id, 1.0, "ETH"),
                NewDonation::new(&a.id, 2.0, "ETH"),
                NewDonation::new(&a.id, 3.0, "ETH"),
            ],
        )
        .unwrap();

        let counts = Campaign::donation_counts(&mut conn, &[a.id.clone(), b.id.clone()]).unwrap();
        assert_eq!(counts.get(&a.id), Some(&3));
        assert_eq!(counts.get(&b.id), None);
        assert!(Campaign::donation_counts(&mut conn, &[]).unwrap().is_empty());
    }
}

