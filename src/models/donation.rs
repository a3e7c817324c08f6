use chrono::NaiveDateTime;
use diesel::dsl::{avg, count_star, max, min, sum};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::campaign::Campaign;
use super::query::{new_id, Aggregate, GroupCount, Page, Pagination};
use super::schema::{campaigns, donations};
use crate::error::StoreError;

pub const DEFAULT_LEADERBOARD_SIZE: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Pending,
    Completed,
    Failed,
    Processed,
    Refunded,
}

/// Statuses whose money reached the platform and has not been returned.
pub const SETTLED_STATUSES: [DonationStatus; 2] =
    [DonationStatus::Completed, DonationStatus::Processed];

impl core::fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DonationStatus::Pending => write!(f, "pending"),
            DonationStatus::Completed => write!(f, "completed"),
            DonationStatus::Failed => write!(f, "failed"),
            DonationStatus::Processed => write!(f, "processed"),
            DonationStatus::Refunded => write!(f, "refunded"),
        }
    }
}

impl FromStr for DonationStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DonationStatus::Pending),
            "completed" => Ok(DonationStatus::Completed),
            "failed" => Ok(DonationStatus::Failed),
            "processed" => Ok(DonationStatus::Processed),
            "refunded" => Ok(DonationStatus::Refunded),
            _ => Err(StoreError::Validation(format!(
                "invalid donation status: {s}"
            ))),
        }
    }
}

fn status_strings(statuses: &[DonationStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.to_string()).collect()
}

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
#[diesel(belongs_to(Campaign, foreign_key = campaign_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: String,
    pub amount: f64,
    pub currency: String,
    status: String,
    pub usd_equivalent: f64,
    pub message: Option<String>,
    pub is_anonymous: bool,
    pub transaction_hash: Option<String>,
    pub crypto_type: Option<String>,
    pub payment_id: Option<String>,
    pub payment_address: Option<String>,
    pub refunded: bool,
    pub user_id: Option<String>,
    pub campaign_id: String,
    pub wallet_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = donations)]
pub struct NewDonation {
    pub id: String,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub usd_equivalent: f64,
    pub message: Option<String>,
    pub is_anonymous: bool,
    pub transaction_hash: Option<String>,
    pub crypto_type: Option<String>,
    pub payment_address: Option<String>,
    pub user_id: Option<String>,
    pub campaign_id: String,
    pub wallet_id: Option<String>,
}

impl NewDonation {
    /// A pending donation with a fresh id.
    pub fn new(campaign_id: &str, amount: f64, currency: &str) -> Self {
        NewDonation {
            id: new_id(),
            amount,
            currency: currency.to_string(),
            status: DonationStatus::Pending.to_string(),
            usd_equivalent: 0.0,
            message: None,
            is_anonymous: false,
            transaction_hash: None,
            crypto_type: None,
            payment_address: None,
            user_id: None,
            campaign_id: campaign_id.to_string(),
            wallet_id: None,
        }
    }

    pub fn with_status(mut self, status: DonationStatus) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn with_usd_equivalent(mut self, usd: f64) -> Self {
        self.usd_equivalent = usd;
        self
    }

    fn validate(&self) -> Result<(), StoreError> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(StoreError::Validation(format!(
                "donation amount must be positive, got {}",
                self.amount
            )));
        }
        if self.currency.trim().is_empty() {
            return Err(StoreError::Validation(
                "donation currency is empty".to_string(),
            ));
        }
        if !self.usd_equivalent.is_finite() || self.usd_equivalent < 0.0 {
            return Err(StoreError::Validation(format!(
                "usd equivalent must not be negative, got {}",
                self.usd_equivalent
            )));
        }
        DonationStatus::from_str(&self.status)?;
        Ok(())
    }
}

#[derive(AsChangeset, Default, Debug, Clone)]
#[diesel(table_name = donations)]
pub struct DonationChanges {
    pub status: Option<String>,
    pub transaction_hash: Option<String>,
    pub payment_id: Option<String>,
    pub refunded: Option<bool>,
    pub usd_equivalent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationFilter {
    pub campaign_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<DonationStatus>,
    pub refunded: Option<bool>,
}

impl DonationFilter {
    pub fn for_campaign(campaign_id: &str) -> Self {
        DonationFilter {
            campaign_id: Some(campaign_id.to_string()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: DonationStatus) -> Self {
        self.status = Some(status);
        self
    }
}

fn filtered(filter: &DonationFilter) -> donations::BoxedQuery<'static, Pg> {
    let mut query = donations::table.into_boxed();

    if let Some(campaign_id) = filter.campaign_id.clone() {
        query = query.filter(donations::campaign_id.eq(campaign_id));
    }
    if let Some(user_id) = filter.user_id.clone() {
        query = query.filter(donations::user_id.eq(user_id));
    }
    if let Some(status) = filter.status {
        query = query.filter(donations::status.eq(status.to_string()));
    }
    if let Some(refunded) = filter.refunded {
        query = query.filter(donations::refunded.eq(refunded));
    }

    query
}

impl Donation {
    /// Stored status text that is not a known status is a validation error.
    pub fn status(&self) -> Result<DonationStatus, StoreError> {
        DonationStatus::from_str(&self.status)
    }

    pub fn create(conn: &mut PgConnection, new_donation: &NewDonation) -> anyhow::Result<Self> {
        new_donation.validate()?;

        let donation = diesel::insert_into(donations::table)
            .values(new_donation)
            .get_result::<Self>(conn)?;

        Ok(donation)
    }

    pub fn create_many(
        conn: &mut PgConnection,
        new_donations: &[NewDonation],
    ) -> anyhow::Result<usize> {
        if new_donations.is_empty() {
            return Ok(0);
        }
        for new_donation in new_donations {
            new_donation.validate()?;
        }

        Ok(diesel::insert_into(donations::table)
            .values(new_donations)
            .execute(conn)?)
    }

    pub fn find_by_id(conn: &mut PgConnection, id: &str) -> anyhow::Result<Option<Self>> {
        Ok(donations::table
            .filter(donations::id.eq(id))
            .first::<Self>(conn)
            .optional()?)
    }

    pub fn find_first(
        conn: &mut PgConnection,
        filter: &DonationFilter,
    ) -> anyhow::Result<Option<Self>> {
        Ok(filtered(filter)
            .order((donations::created_at.desc(), donations::id.asc()))
            .first::<Self>(conn)
            .optional()?)
    }

    pub fn count(conn: &mut PgConnection, filter: &DonationFilter) -> anyhow::Result<i64> {
        Ok(filtered(filter).count().get_result(conn)?)
    }

    pub fn get_donation_count(conn: &mut PgConnection) -> anyhow::Result<i64> {
        Self::count(conn, &DonationFilter::default())
    }

    pub fn find_many(
        conn: &mut PgConnection,
        filter: &DonationFilter,
        pagination: Pagination,
    ) -> anyhow::Result<Page<Self>> {
        conn.transaction(|conn| {
            let total = Self::count(conn, filter)?;
            let items = filtered(filter)
                .order((donations::created_at.desc(), donations::id.asc()))
                .offset(pagination.skip())
                .limit(pagination.take())
                .load::<Self>(conn)?;

            Ok(Page::new(items, total, pagination))
        })
    }

    pub fn find_by_transaction_hash(
        conn: &mut PgConnection,
        transaction_hash: &str,
    ) -> anyhow::Result<Option<Self>> {
        Ok(donations::table
            .filter(donations::transaction_hash.eq(transaction_hash))
            .first::<Self>(conn)
            .optional()?)
    }

    /// Payment gateways report back with the deposit address plus the
    /// campaign and donor they were created for.
    pub fn find_by_payment_address(
        conn: &mut PgConnection,
        payment_address: &str,
        campaign_id: &str,
        user_id: &str,
    ) -> anyhow::Result<Option<Self>> {
        Ok(donations::table
            .filter(donations::payment_address.eq(payment_address))
            .filter(donations::campaign_id.eq(campaign_id))
            .filter(donations::user_id.eq(user_id))
            .first::<Self>(conn)
            .optional()?)
    }

    pub fn find_by_wallet(conn: &mut PgConnection, wallet_id: &str) -> anyhow::Result<Vec<Self>> {
        Ok(donations::table
            .filter(donations::wallet_id.eq(wallet_id))
            .order(donations::created_at.desc())
            .load::<Self>(conn)?)
    }

    pub fn find_by_user_with_campaign(
        conn: &mut PgConnection,
        user_id: &str,
    ) -> anyhow::Result<Vec<(Self, Campaign)>> {
        Ok(donations::table
            .inner_join(campaigns::table)
            .filter(donations::user_id.eq(user_id))
            .order(donations::created_at.desc())
            .select((donations::all_columns, campaigns::all_columns))
            .load::<(Self, Campaign)>(conn)?)
    }

    pub fn update(
        conn: &mut PgConnection,
        id: &str,
        changes: &DonationChanges,
    ) -> anyhow::Result<Option<Self>> {
        if let Some(status) = changes.status.as_deref() {
            DonationStatus::from_str(status)?;
        }

        Ok(diesel::update(donations::table.filter(donations::id.eq(id)))
            .set((changes, donations::updated_at.eq(diesel::dsl::now)))
            .get_result::<Self>(conn)
            .optional()?)
    }

    pub fn update_status(
        conn: &mut PgConnection,
        id: &str,
        status: DonationStatus,
    ) -> anyhow::Result<Option<Self>> {
        Self::update(
            conn,
            id,
            &DonationChanges {
                status: Some(status.to_string()),
                ..Default::default()
            },
        )
    }

    /// Moves every donation of the campaign in status `from` to `to`.
    pub fn update_many_status(
        conn: &mut PgConnection,
        campaign_id: &str,
        from: DonationStatus,
        to: DonationStatus,
    ) -> anyhow::Result<usize> {
        Ok(diesel::update(donations::table)
            .filter(donations::campaign_id.eq(campaign_id))
            .filter(donations::status.eq(from.to_string()))
            .set((
                donations::status.eq(to.to_string()),
                donations::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)?)
    }

    pub fn mark_refunded(conn: &mut PgConnection, id: &str) -> anyhow::Result<Option<Self>> {
        Self::update(
            conn,
            id,
            &DonationChanges {
                status: Some(DonationStatus::Refunded.to_string()),
                refunded: Some(true),
                ..Default::default()
            },
        )
    }

    pub fn aggregate(
        conn: &mut PgConnection,
        filter: &DonationFilter,
    ) -> anyhow::Result<Aggregate> {
        let row = filtered(filter)
            .select((
                count_star(),
                sum(donations::amount),
                avg(donations::amount),
                min(donations::amount),
                max(donations::amount),
            ))
            .get_result::<(i64, Option<f64>, Option<f64>, Option<f64>, Option<f64>)>(conn)?;

        Ok(Aggregate::from(row))
    }

    /// Donation count and amount per campaign, for donations in `status`.
    pub fn group_by_campaign(
        conn: &mut PgConnection,
        status: DonationStatus,
    ) -> anyhow::Result<Vec<GroupCount<String>>> {
        let rows = donations::table
            .filter(donations::status.eq(status.to_string()))
            .group_by(donations::campaign_id)
            .select((donations::campaign_id, count_star(), sum(donations::amount)))
            .order(donations::campaign_id.asc())
            .load::<(String, i64, Option<f64>)>(conn)?;

        Ok(rows.into_iter().map(GroupCount::from).collect())
    }

    pub fn group_by_currency(
        conn: &mut PgConnection,
        campaign_id: &str,
    ) -> anyhow::Result<Vec<GroupCount<String>>> {
        let rows = donations::table
            .filter(donations::campaign_id.eq(campaign_id))
            .filter(donations::status.eq_any(status_strings(&SETTLED_STATUSES)))
            .group_by(donations::currency)
            .select((donations::currency, count_star(), sum(donations::amount)))
            .order(donations::currency.asc())
            .load::<(String, i64, Option<f64>)>(conn)?;

        Ok(rows.into_iter().map(GroupCount::from).collect())
    }

    /// Largest settled donations of a campaign by USD value.
    pub fn leaderboard(
        conn: &mut PgConnection,
        campaign_id: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<Self>> {
        Ok(donations::table
            .filter(donations::campaign_id.eq(campaign_id))
            .filter(donations::status.eq_any(status_strings(&SETTLED_STATUSES)))
            .order((donations::usd_equivalent.desc(), donations::created_at.asc()))
            .limit(limit.max(0))
            .load::<Self>(conn)?)
    }

    /// USD value of everything the user gave that was not failed or refunded.
    pub fn total_by_user(conn: &mut PgConnection, user_id: &str) -> anyhow::Result<f64> {
        let total: Option<f64> = donations::table
            .filter(donations::user_id.eq(user_id))
            .filter(donations::status.ne_all(status_strings(&[
                DonationStatus::Failed,
                DonationStatus::Refunded,
            ])))
            .select(sum(donations::usd_equivalent))
            .get_result(conn)?;

        Ok(total.unwrap_or_default())
    }

    pub fn delete_by_id(conn: &mut PgConnection, id: &str) -> anyhow::Result<usize> {
        Ok(diesel::delete(donations::table.filter(donations::id.eq(id))).execute(conn)?)
    }
}
