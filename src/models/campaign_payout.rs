use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::campaign::Campaign;
use super::query::new_id;
use super::schema::campaign_payouts;
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl core::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PayoutStatus::Pending => write!(f, "pending"),
            PayoutStatus::Processing => write!(f, "processing"),
            PayoutStatus::Completed => write!(f, "completed"),
            PayoutStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for PayoutStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PayoutStatus::Pending),
            "processing" => Ok(PayoutStatus::Processing),
            "completed" => Ok(PayoutStatus::Completed),
            "failed" => Ok(PayoutStatus::Failed),
            _ => Err(StoreError::Validation(format!("invalid payout status: {s}"))),
        }
    }
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
pub struct CampaignPayout {
    pub id: String,
    pub campaign_id: String,
    pub amount: f64,
    pub currency: String,
    pub wallet_address: String,
    pub transaction_id: Option<String>,
    status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = campaign_payouts)]
pub struct NewCampaignPayout<'a> {
    pub campaign_id: &'a str,
    pub amount: f64,
    pub currency: &'a str,
    pub wallet_address: &'a str,
    pub transaction_id: Option<&'a str>,
    pub status: String,
}

impl CampaignPayout {
    /// Stored status text that is not a known status is a validation error.
    pub fn status(&self) -> Result<PayoutStatus, StoreError> {
        PayoutStatus::from_str(&self.status)
    }

    pub fn create(
        conn: &mut PgConnection,
        new_payout: &NewCampaignPayout,
    ) -> anyhow::Result<Self> {
        if !new_payout.amount.is_finite() || new_payout.amount <= 0.0 {
            return Err(StoreError::Validation(format!(
                "payout amount must be positive, got {}",
                new_payout.amount
            ))
            .into());
        }
        PayoutStatus::from_str(&new_payout.status)?;

        let payout = diesel::insert_into(campaign_payouts::table)
            .values((campaign_payouts::id.eq(new_id()), new_payout))
            .get_result::<Self>(conn)?;

        Ok(payout)
    }

    pub fn count(conn: &mut PgConnection) -> anyhow::Result<i64> {
        Ok(campaign_payouts::table.count().get_result(conn)?)
    }

    pub fn find_by_id(conn: &mut PgConnection, id: &str) -> anyhow::Result<Option<Self>> {
        Ok(campaign_payouts::table
            .filter(campaign_payouts::id.eq(id))
            .first::<Self>(conn)
            .optional()?)
    }

    pub fn find_by_campaign(
        conn: &mut PgConnection,
        campaign_id: &str,
    ) -> anyhow::Result<Vec<Self>> {
        Ok(campaign_payouts::table
            .filter(campaign_payouts::campaign_id.eq(campaign_id))
            .order(campaign_payouts::created_at.desc())
            .load::<Self>(conn)?)
    }

    pub fn find_by_transaction_id(
        conn: &mut PgConnection,
        transaction_id: &str,
    ) -> anyhow::Result<Option<Self>> {
        Ok(campaign_payouts::table
            .filter(campaign_payouts::transaction_id.eq(transaction_id))
            .first::<Self>(conn)
            .optional()?)
    }

    pub fn update_status(
        conn: &mut PgConnection,
        id: &str,
        status: PayoutStatus,
    ) -> anyhow::Result<Option<Self>> {
        Ok(
            diesel::update(campaign_payouts::table.filter(campaign_payouts::id.eq(id)))
                .set((
                    campaign_payouts::status.eq(status.to_string()),
                    campaign_payouts::updated_at.eq(diesel::dsl::now),
                ))
                .get_result::<Self>(conn)
                .optional()?,
        )
    }

    pub fn delete_by_id(conn: &mut PgConnection, id: &str) -> anyhow::Result<usize> {
        Ok(
            diesel::delete(campaign_payouts::table.filter(campaign_payouts::id.eq(id)))
                .execute(conn)?,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::test_utils::{create_test_campaign, create_test_user, test_conn};

    #[test]
    fn test_payout_status_parse() {
        assert_eq!(PayoutStatus::from_str("processing").unwrap(), PayoutStatus::Processing);
        assert_eq!(PayoutStatus::Completed.to_string(), "completed");
        assert!(PayoutStatus::from_str("done").is_err());
    }

    #[test]
    fn test_record_payout() {
        let mut conn = test_conn();
        let user = create_test_user(&mut conn, "payee@example.com");
        let campaign = create_test_campaign(&mut conn, &user.id, "Payout", 10.0);

        let payout = CampaignPayout::create(
            &mut conn,
            &NewCampaignPayout {
                campaign_id: &campaign.id,
                amount: 12.5,
                currency: "ETH",
                wallet_address: "0x1234",
                transaction_id: Some("wd-1"),
                status: PayoutStatus::Processing.to_string(),
            },
        )
        .unwrap();
        assert_eq!(payout.status().unwrap(), PayoutStatus::Processing);

        let found = CampaignPayout::find_by_transaction_id(&mut conn, "wd-1")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, payout.id);

        let done = CampaignPayout::update_status(&mut conn, &payout.id, PayoutStatus::Completed)
            .unwrap()
            .unwrap();
        assert_eq!(done.status().unwrap(), PayoutStatus::Completed);
        assert_eq!(
            CampaignPayout::find_by_campaign(&mut conn, &campaign.id)
                .unwrap()
                .len(),
            1
        );

        let zero = CampaignPayout::create(
            &mut conn,
            &NewCampaignPayout {
                campaign_id: &campaign.id,
                amount: 0.0,
                currency: "ETH",
                wallet_address: "0x1234",
                transaction_id: None,
                status: PayoutStatus::Pending.to_string(),
            },
        );
        assert!(zero.is_err());
    }

    #[test]
    fn test_unknown_stored_status_is_rejected() {
        let mut conn = test_conn();
        let user = create_test_user(&mut conn, "payout-check@example.com");
        let campaign = create_test_campaign(&mut conn, &user.id, "Payout check", 10.0);
        let payout = CampaignPayout::create(
            &mut conn,
            &NewCampaignPayout {
                campaign_id: &campaign.id,
                amount: 1.0,
                currency: "ETH",
                wallet_address: "0x1234",
                transaction_id: None,
                status: PayoutStatus::Pending.to_string(),
            },
        )
        .unwrap();

        let stale = CampaignPayout {
            status: "settled".to_string(),
            ..payout.clone()
        };
        assert!(matches!(stale.status(), Err(StoreError::Validation(_))));

        let bad = CampaignPayout::create(
            &mut conn,
            &NewCampaignPayout {
                campaign_id: &campaign.id,
                amount: 1.0,
                currency: "ETH",
                wallet_address: "0x1234",
                transaction_id: None,
                status: "settled".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(
            bad.downcast_ref::<StoreError>(),
            Some(StoreError::Validation(_))
        ));

        let target = campaign_payouts::table.filter(campaign_payouts::id.eq(&payout.id));
        let res = diesel::update(target)
            .set(campaign_payouts::status.eq("settled"))
            .execute(&mut conn);
        assert!(res.is_err());
    }
}
