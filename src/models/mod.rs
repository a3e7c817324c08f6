use crate::error::StoreError;
use crate::models::campaign::{Campaign, NewCampaign};
use crate::models::campaign_payout::CampaignPayout;
use crate::models::campaign_update::CampaignUpdate;
use crate::models::donation::{Donation, DonationFilter, DonationStatus};
use crate::models::query::Aggregate;
use crate::models::user::{NewUser, User, UserChanges};
use crate::models::wallet::{NewWallet, Wallet, MANUAL_PROVIDER};
use crate::routes::CreateCampaign;
use crate::utils::{campaign_description, end_date_after};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations};
use itertools::Itertools;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod account;
pub mod campaign;
pub mod campaign_payout;
pub mod campaign_update;
pub mod donation;
pub mod query;
pub mod schema;
pub mod session;
pub mod user;
pub mod verification_token;
pub mod wallet;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub const SEED_EMAIL: &str = "test@example.com";
const USAGE_PLAN_TITLE: &str = "Cryptocurrency Usage Plan";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationWithCampaign {
    #[serde(flatten)]
    pub donation: Donation,
    pub campaign: Campaign,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub wallet_addresses: BTreeMap<String, String>,
    pub total_donated: f64,
    pub campaigns: Vec<Campaign>,
    pub donations: Vec<DonationWithCampaign>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignDetail {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub creator: Option<User>,
    pub updates: Vec<CampaignUpdate>,
    pub payouts: Vec<CampaignPayout>,
    pub donation_stats: Aggregate,
    pub donation_count: i64,
    pub days_left: i64,
    pub percent_funded: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedCampaign {
    pub campaign: Campaign,
    pub updates: Vec<CampaignUpdate>,
    pub needs_wallet_setup: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub users: i64,
    pub campaigns: i64,
    pub donations: i64,
}

pub fn get_user_profile(
    conn: &mut PgConnection,
    user_id: &str,
) -> anyhow::Result<Option<UserProfile>> {
    conn.transaction(|conn| {
        let Some(user) = User::find_by_id(conn, user_id)? else {
            return Ok(None);
        };

        let wallet_addresses = Wallet::find_by_user(conn, &user.id)?
            .into_iter()
            .map(|w| (w.wallet_type, w.address))
            .collect();
        let campaigns = Campaign::find_by_user(conn, &user.id)?;
        let donations = Donation::find_by_user_with_campaign(conn, &user.id)?
            .into_iter()
            .map(|(donation, campaign)| DonationWithCampaign { donation, campaign })
            .collect();
        let total_donated = Donation::total_by_user(conn, &user.id)?;

        Ok(Some(UserProfile {
            user,
            wallet_addresses,
            total_donated,
            campaigns,
            donations,
        }))
    })
}

/// Makes the user's wallets match `addresses` (wallet type -> address).
/// Types missing from the map are deleted, entries with an empty address
/// are left alone.
pub fn sync_wallets(
    conn: &mut PgConnection,
    user_id: &str,
    addresses: &BTreeMap<String, String>,
) -> anyhow::Result<Vec<Wallet>> {
    conn.transaction(|conn| {
        if User::find_by_id(conn, user_id)?.is_none() {
            return Err(StoreError::not_found("User", user_id).into());
        }

        let keep = addresses.keys().map(String::as_str).collect_vec();
        let removed = Wallet::delete_many_except(conn, user_id, &keep)?;
        if removed > 0 {
            info!("Removed {removed} wallets for user {user_id}");
        }

        for (wallet_type, address) in addresses.iter().filter(|(_, a)| !a.trim().is_empty()) {
            Wallet::upsert(
                conn,
                &NewWallet {
                    address: address.trim(),
                    wallet_type,
                    provider: Some(MANUAL_PROVIDER),
                    user_id,
                },
            )?;
        }

        Wallet::find_by_user(conn, user_id)
    })
}

pub fn get_campaign_detail(
    conn: &mut PgConnection,
    campaign_id: &str,
    now: NaiveDateTime,
) -> anyhow::Result<Option<CampaignDetail>> {
    conn.transaction(|conn| {
        let Some(campaign) = Campaign::find_by_id(conn, campaign_id)? else {
            return Ok(None);
        };

        let creator = User::find_by_id(conn, &campaign.user_id)?;
        let updates = CampaignUpdate::find_by_campaign(conn, &campaign.id)?;
        let payouts = CampaignPayout::find_by_campaign(conn, &campaign.id)?;
        let donation_count = Donation::count(conn, &DonationFilter::for_campaign(&campaign.id))?;
        let donation_stats = Donation::aggregate(
            conn,
            &DonationFilter::for_campaign(&campaign.id).with_status(DonationStatus::Completed),
        )?;

        Ok(Some(CampaignDetail {
            creator,
            updates,
            payouts,
            donation_stats,
            donation_count,
            days_left: campaign.days_left(now),
            percent_funded: campaign.percent_funded(),
            campaign,
        }))
    })
}

/// Creates a campaign for `payload.user_id` with the crypto usage plan as
/// its first update. The creator's wallet in the campaign currency is
/// preferred, any wallet of theirs is used otherwise.
pub fn create_campaign(
    conn: &mut PgConnection,
    payload: &CreateCampaign,
    now: NaiveDateTime,
) -> anyhow::Result<CreatedCampaign> {
    payload.validate()?;

    conn.transaction(|conn| {
        if User::find_by_id(conn, &payload.user_id)?.is_none() {
            return Err(StoreError::not_found("User", payload.user_id.as_str()).into());
        }

        let currency = payload.currency();
        let wallet = Wallet::find_preferred(conn, &payload.user_id, currency)?;
        let needs_wallet_setup = wallet.is_none();

        let description = campaign_description(
            &payload.short_description,
            &payload.detailed_description,
            &payload.creator_name,
            &payload.contact_email,
            currency,
            payload.website.as_deref(),
            payload.social_media.as_deref(),
        );

        let new_campaign = NewCampaign {
            title: payload.title.trim(),
            description: &description,
            goal: payload.amount,
            image: payload.image_url.as_deref().filter(|s| !s.is_empty()),
            end_date: Some(end_date_after(now, payload.duration)),
            category: Some(payload.category.as_str()),
            user_id: &payload.user_id,
            target_currency: Some(currency),
            creator_wallet_address: wallet.as_ref().map(|w| w.address.as_str()),
        };

        let (campaign, updates) = Campaign::create_with_update(
            conn,
            &new_campaign,
            USAGE_PLAN_TITLE,
            &payload.crypto_usage_plan,
        )?;

        info!(
            "Created campaign {} for user {} (wallet setup needed: {needs_wallet_setup})",
            campaign.id, campaign.user_id
        );

        Ok(CreatedCampaign {
            campaign,
            updates,
            needs_wallet_setup,
        })
    })
}

/// Saves the profile form for the signed in user. The session id may not
/// exist yet, so the row is looked up by id or email and created when
/// missing. Wallets are only synced when `wallet_addresses` is given.
pub fn update_user_profile(
    conn: &mut PgConnection,
    user_id: &str,
    email: Option<&str>,
    changes: &UserChanges,
    wallet_addresses: Option<&BTreeMap<String, String>>,
) -> anyhow::Result<User> {
    conn.transaction(|conn| {
        let existing = match email {
            Some(email) => User::find_by_id_or_email(conn, user_id, email)?,
            None => User::find_by_id(conn, user_id)?,
        };

        let user = match existing {
            Some(user) => User::update(conn, &user.id, changes)?
                .ok_or_else(|| StoreError::not_found("User", user.id.as_str()))?,
            None => {
                let user = User::create(
                    conn,
                    NewUser {
                        id: user_id,
                        name: changes.name.as_deref(),
                        email,
                        image: changes.image.as_deref(),
                        bio: changes.bio.as_deref(),
                    },
                )?;
                info!("Created user {} while saving their profile", user.id);
                user
            }
        };

        if let Some(addresses) = wallet_addresses {
            sync_wallets(conn, &user.id, addresses)?;
        }

        Ok(user)
    })
}

/// Top settled donations of a campaign. Unknown campaigns are not found
/// rather than an empty board.
pub fn get_campaign_leaderboard(
    conn: &mut PgConnection,
    campaign_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<Donation>> {
    conn.transaction(|conn| {
        if Campaign::find_by_id(conn, campaign_id)?.is_none() {
            return Err(StoreError::not_found("Campaign", campaign_id).into());
        }

        Donation::leaderboard(conn, campaign_id, limit)
    })
}

/// Returns whether a user was deleted.
pub fn delete_user(conn: &mut PgConnection, user_id: &str) -> anyhow::Result<bool> {
    conn.transaction(|conn| {
        let count = User::delete_by_id(conn, user_id)?;
        Ok(count > 0)
    })
}

pub fn get_counts(conn: &mut PgConnection) -> anyhow::Result<StoreCounts> {
    conn.transaction(|conn| {
        Ok(StoreCounts {
            users: User::get_user_count(conn)?,
            campaigns: Campaign::get_campaign_count(conn)?,
            donations: Donation::get_donation_count(conn)?,
        })
    })
}

pub fn seed(conn: &mut PgConnection) -> anyhow::Result<User> {
    User::upsert_by_email(
        conn,
        SEED_EMAIL,
        Some("Test User"),
        Some("https://ui-avatars.com/api/?name=Test+User"),
    )
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use crate::models::campaign::NewCampaign;
    use chrono::Timelike;
    use diesel::Connection;
    use diesel_migrations::MigrationHarness;
    use std::sync::Once;

    static MIGRATE: Once = Once::new();

    /// A connection inside a transaction that is never committed.
    pub fn test_conn() -> PgConnection {
        dotenv::dotenv().ok();
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        MIGRATE.call_once(|| {
            let mut conn = PgConnection::establish(&url).expect("could not connect to database");
            conn.run_pending_migrations(MIGRATIONS)
                .expect("migrations could not run");
        });

        let mut conn = PgConnection::establish(&url).expect("could not connect to database");
        conn.begin_test_transaction()
            .expect("could not begin test transaction");
        conn
    }

    /// Current time truncated to what a TIMESTAMP column round-trips.
    pub fn test_now() -> NaiveDateTime {
        chrono::Utc::now()
            .naive_utc()
            .with_nanosecond(0)
            .expect("valid nanosecond")
    }

    pub fn create_test_user(conn: &mut PgConnection, email: &str) -> User {
        User::upsert_by_email(conn, email, Some("Test"), None).unwrap()
    }

    pub fn create_test_campaign(
        conn: &mut PgConnection,
        user_id: &str,
        title: &str,
        goal: f64,
    ) -> Campaign {
        Campaign::create(
            conn,
            &NewCampaign {
                title,
                description: "test campaign",
                goal,
                image: None,
                end_date: None,
                category: Some("Testing"),
                user_id,
                target_currency: Some("ETH"),
                creator_wallet_address: None,
            },
        )
        .unwrap()
    }
}
