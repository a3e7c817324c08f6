use crate::error::{classify, StoreError};
use crate::models::campaign::{Campaign, CampaignFilter, CampaignOrderBy, CampaignSummary};
use crate::models::donation::{Donation, DonationFilter, NewDonation, DEFAULT_LEADERBOARD_SIZE};
use crate::models::query::{Page, Pagination, SortOrder};
use crate::models::user::{User, UserChanges};
use crate::models::wallet::Wallet;
use crate::models::{CampaignDetail, CreatedCampaign, StoreCounts, UserProfile};
use crate::State;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::PgConnection;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Currency a campaign is raised in when the form leaves it out.
pub const DEFAULT_CURRENCY: &str = "USD";

pub(crate) fn handle_anyhow_error(err: anyhow::Error) -> (StatusCode, String) {
    error!("Error: {err:?}");
    let status = match classify(&err) {
        Some(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        Some(StoreError::UniqueViolation(_)) | Some(StoreError::ForeignKeyViolation(_)) => {
            StatusCode::CONFLICT
        }
        Some(StoreError::Pool(_)) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, format!("{err}"))
}

fn not_found(what: &str) -> (StatusCode, String) {
    let reason = format!("The {what} you're searching for could not be found.");
    (
        StatusCode::NOT_FOUND,
        format!("{{\"status\":\"ERROR\",\"reason\":\"{reason}\"}}"),
    )
}

fn get_conn(
    state: &State,
) -> anyhow::Result<PooledConnection<ConnectionManager<PgConnection>>> {
    Ok(state.db_pool.get().map_err(StoreError::from)?)
}

fn now() -> chrono::NaiveDateTime {
    Utc::now().naive_utc()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCampaigns {
    pub category: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

impl ListCampaigns {
    fn filter(&self) -> CampaignFilter {
        CampaignFilter {
            category: self.category.clone(),
            search: self.search.clone(),
            ..CampaignFilter::listing()
        }
    }

    fn order(&self) -> SortOrder {
        self.order
            .as_deref()
            .and_then(|o| SortOrder::from_str(o).ok())
            .unwrap_or_default()
    }

    fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.limit)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaderboardParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaign {
    pub user_id: String,
    pub title: String,
    pub category: String,
    pub currency: Option<String>,
    pub amount: f64,
    pub duration: i64,
    pub short_description: String,
    pub detailed_description: String,
    pub crypto_usage_plan: String,
    pub creator_name: String,
    pub contact_email: String,
    pub website: Option<String>,
    pub social_media: Option<String>,
    pub image_url: Option<String>,
}

impl CreateCampaign {
    pub fn currency(&self) -> &str {
        self.currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CURRENCY)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        let required = [
            ("title", &self.title),
            ("category", &self.category),
            ("shortDescription", &self.short_description),
            ("detailedDescription", &self.detailed_description),
            ("cryptoUsagePlan", &self.crypto_usage_plan),
            ("creatorName", &self.creator_name),
            ("contactEmail", &self.contact_email),
        ];
        let missing = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(StoreError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(StoreError::Validation(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        if self.duration <= 0 {
            return Err(StoreError::Validation(format!(
                "duration must be at least one day, got {}",
                self.duration
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDonation {
    pub campaign_id: String,
    pub amount: f64,
    pub currency: String,
    pub user_id: Option<String>,
    pub wallet_id: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    pub crypto_type: Option<String>,
    pub payment_address: Option<String>,
    pub usd_equivalent: Option<f64>,
}

impl CreateDonation {
    pub fn into_new_donation(self) -> NewDonation {
        let mut new_donation = NewDonation::new(&self.campaign_id, self.amount, &self.currency)
            .with_usd_equivalent(self.usd_equivalent.unwrap_or_default());
        new_donation.user_id = self.user_id;
        new_donation.wallet_id = self.wallet_id;
        new_donation.message = self.message.filter(|m| !m.trim().is_empty());
        new_donation.is_anonymous = self.is_anonymous;
        new_donation.crypto_type = self.crypto_type;
        new_donation.payment_address = self.payment_address;
        new_donation
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncWallets {
    pub wallet_addresses: BTreeMap<String, String>,
}

/// Profile form. `email` is the signed in user's address, used to find a
/// row created before the session id existed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    pub email: Option<String>,
    pub username: Option<String>,
    pub profile_picture: Option<String>,
    pub bio: Option<String>,
    pub wallet_addresses: Option<BTreeMap<String, String>>,
}

impl UpdateProfile {
    pub fn changes(&self) -> UserChanges {
        UserChanges {
            name: self.username.clone(),
            image: self.profile_picture.clone().filter(|p| !p.is_empty()),
            bio: self.bio.clone(),
            ..Default::default()
        }
    }
}

pub(crate) fn list_campaigns_impl(
    params: ListCampaigns,
    state: &State,
) -> anyhow::Result<Page<CampaignSummary>> {
    let mut conn = get_conn(state)?;
    Campaign::find_summaries(
        &mut conn,
        &params.filter(),
        CampaignOrderBy::from_param(params.sort_by.as_deref()),
        params.order(),
        params.pagination(),
        now(),
    )
}

pub async fn list_campaigns(
    Query(params): Query<ListCampaigns>,
    Extension(state): Extension<State>,
) -> Result<Json<Page<CampaignSummary>>, (StatusCode, String)> {
    match list_campaigns_impl(params, &state) {
        Ok(page) => Ok(Json(page)),
        Err(e) => Err(handle_anyhow_error(e)),
    }
}

pub(crate) fn create_campaign_impl(
    payload: CreateCampaign,
    state: &State,
) -> anyhow::Result<CreatedCampaign> {
    let mut conn = get_conn(state)?;
    crate::models::create_campaign(&mut conn, &payload, now())
}

pub async fn create_campaign(
    Extension(state): Extension<State>,
    Json(payload): Json<CreateCampaign>,
) -> Result<Json<CreatedCampaign>, (StatusCode, String)> {
    match create_campaign_impl(payload, &state) {
        Ok(created) => Ok(Json(created)),
        Err(e) => Err(handle_anyhow_error(e)),
    }
}

pub async fn get_campaign(
    Path(id): Path<String>,
    Extension(state): Extension<State>,
) -> Result<Json<CampaignDetail>, (StatusCode, String)> {
    let res = get_conn(&state)
        .and_then(|mut conn| crate::models::get_campaign_detail(&mut conn, &id, now()));

    match res {
        Ok(Some(detail)) => Ok(Json(detail)),
        Ok(None) => Err(not_found("campaign")),
        Err(e) => Err(handle_anyhow_error(e)),
    }
}

pub(crate) fn get_campaign_donations_impl(
    campaign_id: &str,
    params: PageParams,
    state: &State,
) -> anyhow::Result<Page<Donation>> {
    let mut conn = get_conn(state)?;
    if Campaign::find_by_id(&mut conn, campaign_id)?.is_none() {
        return Err(StoreError::not_found("Campaign", campaign_id).into());
    }

    Donation::find_many(
        &mut conn,
        &DonationFilter::for_campaign(campaign_id),
        Pagination::new(params.page, params.limit),
    )
}

pub async fn get_campaign_donations(
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
    Extension(state): Extension<State>,
) -> Result<Json<Page<Donation>>, (StatusCode, String)> {
    match get_campaign_donations_impl(&id, params, &state) {
        Ok(page) => Ok(Json(page)),
        Err(e) => Err(handle_anyhow_error(e)),
    }
}

pub async fn get_campaign_leaderboard(
    Path(id): Path<String>,
    Query(params): Query<LeaderboardParams>,
    Extension(state): Extension<State>,
) -> Result<Json<Vec<Donation>>, (StatusCode, String)> {
    let limit = params.limit.unwrap_or(DEFAULT_LEADERBOARD_SIZE);
    let res = get_conn(&state)
        .and_then(|mut conn| crate::models::get_campaign_leaderboard(&mut conn, &id, limit));

    match res {
        Ok(leaders) => Ok(Json(leaders)),
        Err(e) => Err(handle_anyhow_error(e)),
    }
}

pub(crate) fn create_donation_impl(
    payload: CreateDonation,
    state: &State,
) -> anyhow::Result<Donation> {
    let mut conn = get_conn(state)?;
    if Campaign::find_by_id(&mut conn, &payload.campaign_id)?.is_none() {
        return Err(StoreError::not_found("Campaign", payload.campaign_id.as_str()).into());
    }

    let donation = Donation::create(&mut conn, &payload.into_new_donation())?;
    info!(
        "Recorded donation {} of {} {} to campaign {}",
        donation.id, donation.amount, donation.currency, donation.campaign_id
    );

    Ok(donation)
}

pub async fn create_donation(
    Extension(state): Extension<State>,
    Json(payload): Json<CreateDonation>,
) -> Result<Json<Donation>, (StatusCode, String)> {
    match create_donation_impl(payload, &state) {
        Ok(donation) => Ok(Json(donation)),
        Err(e) => Err(handle_anyhow_error(e)),
    }
}

pub async fn get_donation(
    Path(id): Path<String>,
    Extension(state): Extension<State>,
) -> Result<Json<Donation>, (StatusCode, String)> {
    let res = get_conn(&state).and_then(|mut conn| Donation::find_by_id(&mut conn, &id));

    match res {
        Ok(Some(donation)) => Ok(Json(donation)),
        Ok(None) => Err(not_found("donation")),
        Err(e) => Err(handle_anyhow_error(e)),
    }
}

pub async fn get_user(
    Path(id): Path<String>,
    Extension(state): Extension<State>,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    let res = get_conn(&state).and_then(|mut conn| crate::models::get_user_profile(&mut conn, &id));

    match res {
        Ok(Some(profile)) => Ok(Json(profile)),
        Ok(None) => Err(not_found("user")),
        Err(e) => Err(handle_anyhow_error(e)),
    }
}

pub(crate) fn update_user_impl(
    user_id: &str,
    payload: UpdateProfile,
    state: &State,
) -> anyhow::Result<User> {
    let mut conn = get_conn(state)?;
    let user = crate::models::update_user_profile(
        &mut conn,
        user_id,
        payload.email.as_deref().filter(|e| !e.trim().is_empty()),
        &payload.changes(),
        payload.wallet_addresses.as_ref(),
    )?;
    info!("Updated profile of user {}", user.id);
    Ok(user)
}

pub async fn update_user(
    Path(id): Path<String>,
    Extension(state): Extension<State>,
    Json(payload): Json<UpdateProfile>,
) -> Result<Json<User>, (StatusCode, String)> {
    match update_user_impl(&id, payload, &state) {
        Ok(user) => Ok(Json(user)),
        Err(e) => Err(handle_anyhow_error(e)),
    }
}

pub(crate) fn sync_wallets_impl(
    user_id: &str,
    payload: SyncWallets,
    state: &State,
) -> anyhow::Result<Vec<Wallet>> {
    let mut conn = get_conn(state)?;
    let wallets = crate::models::sync_wallets(&mut conn, user_id, &payload.wallet_addresses)?;
    info!("Synced {} wallets for user {user_id}", wallets.len());
    Ok(wallets)
}

pub async fn sync_wallets(
    Path(id): Path<String>,
    Extension(state): Extension<State>,
    Json(payload): Json<SyncWallets>,
) -> Result<Json<Vec<Wallet>>, (StatusCode, String)> {
    match sync_wallets_impl(&id, payload, &state) {
        Ok(wallets) => Ok(Json(wallets)),
        Err(e) => Err(handle_anyhow_error(e)),
    }
}

pub async fn delete_user(
    Path(id): Path<String>,
    Extension(state): Extension<State>,
) -> Result<Json<()>, (StatusCode, String)> {
    let res = get_conn(&state).and_then(|mut conn| crate::models::delete_user(&mut conn, &id));

    match res {
        Ok(true) => {
            info!("Deleted user {id}");
            Ok(Json(()))
        }
        Ok(false) => Err(not_found("user")),
        Err(e) => Err(handle_anyhow_error(e)),
    }
}

pub async fn count(
    Extension(state): Extension<State>,
) -> Result<Json<StoreCounts>, (StatusCode, String)> {
    let res = get_conn(&state).and_then(|mut conn| crate::models::get_counts(&mut conn));

    match res {
        Ok(counts) => Ok(Json(counts)),
        Err(e) => Err(handle_anyhow_error(e)),
    }
}
