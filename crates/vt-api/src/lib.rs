//! Activity HTTP API integration for voicetime.
//!
//! [`Client`] implements [`vt_core::Store`] on top of the activity service's
//! REST routes, so the scheduler can run against the same backend the Discord
//! bot writes to.

pub mod dto;

use std::fmt;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use vt_core::{
    AggregateId, Event, GuildId, MonthBucket, MonthTimeSpent, Store, StoreError, TimeSpent, User,
    UserId, leaderboard,
};

use crate::dto::{ActivityDto, MonthTimeSpentDto, TimeSpentDto, UserDto};

/// Default request timeout for API calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Size of the leaderboard the `topten` route returns.
pub const TOP_TEN: usize = 10;

/// API client errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The configured base URL is unusable.
    #[error("invalid base URL: {reason}")]
    InvalidBaseUrl { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned a non-success status.
    #[error("{route} returned {status}: {body}")]
    Status {
        route: String,
        status: StatusCode,
        body: String,
    },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<ApiError> for StoreError {
    fn from(err: ApiError) -> Self {
        match &err {
            ApiError::Request(_) => Self::Unavailable(err.to_string()),
            ApiError::Status { status, .. } if status.is_server_error() => {
                Self::Unavailable(err.to_string())
            }
            ApiError::InvalidResponse(_) => Self::InvalidData(err.to_string()),
            ApiError::InvalidBaseUrl { .. } | ApiError::ClientBuild(_) | ApiError::Status { .. } => {
                Self::Backend(err.to_string())
            }
        }
    }
}

/// Activity API client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client for the API rooted at `base_url` (e.g. `http://localhost:5000`).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is empty or not http(s), or if the HTTP
    /// client fails to build.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiError::InvalidBaseUrl {
                reason: "base URL cannot be empty",
            });
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::InvalidBaseUrl {
                reason: "base URL must start with http:// or https://",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::ClientBuild)?;

        let token = token.filter(|token| !token.trim().is_empty());
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The guild's top ten all-time totals.
    pub async fn top_ten(&self, guild_id: GuildId) -> Result<Vec<TimeSpent>, ApiError> {
        let rows: Vec<TimeSpentDto> = self
            .get_json(&format!("api/TimeSpent/topten/{guild_id}"), &[])
            .await?;
        let entries = rows.into_iter().map(TimeSpent::from).collect();
        Ok(leaderboard(entries, TOP_TEN))
    }

    pub async fn user(&self, user_id: UserId) -> Result<Option<User>, ApiError> {
        let user: Option<UserDto> = self.get_optional(&format!("api/User/{user_id}"), &[]).await?;
        Ok(user.map(User::from))
    }

    async fn guild_events(
        &self,
        user_id: UserId,
        guild_id: GuildId,
    ) -> Result<Vec<Event>, ApiError> {
        let rows: Vec<ActivityDto> = self
            .get_json(
                "api/Activities/guild",
                &[
                    ("userId", user_id.to_string()),
                    ("guildId", guild_id.to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(Event::from).collect())
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{route}", self.base_url)
    }

    fn request(&self, method: Method, route: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, self.url(route));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        route: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.get_optional(route, query)
            .await?
            .ok_or_else(|| ApiError::Status {
                route: route.to_string(),
                status: StatusCode::NOT_FOUND,
                body: String::new(),
            })
    }

    /// GET that maps 404 to `None`.
    async fn get_optional<T: DeserializeOwned>(
        &self,
        route: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, ApiError> {
        tracing::debug!(route, "GET");
        let response = self.request(Method::GET, route).query(query).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                route: route.to_string(),
                status,
                body,
            });
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|err| ApiError::InvalidResponse(format!("{route}: {err}")))
    }

    /// Sends `body` and returns the raw response, for callers that interpret the status.
    async fn send_json<B: Serialize + Sync>(
        &self,
        method: Method,
        route: &str,
        body: &B,
    ) -> Result<(StatusCode, String), ApiError> {
        tracing::debug!(route, %method, "sending");
        let response = self.request(method, route).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    /// PUT to `{route}/{id}`, or POST to `route` when the aggregate is new.
    ///
    /// A rejected PUT (400 or 404) means the ID does not match a stored record.
    async fn upsert<B, T>(
        &self,
        route: &str,
        id: Option<AggregateId>,
        body: &B,
    ) -> Result<Option<T>, UpsertError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let (method, target) = match id {
            Some(id) => (Method::PUT, format!("{route}/{id}")),
            None => (Method::POST, route.to_string()),
        };
        let (status, text) = self.send_json(method, &target, body).await?;

        if let Some(id) = id {
            if status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND {
                return Err(UpsertError::Conflict(id));
            }
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                route: target,
                status,
                body: text,
            }
            .into());
        }
        // PUT answers 204 No Content
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|err| ApiError::InvalidResponse(format!("{target}: {err}")).into())
    }
}

enum UpsertError {
    Conflict(AggregateId),
    Api(ApiError),
}

impl From<ApiError> for UpsertError {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}

impl From<UpsertError> for StoreError {
    fn from(err: UpsertError) -> Self {
        match err {
            UpsertError::Conflict(id) => Self::Conflict { id },
            UpsertError::Api(err) => err.into(),
        }
    }
}

impl Store for Client {
    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows: Vec<UserDto> = self.get_json("api/User", &[]).await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn list_guild_ids_for_user(&self, user_id: UserId) -> Result<Vec<GuildId>, StoreError> {
        let ids: Vec<u64> = self
            .get_json("api/Activities/guildIds", &[("userId", user_id.to_string())])
            .await?;
        Ok(ids.into_iter().map(GuildId::new).collect())
    }

    async fn list_events(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        month: Option<MonthBucket>,
    ) -> Result<Vec<Event>, StoreError> {
        let mut events = self.guild_events(user_id, guild_id).await?;
        if let Some(month) = month {
            events.retain(|event| month.matches(event.created));
        }
        Ok(events)
    }

    async fn fetch_time_spent(
        &self,
        user_id: UserId,
        guild_id: GuildId,
    ) -> Result<Option<TimeSpent>, StoreError> {
        let row: Option<TimeSpentDto> = self
            .get_optional(&format!("api/TimeSpent/userId/{user_id}/guildId/{guild_id}"), &[])
            .await?;
        Ok(row.map(TimeSpent::from))
    }

    async fn upsert_time_spent(&self, aggregate: TimeSpent) -> Result<TimeSpent, StoreError> {
        let created: Option<TimeSpentDto> = self
            .upsert("api/TimeSpent", aggregate.id, &TimeSpentDto::from(&aggregate))
            .await?;
        Ok(match created {
            Some(dto) if aggregate.id.is_none() => TimeSpent {
                id: TimeSpent::from(dto).id,
                ..aggregate
            },
            _ => aggregate,
        })
    }

    async fn fetch_month_time_spent(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        month: MonthBucket,
    ) -> Result<Option<MonthTimeSpent>, StoreError> {
        let row: Option<MonthTimeSpentDto> = self
            .get_optional(
                "api/MonthTimeSpent/single",
                &[
                    ("userId", user_id.to_string()),
                    ("guildId", guild_id.to_string()),
                    ("monthId", month.to_string()),
                ],
            )
            .await?;
        row.map(MonthTimeSpent::try_from)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn upsert_month_time_spent(
        &self,
        aggregate: MonthTimeSpent,
    ) -> Result<MonthTimeSpent, StoreError> {
        let created: Option<MonthTimeSpentDto> = self
            .upsert(
                "api/MonthTimeSpent",
                aggregate.id,
                &MonthTimeSpentDto::from(&aggregate),
            )
            .await?;
        let id = match created {
            Some(dto) if aggregate.id.is_none() => MonthTimeSpent::try_from(dto)?.id,
            _ => aggregate.id,
        };
        Ok(MonthTimeSpent { id, ..aggregate })
    }

    async fn current_month_bucket(&self) -> Result<MonthBucket, StoreError> {
        self.month_bucket("api/MonthTimeSpent/currentMonthId").await
    }

    async fn last_month_bucket(&self) -> Result<MonthBucket, StoreError> {
        self.month_bucket("api/MonthTimeSpent/lastMonthId").await
    }
}

impl Client {
    async fn month_bucket(&self, route: &str) -> Result<MonthBucket, StoreError> {
        let raw: i64 = self.get_json(route, &[]).await?;
        MonthBucket::try_from(raw).map_err(|err| StoreError::InvalidData(err.to_string()))
    }
}
