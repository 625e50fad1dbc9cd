//! HTTP implementation of [`AgendaApi`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::AgendaConfig;
use crate::error::{AgendaError, AgendaResult};
use crate::event::{Event, EventId, RelationKind, UserId};
use crate::remote::AgendaApi;
use crate::remote::protocol::{
    CountResponse, LoginRequest, LoginResponse, Method, Profile, RelatedEntry, Route,
};
use crate::session::SessionStore;

/// REST client for the events backend. Every call except login carries the
/// bearer token of the shared [`SessionStore`].
#[derive(Clone)]
pub struct HttpApi {
    http: reqwest::Client,
    base_url: String,
    session: SessionStore,
}

impl HttpApi {
    pub fn new(base_url: &str, session: SessionStore, timeout: Duration) -> AgendaResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgendaError::Config(format!("Could not build HTTP client: {e}")))?;

        Ok(HttpApi {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn from_config(config: &AgendaConfig, session: SessionStore) -> AgendaResult<Self> {
        Self::new(&config.api_url, session, config.request_timeout()?)
    }

    /// Build the request, failing with `Auth` before anything goes on the wire
    /// if the route needs a token and there is none.
    fn request(&self, route: &Route) -> AgendaResult<RequestBuilder> {
        let url = format!("{}{}", self.base_url, route.path());
        let builder = match route.method() {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
            Method::Delete => self.http.delete(url),
        };

        if route.requires_auth() {
            Ok(builder.bearer_auth(self.session.bearer()?))
        } else {
            Ok(builder)
        }
    }

    async fn send(&self, route: &Route, builder: RequestBuilder) -> AgendaResult<Response> {
        debug!(path = %route.path(), "Sending request");
        let resp = builder.send().await.map_err(transport_error)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(status_error(status, route, body))
    }

    async fn fetch<T: DeserializeOwned>(&self, route: Route) -> AgendaResult<T> {
        let builder = self.request(&route)?;
        let resp = self.send(&route, builder).await?;
        resp.json().await.map_err(transport_error)
    }
}

fn transport_error(e: reqwest::Error) -> AgendaError {
    if e.is_decode() {
        AgendaError::Serialization(format!("Failed to parse response: {e}"))
    } else {
        AgendaError::Network(e.to_string())
    }
}

fn status_error(status: StatusCode, route: &Route, body: String) -> AgendaError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AgendaError::Auth(format!("{} rejected the session ({})", route.path(), status))
        }
        StatusCode::NOT_FOUND => AgendaError::NotFound(route.path()),
        _ => AgendaError::Server {
            status: status.as_u16(),
            body,
        },
    }
}

#[async_trait]
impl AgendaApi for HttpApi {
    async fn login(&self, email: &str, password: &str) -> AgendaResult<LoginResponse> {
        let route = Route::Login;
        let builder = self.request(&route)?.json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        });
        let resp = self.send(&route, builder).await?;
        resp.json().await.map_err(transport_error)
    }

    async fn fetch_profile(&self, user: UserId) -> AgendaResult<Profile> {
        self.fetch(Route::Profile(user)).await
    }

    async fn list_events(&self) -> AgendaResult<Vec<Event>> {
        self.fetch(Route::Events).await
    }

    async fn attendance_count(&self, event: EventId) -> AgendaResult<u64> {
        let count: CountResponse = self.fetch(Route::AttendanceCount(event)).await?;
        Ok(count.count())
    }

    async fn list_related(&self, kind: RelationKind, user: UserId) -> AgendaResult<Vec<EventId>> {
        let entries: Vec<RelatedEntry> = self.fetch(Route::Related(kind, user)).await?;
        Ok(entries.iter().map(RelatedEntry::event_id).collect())
    }

    async fn set_related(
        &self,
        kind: RelationKind,
        user: UserId,
        event: EventId,
        member: bool,
    ) -> AgendaResult<()> {
        let route = Route::SetRelated {
            kind,
            user,
            event,
            member,
        };
        let builder = self.request(&route)?;
        self.send(&route, builder).await?;
        Ok(())
    }
}
