//! Typed client for the upstream API
//!
//! Wraps the rate-limited transport with per-endpoint request building,
//! envelope decoding, and classification. Callers receive either typed data
//! or a [`Classification`]-derived outcome; raw payload codes never leave
//! this module.

use crate::api::classifier::{classify, AmbiguityReason, Classification, Endpoint, FatalCause};
use crate::api::transport::{build_http_client, Transport, TransportError};
use crate::api::types::{payload_code, CatalogEntry, GamesPage, UserRecord};
use crate::config::ApiConfig;
use crate::ArenaError;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Result of a nickname lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// The nickname currently maps to this identity
    Resolved { uid: String },

    /// The nickname does not map to any identity right now
    Unresolved,
}

/// Result of a games-list fetch
#[derive(Debug)]
pub enum GamesOutcome {
    /// One page of matches, possibly with a pagination token
    Page(GamesPage),

    /// Endpoint-specific ambiguity; the recovery protocol decides what to do
    Ambiguous(AmbiguityReason),
}

/// Result of a per-game participant fetch
#[derive(Debug)]
pub enum GameDetailOutcome {
    /// The full participant list
    Participants(Vec<crate::api::types::GameRecord>),

    /// The match is expired or not yet published server-side
    Missing,
}

/// Client for the upstream game API
pub struct ApiClient {
    base_url: Url,
    transport: Transport,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ArenaError> {
        let base_url = Url::parse(&config.base_url)?;
        let client = build_http_client(Duration::from_secs(config.timeout_secs))?;
        let transport = Transport::new(
            client,
            Duration::from_millis(config.min_interval_ms),
            config.max_retries,
            config.api_key(),
        );
        Ok(Self {
            base_url,
            transport,
        })
    }

    fn url_for(&self, path: &str) -> Result<Url, ArenaError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ArenaError::UrlParse(url::ParseError::EmptyHost))?;
            segments.pop_if_empty();
            for segment in path.split('/') {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    async fn fetch_envelope(
        &self,
        endpoint: Endpoint,
        url: &Url,
        headers: &[(&str, &str)],
    ) -> Result<(Classification, Value), ArenaError> {
        let body = self
            .transport
            .get_json(url.as_str(), headers)
            .await
            .map_err(|err| annotate_transport_error(endpoint, err))?;
        // Some endpoints (the catalogs) omit the envelope code on success.
        let code = payload_code(&body).unwrap_or(200);
        Ok((classify(endpoint, code), body))
    }

    /// Resolves a public nickname to the player's stable identity.
    pub async fn lookup_nickname(&self, nickname: &str) -> Result<LookupOutcome, ArenaError> {
        let mut url = self.url_for("v1/user/nickname")?;
        url.query_pairs_mut().append_pair("query", nickname);

        let (classification, body) = self
            .fetch_envelope(Endpoint::NicknameLookup, &url, &[])
            .await?;
        match classification {
            Classification::Success => {
                let user: Option<UserRecord> = body
                    .get("user")
                    .cloned()
                    .and_then(|value| serde_json::from_value(value).ok());
                match user.and_then(|u| u.user_id).filter(|uid| !uid.is_empty()) {
                    Some(uid) => Ok(LookupOutcome::Resolved { uid }),
                    // A success envelope without a usable identity behaves
                    // like a miss; the upstream produces this for players
                    // who deleted their account.
                    None => Ok(LookupOutcome::Unresolved),
                }
            }
            Classification::Unresolved => Ok(LookupOutcome::Unresolved),
            Classification::Ambiguous(_) => unreachable!("classifier never marks lookups ambiguous"),
            Classification::Fatal(cause) => Err(cause.into()),
        }
    }

    /// Fetches one page of a player's match list.
    pub async fn user_games(
        &self,
        uid: &str,
        next_token: Option<&str>,
    ) -> Result<GamesOutcome, ArenaError> {
        let url = self.url_for(&format!("v1/user/games/uid/{}", uid))?;
        // Pagination uses a request header, not a query parameter.
        let headers: Vec<(&str, &str)> = match next_token {
            Some(token) => vec![("next", token)],
            None => vec![],
        };

        let (classification, body) = self
            .fetch_envelope(Endpoint::UserGames, &url, &headers)
            .await?;
        match classification {
            Classification::Success => {
                let page: GamesPage = serde_json::from_value(body)?;
                Ok(GamesOutcome::Page(page))
            }
            Classification::Ambiguous(reason) => Ok(GamesOutcome::Ambiguous(reason)),
            Classification::Unresolved => {
                unreachable!("classifier never marks the games list unresolved")
            }
            Classification::Fatal(cause) => Err(cause.into()),
        }
    }

    /// Fetches the full participant list for a match.
    pub async fn game_detail(&self, game_id: i64) -> Result<GameDetailOutcome, ArenaError> {
        let url = self.url_for(&format!("v1/games/{}", game_id))?;

        let (classification, body) = self
            .fetch_envelope(Endpoint::GameDetail, &url, &[])
            .await?;
        match classification {
            Classification::Success => {
                let page: GamesPage = serde_json::from_value(body)?;
                Ok(GameDetailOutcome::Participants(page.user_games))
            }
            Classification::Unresolved => Ok(GameDetailOutcome::Missing),
            Classification::Ambiguous(_) => {
                unreachable!("classifier never marks game detail ambiguous")
            }
            Classification::Fatal(cause) => Err(cause.into()),
        }
    }

    /// Fetches the official character catalog.
    pub async fn character_catalog(&self) -> Result<Vec<CatalogEntry>, ArenaError> {
        self.catalog("v2/data/CharacterAttributes").await
    }

    /// Fetches the official item catalogs (armor and weapons combined).
    pub async fn item_catalog(&self) -> Result<Vec<CatalogEntry>, ArenaError> {
        let mut entries = self.catalog("v2/data/ItemArmor").await?;
        entries.extend(self.catalog("v2/data/ItemWeapon").await?);
        Ok(entries)
    }

    async fn catalog(&self, path: &str) -> Result<Vec<CatalogEntry>, ArenaError> {
        let url = self.url_for(path)?;
        let (classification, body) = self.fetch_envelope(Endpoint::Catalog, &url, &[]).await?;
        match classification {
            Classification::Success => {
                let entries = body
                    .get("data")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().cloned().map(CatalogEntry).collect())
                    .unwrap_or_default();
                Ok(entries)
            }
            Classification::Fatal(cause) => Err(cause.into()),
            _ => Ok(Vec::new()),
        }
    }
}

/// Attaches the endpoint identity to transport errors whose own taxonomy is
/// already fatal, upgrading credential and path failures into attributable
/// fatal causes.
fn annotate_transport_error(endpoint: Endpoint, err: TransportError) -> ArenaError {
    match err {
        TransportError::PathNotFound { url } => {
            ArenaError::Fatal(FatalCause::PathNotFound { endpoint, url })
        }
        TransportError::Unauthorized { .. } => {
            ArenaError::Fatal(FatalCause::Unauthorized { endpoint })
        }
        TransportError::Throttled { attempts, .. } => {
            ArenaError::Fatal(FatalCause::RetriesExhausted { endpoint, attempts })
        }
        other => ArenaError::Transport(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;

    fn test_client(base: &str) -> ApiClient {
        let config = ApiConfig {
            base_url: base.to_string(),
            api_key_env: None,
            min_interval_ms: 0,
            max_retries: 3,
            timeout_secs: 10,
        };
        ApiClient::new(&config).unwrap()
    }

    #[test]
    fn url_for_joins_paths_against_the_base() {
        let client = test_client("https://api.example.io");
        let url = client.url_for("v1/user/games/uid/abc").unwrap();
        assert_eq!(url.as_str(), "https://api.example.io/v1/user/games/uid/abc");
    }

    #[test]
    fn url_for_tolerates_trailing_slash_in_base() {
        let client = test_client("https://api.example.io/");
        let url = client.url_for("v1/games/42").unwrap();
        assert_eq!(url.as_str(), "https://api.example.io/v1/games/42");
    }
}
