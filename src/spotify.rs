use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::token::Token;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{endpoint} returned {status}")]
    Status {
        endpoint: String,
        status: StatusCode,
    },
    #[error("Could not decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        source: serde_json::Error,
    },
    #[error("Playlist '{0}' has no tracks")]
    NoTracks(String),
    #[error("Not a playlist id, URI or URL: '{0}'")]
    InvalidPlaylist(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub number: usize,
    pub title: String,
    pub artist: String,
    pub duration_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub owner: Option<String>,
    pub tracks: Vec<Track>,
}

#[derive(Deserialize)]
struct PlaylistObject {
    id: String,
    name: String,
    #[serde(default)]
    owner: Option<OwnerObject>,
    tracks: TrackPage,
}

#[derive(Deserialize)]
struct OwnerObject {
    #[serde(default)]
    display_name: Option<String>,
    id: String,
}

#[derive(Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<TrackItem>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Deserialize)]
struct TrackItem {
    #[serde(default)]
    track: Option<TrackObject>,
}

#[derive(Deserialize)]
struct TrackObject {
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    #[serde(default)]
    duration_ms: u64,
}

#[derive(Deserialize)]
struct ArtistObject {
    name: String,
}

/// Minimal Spotify Web API client for checking tokens and reading playlists.
pub struct SpotifyClient {
    client: Client,
    base_url: String,
}

impl SpotifyClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        token: &Token,
        url: &str,
    ) -> Result<T, ApiError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", token.as_str()))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: url.to_string(),
                status,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|source| ApiError::Decode {
            endpoint: url.to_string(),
            source,
        })
    }

    /// A token is good when it can list the current user's playlists.
    pub async fn validate(&self, token: &Token) -> Result<(), ApiError> {
        let url = format!("{}/v1/me/playlists?limit=1", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", token.as_str()))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(ApiError::Status {
                endpoint: url,
                status,
            }),
        }
    }

    /// Fetches a playlist and every page of its tracks.
    pub async fn playlist(&self, token: &Token, playlist_id: &str) -> Result<Playlist, ApiError> {
        let url = format!("{}/v1/playlists/{}", self.base_url, playlist_id);
        let object: PlaylistObject = self.get_json(token, &url).await?;

        let mut tracks = Vec::new();
        collect_tracks(&mut tracks, object.tracks.items);
        let mut next = object.tracks.next;
        while let Some(page_url) = next {
            let page: TrackPage = self.get_json(token, &page_url).await?;
            collect_tracks(&mut tracks, page.items);
            next = page.next;
        }

        if tracks.is_empty() {
            return Err(ApiError::NoTracks(object.name));
        }

        Ok(Playlist {
            id: object.id,
            name: object.name,
            owner: object.owner.map(|o| o.display_name.unwrap_or(o.id)),
            tracks,
        })
    }
}

fn collect_tracks(tracks: &mut Vec<Track>, items: Vec<TrackItem>) {
    for track in items.into_iter().filter_map(|item| item.track) {
        tracks.push(Track {
            number: tracks.len() + 1,
            title: track.name,
            artist: track
                .artists
                .into_iter()
                .next()
                .map(|a| a.name)
                .unwrap_or_default(),
            duration_secs: track.duration_ms / 1000,
        });
    }
}

fn is_playlist_id(candidate: &str) -> bool {
    !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Accepts a bare id, a `spotify:playlist:<id>` URI, or an open.spotify.com link.
pub fn parse_playlist_id(input: &str) -> Result<String, ApiError> {
    let input = input.trim();
    let invalid = || ApiError::InvalidPlaylist(input.to_string());

    if let Some(rest) = input.strip_prefix("spotify:") {
        let mut parts = rest.split(':');
        while let Some(part) = parts.next() {
            if part == "playlist" {
                return parts
                    .next()
                    .filter(|id| is_playlist_id(id))
                    .map(str::to_string)
                    .ok_or_else(invalid);
            }
        }
        return Err(invalid());
    }

    if input.contains("://") {
        let url = Url::parse(input).map_err(|_| invalid())?;
        let mut segments = url.path_segments().ok_or_else(invalid)?;
        while let Some(segment) = segments.next() {
            if segment == "playlist" {
                return segments
                    .next()
                    .filter(|id| is_playlist_id(id))
                    .map(str::to_string)
                    .ok_or_else(invalid);
            }
        }
        return Err(invalid());
    }

    if is_playlist_id(input) {
        Ok(input.to_string())
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    const GOOD: &str = "good-token";

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == format!("Bearer {}", GOOD))
            .unwrap_or(false)
    }

    async fn me_playlists(headers: HeaderMap) -> Result<Json<Value>, AxumStatus> {
        if !authorized(&headers) {
            return Err(AxumStatus::UNAUTHORIZED);
        }
        Ok(Json(json!({ "items": [], "total": 0 })))
    }

    async fn playlist(
        State(base): State<String>,
        Path(id): Path<String>,
        headers: HeaderMap,
    ) -> Result<Json<Value>, AxumStatus> {
        if !authorized(&headers) {
            return Err(AxumStatus::UNAUTHORIZED);
        }
        match id.as_str() {
            "37i9dQZEVXbrgWTCKQ0E8A" => Ok(Json(json!({
                "id": &id,
                "name": "Release Radar",
                "owner": { "id": "spotify", "display_name": "Spotify" },
                "tracks": {
                    "items": [
                        { "track": { "name": "First", "artists": [{ "name": "A" }, { "name": "B" }], "duration_ms": 201_500 } },
                        { "track": null },
                        { "track": { "name": "Second", "artists": [{ "name": "C" }], "duration_ms": 180_000 } }
                    ],
                    "next": format!("{}/page2", base)
                }
            }))),
            "empty" => Ok(Json(json!({
                "id": &id,
                "name": "Nothing Here",
                "tracks": { "items": [], "next": null }
            }))),
            _ => Err(AxumStatus::NOT_FOUND),
        }
    }

    async fn page2(headers: HeaderMap) -> Result<Json<Value>, AxumStatus> {
        if !authorized(&headers) {
            return Err(AxumStatus::UNAUTHORIZED);
        }
        Ok(Json(json!({
            "items": [
                { "track": { "name": "Third", "artists": [{ "name": "D" }], "duration_ms": 59_999 } }
            ],
            "next": null
        })))
    }

    async fn stub_api() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = Router::new()
            .route("/v1/me/playlists", get(me_playlists))
            .route("/v1/playlists/:id", get(playlist))
            .route("/page2", get(page2))
            .with_state(base.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    fn token(raw: &str) -> Token {
        Token::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_validate_accepts_working_token() {
        let client = SpotifyClient::new(stub_api().await);
        client.validate(&token(GOOD)).await.unwrap();
    }

    #[tokio::test]
    async fn test_validate_rejects_expired_token() {
        let client = SpotifyClient::new(stub_api().await);
        let err = client.validate(&token("expired")).await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: StatusCode::UNAUTHORIZED, .. }));
    }

    #[tokio::test]
    async fn test_playlist_follows_pages_and_skips_missing_tracks() {
        let client = SpotifyClient::new(stub_api().await);
        let playlist = client
            .playlist(&token(GOOD), "37i9dQZEVXbrgWTCKQ0E8A")
            .await
            .unwrap();

        assert_eq!(playlist.name, "Release Radar");
        assert_eq!(playlist.owner.as_deref(), Some("Spotify"));
        assert_eq!(
            playlist.tracks,
            vec![
                Track { number: 1, title: "First".into(), artist: "A".into(), duration_secs: 201 },
                Track { number: 2, title: "Second".into(), artist: "C".into(), duration_secs: 180 },
                Track { number: 3, title: "Third".into(), artist: "D".into(), duration_secs: 59 },
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_playlist_is_an_error() {
        let client = SpotifyClient::new(stub_api().await);
        let err = client.playlist(&token(GOOD), "empty").await.unwrap_err();
        assert!(matches!(err, ApiError::NoTracks(name) if name == "Nothing Here"));
    }

    #[tokio::test]
    async fn test_unknown_playlist_reports_status() {
        let client = SpotifyClient::new(stub_api().await);
        let err = client.playlist(&token(GOOD), "missing").await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: StatusCode::NOT_FOUND, .. }));
    }

    #[test]
    fn test_parse_playlist_id_forms() {
        let id = "37i9dQZEVXbrgWTCKQ0E8A";
        assert_eq!(parse_playlist_id(id).unwrap(), id);
        assert_eq!(parse_playlist_id(&format!("spotify:playlist:{}", id)).unwrap(), id);
        assert_eq!(
            parse_playlist_id(&format!("spotify:user:spotify:playlist:{}", id)).unwrap(),
            id
        );
        assert_eq!(
            parse_playlist_id(&format!(
                "https://open.spotify.com/user/spotify/playlist/{}?si=l5Pk_MH6TjOpKOUNhVm_zg",
                id
            ))
            .unwrap(),
            id
        );
        assert_eq!(
            parse_playlist_id(&format!("https://open.spotify.com/playlist/{}", id)).unwrap(),
            id
        );
    }

    #[test]
    fn test_parse_playlist_id_rejects_garbage() {
        for input in [
            "",
            "not an id",
            "https://open.spotify.com/album/123",
            "spotify:track:abc",
            "https://open.spotify.com/playlist/",
        ] {
            assert!(
                matches!(parse_playlist_id(input), Err(ApiError::InvalidPlaylist(_))),
                "accepted {:?}",
                input
            );
        }
    }
}
