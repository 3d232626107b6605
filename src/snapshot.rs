use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::spotify::Playlist;
use crate::utils::sanitize_component;

/// Writes `<root>/<playlist name>/<YYYY-MM-DD>.json` and returns its path.
pub async fn save_snapshot(
    root: &Path,
    playlist: &Playlist,
    date: NaiveDate,
) -> std::io::Result<PathBuf> {
    let dir = root.join(sanitize_component(&playlist.name));
    fs::create_dir_all(&dir).await?;

    let path = dir.join(format!("{}.json", date.format("%Y-%m-%d")));
    let body = serde_json::to_vec_pretty(playlist)?;
    fs::write(&path, body).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify::Track;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_snapshot_is_dated_and_named_after_playlist() {
        let dir = tempdir().unwrap();
        let playlist = Playlist {
            id: "37i9dQZEVXbrgWTCKQ0E8A".to_string(),
            name: "Release Radar".to_string(),
            owner: Some("Spotify".to_string()),
            tracks: vec![Track {
                number: 1,
                title: "First".to_string(),
                artist: "A".to_string(),
                duration_secs: 201,
            }],
        };
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();

        let path = save_snapshot(dir.path(), &playlist, date).await.unwrap();
        assert_eq!(path, dir.path().join("Release Radar").join("2026-10-16.json"));

        let saved: Playlist =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved.name, "Release Radar");
        assert_eq!(saved.tracks, playlist.tracks);
    }
}
