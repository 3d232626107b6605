use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::token::Token;

/// Single-file store for the last working bearer token.
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `None` when nothing usable is cached.
    pub async fn load(&self) -> std::io::Result<Option<Token>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Token::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn store(&self, token: &Token) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Owner-only before the token is written, including a file left by an older run.
        let mut file = open_owner_only(&self.path).await?;
        file.write_all(token.as_str().as_bytes()).await?;
        file.flush().await
    }

    pub async fn clear(&self) -> std::io::Result<()> {
        match fs::remove_file(&self.path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(unix)]
async fn open_owner_only(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::PermissionsExt;
    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await?;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
        .await?;
    Ok(file)
}

#[cfg(not(unix))]
async fn open_owner_only(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path).await
}
