//! Atomic script bodies and their registered handles.

use std::collections::HashMap;
use std::path::Path;

use redis::aio::ConnectionLike;

use crate::{ScriptSource, StoreError};

/// The atomic scripts the engine relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptName {
    Enqueue,
    Dequeue,
    GetStatus,
    UpdateStatus,
}

impl ScriptName {
    pub const ALL: [ScriptName; 4] = [
        ScriptName::Enqueue,
        ScriptName::Dequeue,
        ScriptName::GetStatus,
        ScriptName::UpdateStatus,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScriptName::Enqueue => "enqueue",
            ScriptName::Dequeue => "dequeue",
            ScriptName::GetStatus => "get_status",
            ScriptName::UpdateStatus => "update_status",
        }
    }

    fn embedded(self) -> &'static str {
        match self {
            ScriptName::Enqueue => include_str!("scripts/enqueue.lua"),
            ScriptName::Dequeue => include_str!("scripts/dequeue.lua"),
            ScriptName::GetStatus => include_str!("scripts/get_status.lua"),
            ScriptName::UpdateStatus => include_str!("scripts/update_status.lua"),
        }
    }
}

impl std::fmt::Display for ScriptName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A script registered with the store, addressed by its SHA1 digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptHandle {
    pub sha: String,
    pub source: String,
}

/// Read every script body from `source`.
///
/// Any unreadable file fails the whole load.
pub async fn load_sources(
    source: &ScriptSource,
) -> Result<HashMap<ScriptName, String>, StoreError> {
    let mut bodies = HashMap::with_capacity(ScriptName::ALL.len());
    for name in ScriptName::ALL {
        let body = match source {
            ScriptSource::Embedded => name.embedded().to_string(),
            ScriptSource::Directory(dir) => read_script(dir, name).await?,
        };
        bodies.insert(name, body);
    }
    Ok(bodies)
}

async fn read_script(dir: &Path, name: ScriptName) -> Result<String, StoreError> {
    let path = dir.join(format!("{}.lua", name.as_str()));
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| StoreError::ScriptLoad { name, source })
}

/// Registered script handles keyed by name.
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    handles: HashMap<ScriptName, ScriptHandle>,
}

impl ScriptRegistry {
    /// Load every script and register it with the store.
    pub async fn register<C: ConnectionLike>(
        conn: &mut C,
        source: &ScriptSource,
    ) -> Result<Self, StoreError> {
        let bodies = load_sources(source).await?;
        let mut handles = HashMap::with_capacity(bodies.len());
        for (name, body) in bodies {
            let sha = script_load(conn, &body).await?;
            tracing::debug!("Registered script {} as {}", name, sha);
            handles.insert(name, ScriptHandle { sha, source: body });
        }
        Ok(Self { handles })
    }

    /// Handle for a registered script.
    pub fn handle(&self, name: ScriptName) -> Option<&ScriptHandle> {
        self.handles.get(&name)
    }
}

/// `SCRIPT LOAD` a body and return its digest.
pub async fn script_load<C: ConnectionLike>(
    conn: &mut C,
    body: &str,
) -> Result<String, StoreError> {
    let sha: String = redis::cmd("SCRIPT")
        .arg("LOAD")
        .arg(body)
        .query_async(conn)
        .await?;
    Ok(sha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embedded_sources_cover_every_script() {
        let bodies = load_sources(&ScriptSource::Embedded).await.unwrap();
        assert_eq!(bodies.len(), ScriptName::ALL.len());
        assert!(bodies[&ScriptName::Enqueue].contains("ZADD"));
        assert!(bodies[&ScriptName::Dequeue].contains("ZRANGE"));
    }

    #[tokio::test]
    async fn test_directory_sources_are_read() {
        let dir = tempfile::tempdir().unwrap();
        for name in ScriptName::ALL {
            let path = dir.path().join(format!("{}.lua", name.as_str()));
            std::fs::write(path, format!("return '{}'", name.as_str())).unwrap();
        }

        let bodies = load_sources(&ScriptSource::Directory(dir.path().to_path_buf()))
            .await
            .unwrap();
        assert_eq!(bodies[&ScriptName::GetStatus], "return 'get_status'");
    }

    #[tokio::test]
    async fn test_missing_script_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("enqueue.lua"), "return 1").unwrap();

        let err = load_sources(&ScriptSource::Directory(dir.path().to_path_buf()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ScriptLoad { .. }));
    }
}
