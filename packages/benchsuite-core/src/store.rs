//! Durable session map
//!
//! The whole map is one bincode blob under the data directory. It is read
//! once by [`SessionStore::load`] and overwritten by [`SessionStore::store`];
//! nothing in between touches the disk.

use crate::error::{BenchsuiteError, Result};
use crate::plugin::PluginRegistry;
use crate::session::{Session, SessionRecord};
use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub const SESSIONS_FILE: &str = "sessions.dat";

pub struct SessionStore {
    path: PathBuf,
    registry: Arc<PluginRegistry>,
    sessions: HashMap<Uuid, Session>,
    loaded: bool,
}

impl SessionStore {
    pub fn new(data_dir: &Path, registry: Arc<PluginRegistry>) -> Self {
        Self {
            path: data_dir.join(SESSIONS_FILE),
            registry,
            sessions: HashMap::new(),
            loaded: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the backing file. A missing file starts an empty map; repeated
    /// calls are no-ops.
    pub fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }

        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No session file, starting empty");
                self.loaded = true;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let records: Vec<SessionRecord> = bincode::deserialize(&bytes)?;
        for record in records {
            let session = Session::from_record(record, &self.registry)?;
            self.sessions.insert(session.id, session);
        }
        self.loaded = true;

        info!(
            path = %self.path.display(),
            sessions = self.sessions.len(),
            "Sessions loaded"
        );
        Ok(())
    }

    /// Overwrite the backing file with the full in-memory map.
    pub fn store(&self) -> Result<()> {
        let mut records = self
            .sessions
            .values()
            .map(Session::to_record)
            .collect::<Result<Vec<_>>>()?;
        records.sort_by_key(|r| r.created);

        let bytes = bincode::serialize(&records)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("dat.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;

        debug!(
            path = %self.path.display(),
            sessions = records.len(),
            "Sessions stored"
        );
        Ok(())
    }

    pub fn add(&mut self, session: Session) -> &mut Session {
        let id = session.id;
        self.sessions.entry(id).or_insert(session)
    }

    pub fn remove(&mut self, id: Uuid) -> Result<Session> {
        self.sessions
            .remove(&id)
            .ok_or(BenchsuiteError::UndefinedSession(id))
    }

    pub fn get(&self, id: Uuid) -> Result<&Session> {
        self.sessions
            .get(&id)
            .ok_or(BenchsuiteError::UndefinedSession(id))
    }

    pub fn get_mut(&mut self, id: Uuid) -> Result<&mut Session> {
        self.sessions
            .get_mut(&id)
            .ok_or(BenchsuiteError::UndefinedSession(id))
    }

    /// Sessions in no particular order.
    pub fn list(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigDocument;
    use crate::plugin::registry::Bound;
    use crate::plugin::{EnvironmentRequest, ExecutionEnvironment, Provider, ProviderPlugin};
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize)]
    struct Fixed {
        region: String,
    }

    impl Provider for Fixed {
        fn execution_environment(&mut self, _: &EnvironmentRequest) -> Result<ExecutionEnvironment> {
            Ok(ExecutionEnvironment::new(self.region.clone()))
        }
        fn destroy_service(&mut self) -> Result<()> {
            Ok(())
        }
        fn properties(&self) -> BTreeMap<String, String> {
            BTreeMap::from([("region".to_string(), self.region.clone())])
        }
        fn save_state(&self) -> Result<serde_json::Value> {
            Ok(serde_json::to_value(self)?)
        }
    }

    impl ProviderPlugin for Fixed {
        fn load_from_config(_: &ConfigDocument, variant: &str) -> Result<Self> {
            Ok(Self {
                region: variant.to_string(),
            })
        }
        fn restore(state: serde_json::Value) -> Result<Self> {
            Ok(serde_json::from_value(state)?)
        }
    }

    fn registry() -> Arc<PluginRegistry> {
        let mut registry = PluginRegistry::new();
        registry.register_provider::<Fixed>("test.Fixed");
        Arc::new(registry)
    }

    fn session(region: &str) -> Session {
        Session::new(Bound {
            type_ref: "test.Fixed".to_string(),
            instance: Box::new(Fixed {
                region: region.to_string(),
            }),
        })
    }

    #[test]
    fn test_load_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let mut store = SessionStore::new(dir.path(), registry());

        store.load().unwrap();
        store.load().unwrap();

        assert!(store.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_store_and_reload() {
        let dir = TempDir::new().unwrap();
        let mut store = SessionStore::new(dir.path(), registry());
        store.load().unwrap();
        let a = store.add(session("eu-west-1")).id;
        let b = store.add(session("us-east-1")).id;
        store.store().unwrap();

        let mut reloaded = SessionStore::new(dir.path(), registry());
        reloaded.load().unwrap();

        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.get(a).unwrap().provider().properties()["region"],
            "eu-west-1"
        );
        assert_eq!(reloaded.get(b).unwrap().provider_type_ref(), "test.Fixed");
    }

    #[test]
    fn test_store_overwrites_whole_map() {
        let dir = TempDir::new().unwrap();
        let mut store = SessionStore::new(dir.path(), registry());
        let a = store.add(session("a")).id;
        store.add(session("b"));
        store.store().unwrap();

        store.remove(a).unwrap();
        store.store().unwrap();

        let mut reloaded = SessionStore::new(dir.path(), registry());
        reloaded.load().unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(matches!(
            reloaded.get(a),
            Err(BenchsuiteError::UndefinedSession(id)) if id == a
        ));
    }

    #[test]
    fn test_corrupt_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SESSIONS_FILE), b"\xff\xff\xff\xff\xff\xff\xff\xff\xff").unwrap();

        let mut store = SessionStore::new(dir.path(), registry());
        assert!(store.load().is_err());
    }

    #[test]
    fn test_unregistered_plugin_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut store = SessionStore::new(dir.path(), registry());
        store.add(session("a"));
        store.store().unwrap();

        let mut reloaded = SessionStore::new(dir.path(), Arc::new(PluginRegistry::new()));
        assert!(matches!(
            reloaded.load(),
            Err(BenchsuiteError::PluginNotFound { .. })
        ));
    }
}
