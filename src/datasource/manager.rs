//! Data-source registry with whole-file persistence.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;

use crate::datasource::health;
use crate::datasource::types::{DataSourceConfig, DataSourceError, DataSourceFile};

/// Holds the configured data sources and which one is active.
///
/// Readers load a snapshot without blocking. Writers serialize through
/// `write_lock`, rewrite the whole file, then publish the new snapshot.
/// Changes written by another process are picked up by [`reload`](Self::reload).
pub struct DataSourceManager {
    path: PathBuf,
    state: ArcSwap<DataSourceFile>,
    write_lock: Mutex<()>,
    client: reqwest::Client,
}

impl DataSourceManager {
    /// Load the data-source file, seeding and persisting defaults when it
    /// does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataSourceError> {
        let path = path.as_ref().to_path_buf();
        let file = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let file: DataSourceFile = serde_json::from_str(&content)?;
            tracing::info!(
                path = %path.display(),
                sources = file.data_sources.len(),
                active = %file.active_data_source,
                "Loaded data sources"
            );
            file
        } else {
            let file = DataSourceFile::default();
            write_file(&path, &file)?;
            tracing::info!(path = %path.display(), "Data source file missing, seeded defaults");
            file
        };

        if !file.data_sources.contains_key(&file.active_data_source) {
            tracing::error!(
                active = %file.active_data_source,
                "Active data source is not configured, gateway defaults will be used"
            );
        }

        Ok(Self {
            path,
            state: ArcSwap::from_pointee(file),
            write_lock: Mutex::new(()),
            client: reqwest::Client::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file contents.
    pub fn snapshot(&self) -> Arc<DataSourceFile> {
        self.state.load_full()
    }

    pub fn active_name(&self) -> String {
        self.state.load().active_data_source.clone()
    }

    /// The active data source, or `NotFound` if the active name does not
    /// resolve to a configured entry.
    pub fn active(&self) -> Result<DataSourceConfig, DataSourceError> {
        let state = self.state.load();
        state
            .data_sources
            .get(&state.active_data_source)
            .cloned()
            .ok_or_else(|| DataSourceError::NotFound(state.active_data_source.clone()))
    }

    /// Like [`active`](Self::active) but degrades to the gateway default.
    pub fn active_or_default(&self) -> DataSourceConfig {
        match self.active() {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "Falling back to default gateway data source");
                DataSourceConfig::gateway_default()
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<DataSourceConfig> {
        self.state.load().data_sources.get(name).cloned()
    }

    /// All configured sources, ordered by name.
    pub fn list(&self) -> Vec<(String, DataSourceConfig)> {
        self.state
            .load()
            .data_sources
            .iter()
            .map(|(name, config)| (name.clone(), config.clone()))
            .collect()
    }

    /// Mark `name` active. No-op when it already is.
    pub async fn set_active(&self, name: &str) -> Result<(), DataSourceError> {
        let _guard = self.write_lock.lock().await;
        let current = self.state.load_full();

        if !current.data_sources.contains_key(name) {
            return Err(DataSourceError::NotFound(name.to_string()));
        }
        if current.active_data_source == name {
            tracing::debug!(name, "Data source already active");
            return Ok(());
        }

        let mut next = (*current).clone();
        next.active_data_source = name.to_string();
        write_file(&self.path, &next)?;
        self.state.store(Arc::new(next));

        tracing::info!(
            from = %current.active_data_source,
            to = name,
            "Active data source changed"
        );
        Ok(())
    }

    /// Create or replace `name`.
    ///
    /// The file is always rewritten. Connectivity is checked afterwards in a
    /// background task whose failure is only logged.
    pub async fn update(&self, name: &str, config: DataSourceConfig) -> Result<(), DataSourceError> {
        self.persist_source(name, &config).await?;

        let client = self.client.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            health::check(&client, &name, &config).await;
        });
        Ok(())
    }

    /// Like [`update`](Self::update) but waits for the connectivity check
    /// and returns whether the source answered.
    pub async fn update_and_check(&self, name: &str, config: DataSourceConfig) -> Result<bool, DataSourceError> {
        self.persist_source(name, &config).await?;
        Ok(health::check(&self.client, name, &config).await)
    }

    async fn persist_source(&self, name: &str, config: &DataSourceConfig) -> Result<(), DataSourceError> {
        if let Err(e) = url::Url::parse(&config.url) {
            tracing::warn!(name, url = %config.url, error = %e, "Data source URL does not parse");
        }

        {
            let _guard = self.write_lock.lock().await;
            let mut next = (*self.state.load_full()).clone();
            next.data_sources.insert(name.to_string(), config.clone());
            write_file(&self.path, &next)?;
            self.state.store(Arc::new(next));
        }

        tracing::info!(name, kind = %config.kind, url = %config.url, "Data source updated");
        Ok(())
    }

    /// Re-read the file and publish it if it differs from the snapshot.
    ///
    /// Returns whether the snapshot changed. A missing file keeps the
    /// current snapshot.
    pub async fn reload(&self) -> Result<bool, DataSourceError> {
        let _guard = self.write_lock.lock().await;

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "Data source file disappeared, keeping loaded sources");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        let file: DataSourceFile = serde_json::from_str(&content)?;

        let current = self.state.load_full();
        if *current == file {
            return Ok(false);
        }

        if current.active_data_source != file.active_data_source {
            tracing::info!(
                from = %current.active_data_source,
                to = %file.active_data_source,
                "Active data source changed on disk"
            );
        } else {
            tracing::info!(sources = file.data_sources.len(), "Data sources changed on disk");
        }
        self.state.store(Arc::new(file));
        Ok(true)
    }

    /// [`reload`](Self::reload), logging failures and keeping the current
    /// snapshot.
    pub async fn refresh(&self) {
        if let Err(e) = self.reload().await {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to re-read data sources, keeping current ones");
        }
    }
}

/// Serialize the whole file next to its destination, then rename over it.
fn write_file(path: &Path, file: &DataSourceFile) -> Result<(), DataSourceError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let content = serde_json::to_vec_pretty(file)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(&content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
