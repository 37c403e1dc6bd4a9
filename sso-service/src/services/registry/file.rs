use crate::models::RegisteredService;
use crate::services::SsoError;
use crate::services::registry::ServiceRegistry;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};

/// File-backed registry: one JSON definition per file, named `{name}-{id}.json`,
/// under a directory that may be watched for hot reload.
pub struct JsonServiceRegistry {
    root: PathBuf,
    /// id -> file currently holding that definition; first file wins on
    /// duplicate ids across files
    paths: DashMap<u64, PathBuf>,
}

impl JsonServiceRegistry {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, SsoError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| SsoError::Registry(anyhow::Error::new(e)))?;
        Ok(Self {
            root,
            paths: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_name_for(service: &RegisteredService) -> String {
        let name: String = service
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        format!("{}-{}.json", name, service.id)
    }

    /// Parse the single definition held by one file. Returns None (with a
    /// warning) when the file is unreadable, unparseable, or defines an id
    /// already owned by a different file.
    pub async fn load_unit(&self, path: &Path) -> Option<RegisteredService> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read service definition");
                return None;
            }
        };
        let service: RegisteredService = match serde_json::from_slice(&bytes) {
            Ok(service) => service,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to parse service definition");
                return None;
            }
        };
        if let Some(owner) = self.paths.get(&service.id) {
            if owner.value() != path {
                tracing::warn!(
                    id = service.id,
                    path = %path.display(),
                    owner = %owner.value().display(),
                    "Duplicate service id; keeping the first-registered definition"
                );
                return None;
            }
        }
        self.paths.insert(service.id, path.to_path_buf());
        Some(service)
    }

    /// Forget a file's id ownership after the file disappeared.
    pub fn forget_unit(&self, path: &Path) {
        self.paths.retain(|_, owner| owner.as_path() != path);
    }
}

#[async_trait]
impl ServiceRegistry for JsonServiceRegistry {
    async fn load(&self) -> Result<Vec<RegisteredService>, SsoError> {
        let files = collect_json_files(&self.root)
            .await
            .map_err(|e| SsoError::Registry(anyhow::Error::new(e)))?;

        self.paths.clear();
        let mut services = Vec::with_capacity(files.len());
        for path in files {
            if let Some(service) = self.load_unit(&path).await {
                services.push(service);
            }
        }
        Ok(services)
    }

    async fn save(&self, service: RegisteredService) -> Result<RegisteredService, SsoError> {
        let path = self.root.join(Self::file_name_for(&service));
        let json = serde_json::to_vec_pretty(&service)
            .map_err(|e| SsoError::Registry(anyhow::Error::new(e)))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| SsoError::Registry(anyhow::Error::new(e)))?;

        // A rename moves the definition to a new file; drop the old one.
        if let Some(previous) = self.paths.insert(service.id, path.clone()) {
            if previous != path {
                if let Err(e) = tokio::fs::remove_file(&previous).await {
                    tracing::warn!(path = %previous.display(), error = %e, "Failed to remove renamed service file");
                }
            }
        }
        Ok(service)
    }

    async fn delete(&self, service: &RegisteredService) -> Result<bool, SsoError> {
        let path = self
            .paths
            .remove(&service.id)
            .map(|(_, path)| path)
            .unwrap_or_else(|| self.root.join(Self::file_name_for(service)));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SsoError::Registry(anyhow::Error::new(e))),
        }
    }

    async fn find_by_exact_service_id(
        &self,
        service_id: &str,
    ) -> Result<Option<RegisteredService>, SsoError> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|service| service.service_id == service_id))
    }

    async fn size(&self) -> Result<usize, SsoError> {
        let files = collect_json_files(&self.root)
            .await
            .map_err(|e| SsoError::Registry(anyhow::Error::new(e)))?;
        Ok(files.len())
    }

    fn name(&self) -> &str {
        "json-file"
    }
}

/// Walk a directory tree and collect every `.json` file.
pub(crate) async fn collect_json_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
