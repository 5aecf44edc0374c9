use std::{fs, path::PathBuf, sync::Arc};

use common::catalog::Catalog;
use common::engine::{Engine, EngineConfig};
use common::prelude::{Principal, SecretKey};
use common::storage::FsStorage;
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "ddh";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const CATALOG_FILE_NAME: &str = "catalog.json";
pub const PRINCIPALS_DIR_NAME: &str = "principals";
pub const STORE_DIR_NAME: &str = "store";
const KEY_EXTENSION: &str = "pem";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default log level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for daily rolling log files; none logs to stderr only
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the ddh directory (~/.ddh)
    pub ddh_dir: PathBuf,
    /// Directory holding one PEM key per principal
    pub principals_path: PathBuf,
    /// Directory holding encrypted payloads
    pub store_path: PathBuf,
    /// Path to the persisted directory and key vault
    pub catalog_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the ddh directory path (custom or default ~/.ddh)
    pub fn ddh_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new ddh state directory
    pub fn init(custom_path: Option<PathBuf>, config: Option<AppConfig>) -> Result<Self, StateError> {
        let ddh_dir = Self::ddh_dir(custom_path)?;
        if ddh_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&ddh_dir)?;

        let principals_path = ddh_dir.join(PRINCIPALS_DIR_NAME);
        fs::create_dir_all(&principals_path)?;
        let store_path = ddh_dir.join(STORE_DIR_NAME);
        fs::create_dir_all(&store_path)?;

        let config = config.unwrap_or_default();
        let config_path = ddh_dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        let catalog_path = ddh_dir.join(CATALOG_FILE_NAME);
        fs::write(&catalog_path, serde_json::to_vec_pretty(&Catalog::default())?)?;

        Ok(Self {
            ddh_dir,
            principals_path,
            store_path,
            catalog_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the ddh directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let ddh_dir = Self::ddh_dir(custom_path)?;
        if !ddh_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let principals_path = ddh_dir.join(PRINCIPALS_DIR_NAME);
        let store_path = ddh_dir.join(STORE_DIR_NAME);
        let catalog_path = ddh_dir.join(CATALOG_FILE_NAME);
        let config_path = ddh_dir.join(CONFIG_FILE_NAME);

        for (path, name) in [
            (&principals_path, "principals/"),
            (&store_path, "store/"),
            (&catalog_path, CATALOG_FILE_NAME),
            (&config_path, CONFIG_FILE_NAME),
        ] {
            if !path.exists() {
                return Err(StateError::MissingFile(name.to_string()));
            }
        }

        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;

        Ok(Self {
            ddh_dir,
            principals_path,
            store_path,
            catalog_path,
            config_path,
            config,
        })
    }

    fn key_path(&self, principal: &Principal) -> PathBuf {
        self.principals_path
            .join(format!("{}.{}", principal, KEY_EXTENSION))
    }

    /// Generate and save a key pair for a new principal
    pub fn add_principal(&self, principal: &Principal) -> Result<SecretKey, StateError> {
        let path = self.key_path(principal);
        if path.exists() {
            return Err(StateError::PrincipalExists(principal.clone()));
        }
        let key = SecretKey::generate();
        fs::write(&path, key.to_pem())?;
        Ok(key)
    }

    /// Every principal with a key file, in name order
    pub fn load_principals(&self) -> Result<Vec<(Principal, SecretKey)>, StateError> {
        let mut principals = Vec::new();
        for entry in fs::read_dir(&self.principals_path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(KEY_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let principal = Principal::parse(stem)
                .map_err(|e| StateError::InvalidKey(format!("{}: {}", path.display(), e)))?;
            let pem = fs::read_to_string(&path)?;
            let key = SecretKey::from_pem(&pem)
                .map_err(|e| StateError::InvalidKey(format!("{}: {}", path.display(), e)))?;
            principals.push((principal, key));
        }
        principals.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(principals)
    }

    /// An engine over the store directory with the catalog restored and
    /// every local principal registered
    pub async fn open(&self) -> Result<Engine, StateError> {
        let storage = FsStorage::open(&self.store_path)
            .await
            .map_err(common::Error::from)?;
        let engine = Engine::new(self.config.engine.clone(), Arc::new(storage));

        for (principal, key) in self.load_principals()? {
            engine.register_principal(principal, key);
        }
        Catalog::load(&self.catalog_path).await?.restore(&engine)?;

        tracing::debug!(dir = %self.ddh_dir.display(), "opened engine");
        Ok(engine)
    }

    /// Persist the directory and key vault of `engine`
    pub async fn save(&self, engine: &Engine) -> Result<(), StateError> {
        Catalog::capture(engine).save(&self.catalog_path).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("ddh directory not initialized. Run 'ddh init' first")]
    NotInitialized,

    #[error("ddh directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("principal {0} already exists")]
    PrincipalExists(Principal),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Engine(#[from] common::Error),
}
