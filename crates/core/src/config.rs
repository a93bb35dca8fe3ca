//! Configuration management for the knowledge base tools.
//!
//! Configuration is merged from, in increasing precedence:
//! - Built-in defaults
//! - A YAML config file (`.kb/config.yaml` in the workspace, or `KB_CONFIG`)
//! - Environment variables
//! - Command-line flags (`with_overrides`)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Embedding providers the indexer and retriever know how to construct.
pub const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["openai", "trigram"];

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbConfig {
    /// Workspace root; relative paths below are resolved against it
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Directory holding the bilingual markdown sources
    pub content_dir: PathBuf,

    /// Where the index artifact is written and read from
    pub output: PathBuf,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    pub chunking: ChunkingSettings,

    pub embedding: EmbeddingSettings,

    pub retrieval: RetrievalSettings,
}

/// Chunk window parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkingSettings {
    /// Maximum chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// A sentence break must sit beyond this many characters into the window
    #[serde(default = "default_min_break")]
    pub min_break: usize,
}

/// Embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingSettings {
    /// Provider name: "openai" or "trigram"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier recorded in the artifact
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the embeddings API
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Chunks sent per embedding request at build time
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Vector dimensionality (used by the local trigram provider)
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

/// Query-time settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalSettings {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Expand query terms to indexed terms they prefix
    #[serde(default = "default_prefix")]
    pub prefix: bool,

    /// Fuzzy tolerance as a fraction of the term length
    #[serde(default = "default_fuzzy")]
    pub fuzzy: f64,
}

fn default_chunk_size() -> usize {
    800
}

fn default_min_break() -> usize {
    200
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_batch_size() -> usize {
    64
}

fn default_dimensions() -> usize {
    1536
}

fn default_top_k() -> usize {
    6
}

fn default_prefix() -> bool {
    true
}

fn default_fuzzy() -> f64 {
    0.2
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            min_break: default_min_break(),
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            api_key_env: default_api_key_env(),
            endpoint: None,
            batch_size: default_batch_size(),
            dimensions: default_dimensions(),
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            prefix: default_prefix(),
            fuzzy: default_fuzzy(),
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    content_dir: Option<PathBuf>,
    output: Option<PathBuf>,
    chunking: Option<ChunkingSettings>,
    embedding: Option<EmbeddingSettings>,
    retrieval: Option<RetrievalSettings>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            content_dir: PathBuf::from("content").join("knowledge"),
            output: PathBuf::from("public").join("kb-index.json"),
            log_level: None,
            verbose: false,
            no_color: false,
            chunking: ChunkingSettings::default(),
            embedding: EmbeddingSettings::default(),
            retrieval: RetrievalSettings::default(),
        }
    }
}

impl KbConfig {
    /// Load configuration from defaults, the config file and environment.
    ///
    /// Environment variables:
    /// - `KB_WORKSPACE`: Override workspace path
    /// - `KB_CONFIG`: Path to config file
    /// - `KB_CONTENT_DIR`: Source document directory
    /// - `KB_OUTPUT`: Artifact path
    /// - `KB_EMBEDDING_MODEL`: Embedding model identifier
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        Self::load_from(None, None)
    }

    /// Like [`KbConfig::load`], with an explicit workspace and config file
    /// taking precedence over `KB_WORKSPACE` and `KB_CONFIG`.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) =
            workspace.or_else(|| std::env::var_os("KB_WORKSPACE").map(PathBuf::from))
        {
            config.workspace = workspace;
        }

        if let Some(config_file) =
            config_file.or_else(|| std::env::var_os("KB_CONFIG").map(PathBuf::from))
        {
            config.config_file = Some(config_file);
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.kb_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        if let Ok(dir) = std::env::var("KB_CONTENT_DIR") {
            config.content_dir = PathBuf::from(dir);
        }

        if let Ok(output) = std::env::var("KB_OUTPUT") {
            config.output = PathBuf::from(output);
        }

        if let Ok(model) = std::env::var("KB_EMBEDDING_MODEL") {
            config.embedding.model = model;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        Ok(self.clone().apply_file(file))
    }

    fn apply_file(mut self, file: ConfigFile) -> Self {
        if let Some(dir) = file.content_dir {
            self.content_dir = dir;
        }
        if let Some(output) = file.output {
            self.output = output;
        }
        if let Some(chunking) = file.chunking {
            self.chunking = chunking;
        }
        if let Some(embedding) = file.embedding {
            self.embedding = embedding;
        }
        if let Some(retrieval) = file.retrieval {
            self.retrieval = retrieval;
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
        }
        self
    }

    /// Apply CLI overrides; flags win over environment and file values.
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .kb directory.
    pub fn kb_dir(&self) -> PathBuf {
        self.workspace.join(".kb")
    }

    /// Content directory resolved against the workspace.
    pub fn content_path(&self) -> PathBuf {
        self.resolve(&self.content_dir)
    }

    /// Artifact path resolved against the workspace.
    pub fn output_path(&self) -> PathBuf {
        self.resolve(&self.output)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Read the embedding API key from its configured environment variable.
    ///
    /// Empty values count as absent.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.embedding.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Validate value ranges and provider names.
    pub fn validate(&self) -> AppResult<()> {
        if self.chunking.chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be positive".to_string()));
        }

        if self.chunking.min_break >= self.chunking.chunk_size {
            return Err(AppError::Config(format!(
                "min_break ({}) must be smaller than chunk_size ({})",
                self.chunking.min_break, self.chunking.chunk_size
            )));
        }

        if self.embedding.batch_size == 0 {
            return Err(AppError::Config("batch_size must be positive".to_string()));
        }

        if !KNOWN_EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if !(0.0..=1.0).contains(&self.retrieval.fuzzy) {
            return Err(AppError::Config(format!(
                "fuzzy must be within [0, 1], got {}",
                self.retrieval.fuzzy
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = KbConfig::default();
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chunking.min_break, 200);
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.retrieval.top_k, 6);
        assert!(config.retrieval.prefix);
        assert!((config.retrieval.fuzzy - 0.2).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_paths_resolve_against_workspace() {
        let mut config = KbConfig::default();
        config.workspace = PathBuf::from("/srv/site");
        assert_eq!(
            config.output_path(),
            PathBuf::from("/srv/site/public/kb-index.json")
        );
        assert_eq!(
            config.content_path(),
            PathBuf::from("/srv/site/content/knowledge")
        );

        config.output = PathBuf::from("/tmp/index.json");
        assert_eq!(config.output_path(), PathBuf::from("/tmp/index.json"));
    }

    #[test]
    fn test_with_overrides() {
        let config = KbConfig::default().with_overrides(
            Some(PathBuf::from("/work")),
            None,
            None,
            true,
            false,
        );

        assert_eq!(config.workspace, PathBuf::from("/work"));
        assert!(config.verbose);
        assert_eq!(config.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
output: dist/index.json
chunking:
  chunk_size: 400
  min_break: 100
embedding:
  provider: trigram
  model: trigram-v1
  dimensions: 256
  api_key_env: KB_EMBEDDINGS_KEY
retrieval:
  top_k: 3
logging:
  color: false
"#,
        )
        .unwrap();

        let config = KbConfig::default().merge_yaml(&path).unwrap();
        assert_eq!(config.output, PathBuf::from("dist/index.json"));
        assert_eq!(config.chunking.chunk_size, 400);
        assert_eq!(config.embedding.provider, "trigram");
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.embedding.api_key_env, "KB_EMBEDDINGS_KEY");
        assert_eq!(config.retrieval.top_k, 3);
        assert!(config.retrieval.prefix);
        assert!(config.no_color);
    }

    #[test]
    fn test_load_from_reads_workspace_config() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".kb")).unwrap();
        std::fs::write(
            temp.path().join(".kb").join("config.yaml"),
            "chunking:\n  chunk_size: 500\n  min_break: 120\n",
        )
        .unwrap();

        let config = KbConfig::load_from(Some(temp.path().to_path_buf()), None).unwrap();
        assert_eq!(config.workspace, temp.path());
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.min_break, 120);
    }

    #[test]
    fn test_load_from_missing_workspace() {
        let temp = TempDir::new().unwrap();
        let result = KbConfig::load_from(Some(temp.path().join("missing")), None);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_merge_yaml_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "chunking: [1, 2").unwrap();

        let result = KbConfig::default().merge_yaml(&path);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = KbConfig::default();
        config.chunking.min_break = 800;
        assert!(config.validate().is_err());

        let mut config = KbConfig::default();
        config.embedding.provider = "unknown".to_string();
        assert!(config.validate().is_err());

        let mut config = KbConfig::default();
        config.retrieval.fuzzy = 1.5;
        assert!(config.validate().is_err());

        let mut config = KbConfig::default();
        config.embedding.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_api_key_missing() {
        let mut config = KbConfig::default();
        config.embedding.api_key_env = "KB_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        assert!(config.resolve_api_key().is_none());
    }
}
