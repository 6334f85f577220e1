//! Configuration management for the validation service
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schematron.toml)
//! - Environment variables (SCHEMATRON__*)
//!
//! ## Example config file (schematron.toml):
//! ```toml
//! [validator]
//! schema = "rules/metadata.sch"
//! suppress_warnings = false
//! priority = 100
//!
//! [resources]
//! root = "./schemas"
//! builtin_programs = true
//!
//! [compiler]
//! phase = "#ALL"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::compiler::CompilerOptions;
use crate::preprocess::Stage;
use crate::resolver::{with_builtin_programs, ChainResolver, FsResolver};
use crate::validator::{Priority, ValidatorSettings};

/// Main configuration for the validation service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Validator settings
    #[serde(default)]
    pub validator: ValidatorConfig,

    /// Where schemas and programs are resolved from
    #[serde(default)]
    pub resources: ResourceConfig,

    /// Preprocessor programs and phase
    #[serde(default)]
    pub compiler: CompilerConfig,
}

/// Validator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Resource path of the rule schema
    #[serde(default)]
    pub schema: Option<String>,

    /// Advisory findings do not count against validity
    #[serde(default)]
    pub suppress_warnings: bool,

    /// Position among the host's pre-ingest plugins, clamped to 1..=100
    #[serde(default = "default_priority")]
    pub priority: i32,
}

/// Resource configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Directory the filesystem resolver reads from
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Fall back to the embedded preprocessor programs
    #[serde(default = "default_true")]
    pub builtin_programs: bool,
}

/// Compiler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Phase to compile instead of the skeleton program's default
    #[serde(default)]
    pub phase: Option<String>,

    #[serde(default = "default_include_program")]
    pub include_program: String,

    #[serde(default = "default_abstract_program")]
    pub abstract_program: String,

    #[serde(default = "default_skeleton_program")]
    pub skeleton_program: String,
}

// Default value functions
fn default_priority() -> i32 {
    Priority::DEFAULT.get()
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_include_program() -> String {
    Stage::Inclusion.default_program().to_string()
}

fn default_abstract_program() -> String {
    Stage::Abstraction.default_program().to_string()
}

fn default_skeleton_program() -> String {
    Stage::Skeleton.default_program().to_string()
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            schema: None,
            suppress_warnings: false,
            priority: default_priority(),
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            builtin_programs: true,
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            phase: None,
            include_program: default_include_program(),
            abstract_program: default_abstract_program(),
            skeleton_program: default_skeleton_program(),
        }
    }
}

impl ValidatorConfig {
    /// Runtime settings for an existing validator
    pub fn settings(&self) -> ValidatorSettings {
        ValidatorSettings {
            suppress_warnings: Some(self.suppress_warnings),
            priority: Some(self.priority),
        }
    }
}

impl CompilerConfig {
    pub fn options(&self) -> CompilerOptions {
        CompilerOptions {
            include_program: self.include_program.clone(),
            abstract_program: self.abstract_program.clone(),
            skeleton_program: self.skeleton_program.clone(),
            phase: self.phase.clone(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["schematron.toml", ".schematron.toml", "config/schematron.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "schematron") {
            let xdg_config = config_dir.config_dir().join("schematron.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (SCHEMATRON__*)
        builder = builder.add_source(
            Environment::with_prefix("SCHEMATRON")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get the resource root (resolves relative paths)
    pub fn resource_root(&self) -> PathBuf {
        if self.resources.root.is_absolute() {
            self.resources.root.clone()
        } else {
            std::env::current_dir().unwrap_or_default().join(&self.resources.root)
        }
    }

    /// Resolver over the resource root, backed by the embedded programs
    /// when `builtin_programs` is set
    pub fn resolver(&self) -> ChainResolver {
        let fs = FsResolver::new(self.resource_root());
        if self.resources.builtin_programs {
            with_builtin_programs(fs)
        } else {
            ChainResolver::new().push(fs)
        }
    }
}
