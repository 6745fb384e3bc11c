//! # Platform-specific utilities
//!
//! Centralizza la logica cross-platform per trovare gli encoder esterni.
//!
//! ## Responsabilità:
//! - Nome dell'eseguibile per piattaforma (`cwebp` vs `cwebp.exe`)
//! - Comando di lookup (`which` / `where`)
//! - Directory di tool opzionale via `IMAGE_SQUEEZE_TOOLS_DIR`
//! - Cache dei risultati di disponibilità per non rilanciare `which`
//!   per ogni immagine

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::debug;

/// Environment variable pointing at a directory of bundled encoders
pub const TOOLS_DIR_ENV: &str = "IMAGE_SQUEEZE_TOOLS_DIR";

/// Platform-specific command lookup with availability cache
pub struct PlatformCommands {
    which_command: &'static str,
    executable_suffix: &'static str,
    tools_dir: Option<PathBuf>,
    availability: Mutex<HashMap<String, bool>>,
}

impl PlatformCommands {
    /// Get the singleton instance
    pub fn instance() -> &'static Self {
        static INSTANCE: OnceLock<PlatformCommands> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    fn new() -> Self {
        let (which_command, executable_suffix) = if cfg!(windows) {
            ("where", ".exe")
        } else {
            ("which", "")
        };

        let tools_dir = env::var_os(TOOLS_DIR_ENV)
            .map(PathBuf::from)
            .filter(|dir| dir.is_dir());
        if let Some(ref dir) = tools_dir {
            debug!("Using bundled tools directory: {}", dir.display());
        }

        Self {
            which_command,
            executable_suffix,
            tools_dir,
            availability: Mutex::new(HashMap::new()),
        }
    }

    /// Get the platform-specific executable name
    pub fn get_command(&self, base_name: &str) -> String {
        format!("{}{}", base_name, self.executable_suffix)
    }

    /// Get the command used to check if a program exists
    pub fn which_command(&self) -> &str {
        self.which_command
    }

    fn bundled_path(&self, base_name: &str) -> Option<PathBuf> {
        let dir = self.tools_dir.as_ref()?;
        let bundled = dir.join(self.get_command(base_name));
        bundled.is_file().then_some(bundled)
    }

    /// Path to invoke for a tool: bundled copy if present, else the bare name
    pub fn get_tool_path(&self, base_name: &str) -> PathBuf {
        self.bundled_path(base_name)
            .unwrap_or_else(|| PathBuf::from(self.get_command(base_name)))
    }

    /// Check if a command is available on the system or bundled
    pub async fn is_command_available(&self, base_name: &str) -> bool {
        let cached = self
            .availability
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(base_name)
            .copied();
        if let Some(known) = cached {
            return known;
        }

        let available = if self.bundled_path(base_name).is_some() {
            true
        } else {
            tokio::process::Command::new(self.which_command)
                .arg(self.get_command(base_name))
                .output()
                .await
                .map(|output| output.status.success())
                .unwrap_or(false)
        };

        debug!(
            "Tool {} is {}",
            base_name,
            if available { "available" } else { "missing" }
        );
        self.availability
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(base_name.to_string(), available);
        available
    }
}
