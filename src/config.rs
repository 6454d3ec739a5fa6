//! Configuração do bounty board carregada a partir de `bounty-board.toml`.
//!
//! A struct [`BoardConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `BOUNTY_BOARD_STORE` e `BOUNTY_BOARD_DATA` têm
//! precedência sobre o arquivo; flags da CLI têm precedência sobre ambas.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Nome do arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "bounty-board.toml";

/// Backend de persistência dos jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Tudo em memória; perdido ao encerrar o processo.
    Memory,
    /// Array JSON em disco.
    #[default]
    File,
    /// Banco SQLite.
    Sqlite,
}

impl StoreKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(StoreKind::Memory),
            "file" | "json" => Some(StoreKind::File),
            "sqlite" => Some(StoreKind::Sqlite),
            _ => None,
        }
    }
}

/// Parâmetros do ledger de usuários.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Tentativas por operação do ledger antes de enfileirar o crédito.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

/// Configuração de nível superior carregada de `bounty-board.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Backend de persistência.
    #[serde(default)]
    pub store: StoreKind,

    /// Caminho dos dados; o default depende do backend.
    #[serde(default)]
    pub data_path: Option<PathBuf>,

    /// Endereço em que o servidor HTTP escuta.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub ledger: LedgerConfig,
}

// Valor padrão para o endereço HTTP: apenas loopback.
fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

// Valor padrão para tentativas do ledger: 3.
fn default_max_attempts() -> u32 {
    3
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::default(),
            data_path: None,
            listen_addr: default_listen_addr(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl BoardConfig {
    /// Carrega a configuração de `path` (ou de `bounty-board.toml` no
    /// diretório atual). Usa valores padrão se o arquivo não existir.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path.is_some();
        let path = path.unwrap_or_else(|| Path::new(CONFIG_FILE));

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<BoardConfig>(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else if explicit {
            bail!("config file {} does not exist", path.display());
        } else {
            Self::default()
        };

        // Variáveis de ambiente têm precedência sobre o arquivo de configuração.
        config.apply_overrides(
            std::env::var("BOUNTY_BOARD_STORE").ok().as_deref(),
            std::env::var("BOUNTY_BOARD_DATA").ok().as_deref(),
        )?;

        Ok(config)
    }

    /// Aplica sobrescritas vindas do ambiente ou da CLI. Valores vazios são ignorados.
    pub fn apply_overrides(&mut self, store: Option<&str>, data: Option<&str>) -> Result<()> {
        if let Some(raw) = store.filter(|s| !s.trim().is_empty()) {
            self.store = StoreKind::parse(raw)
                .with_context(|| format!("unknown store backend {raw:?}"))?;
        }
        if let Some(raw) = data.filter(|s| !s.trim().is_empty()) {
            self.data_path = Some(PathBuf::from(raw));
        }
        Ok(())
    }

    /// Caminho efetivo dos dados para o backend escolhido.
    pub fn data_path(&self) -> PathBuf {
        match (&self.data_path, self.store) {
            (Some(path), _) => path.clone(),
            (None, StoreKind::Sqlite) => PathBuf::from("bounty-board.db"),
            (None, _) => PathBuf::from("bounty-board.json"),
        }
    }

    /// Caminho do ledger JSON usado junto ao backend `file`.
    pub fn ledger_path(&self) -> PathBuf {
        self.sibling_path(".ledger")
    }

    /// Caminho da fila de créditos pendentes usada junto ao backend `file`.
    pub fn pending_path(&self) -> PathBuf {
        self.sibling_path(".pending")
    }

    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let mut path = self.data_path().into_os_string();
        path.push(suffix);
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = BoardConfig::default();
        assert_eq!(config.store, StoreKind::File);
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.ledger.max_attempts, 3);
        assert_eq!(config.data_path(), PathBuf::from("bounty-board.json"));
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            store = "sqlite"

            [ledger]
            max_attempts = 5
        "#;
        let config: BoardConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store, StoreKind::Sqlite);
        assert_eq!(config.ledger.max_attempts, 5);
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.data_path(), PathBuf::from("bounty-board.db"));
    }

    #[test]
    fn unknown_store_is_rejected() {
        assert!(toml::from_str::<BoardConfig>("store = \"postgres\"").is_err());
        let mut config = BoardConfig::default();
        assert!(config.apply_overrides(Some("postgres"), None).is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config: BoardConfig = toml::from_str("store = \"file\"").unwrap();
        config
            .apply_overrides(Some("SQLITE"), Some("/tmp/board.db"))
            .unwrap();
        assert_eq!(config.store, StoreKind::Sqlite);
        assert_eq!(config.data_path(), PathBuf::from("/tmp/board.db"));
        assert_eq!(config.ledger_path(), PathBuf::from("/tmp/board.db.ledger"));
        assert_eq!(config.pending_path(), PathBuf::from("/tmp/board.db.pending"));
    }

    #[test]
    fn empty_overrides_are_ignored() {
        let mut config = BoardConfig::default();
        config.apply_overrides(Some(""), Some("  ")).unwrap();
        assert_eq!(config.store, StoreKind::File);
        assert!(config.data_path.is_none());
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.toml");
        std::fs::write(&path, "listen_addr = \"0.0.0.0:8080\"\n").unwrap();
        let config = BoardConfig::load(Some(&path)).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn load_fails_for_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(BoardConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
