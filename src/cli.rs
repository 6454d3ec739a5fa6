//! Interface de linha de comando do bounty board baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (serve, post, claim,
//! submit, approve, list, show, stats, reconcile, seed, demo) e flags globais
//! (--config, --store, --data, --verbose).

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use bounty_board::config::StoreKind;
use bounty_board::state_machine::{JobKind, JobStatus, NewJob};

/// Bounty board: marketplace de edição de vídeo com ciclo de vida de jobs.
#[derive(Debug, Parser)]
#[command(name = "bounty-board", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./bounty-board.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend de persistência; sobrescreve a configuração e o ambiente.
    #[arg(long, global = true)]
    pub store: Option<StoreArg>,

    /// Caminho do arquivo de dados do backend.
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Backend aceito pela CLI, mapeado para [`StoreKind`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StoreArg {
    Memory,
    File,
    Sqlite,
}

impl From<StoreArg> for StoreKind {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::Memory => StoreKind::Memory,
            StoreArg::File => StoreKind::File,
            StoreArg::Sqlite => StoreKind::Sqlite,
        }
    }
}

/// Status aceito no filtro de `list`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Open,
    Claimed,
    Submitted,
    Approved,
}

impl From<StatusArg> for JobStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Open => JobStatus::Open,
            StatusArg::Claimed => JobStatus::Claimed,
            StatusArg::Submitted => JobStatus::Submitted,
            StatusArg::Approved => JobStatus::Approved,
        }
    }
}

/// Formato do vídeo pedido.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    ShortForm,
    LongForm,
}

impl From<KindArg> for JobKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::ShortForm => JobKind::ShortForm,
            KindArg::LongForm => JobKind::LongForm,
        }
    }
}

/// Campos de um novo job informados em `post`.
#[derive(Debug, Args)]
pub struct PostArgs {
    /// Usuário que publica o job.
    #[arg(long)]
    pub creator: String,

    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub description: String,

    /// Descrição longa opcional.
    #[arg(long)]
    pub long_description: Option<String>,

    /// Valor da recompensa em dólares (ex.: 25.50).
    #[arg(long)]
    pub bounty: f64,

    /// URL do material bruto.
    #[arg(long)]
    pub video_url: String,

    #[arg(long, value_enum)]
    pub kind: Option<KindArg>,

    /// Prazo no formato AAAA-MM-DD.
    #[arg(long)]
    pub deadline: Option<NaiveDate>,

    /// Requisito do job; pode ser repetido.
    #[arg(long = "requirement", short = 'r')]
    pub requirements: Vec<String>,
}

impl PostArgs {
    /// Separa o criador dos campos do job.
    pub fn into_parts(self) -> (String, NewJob) {
        let fields = NewJob {
            title: self.title,
            description: self.description,
            long_description: self.long_description,
            bounty: self.bounty,
            video_url: self.video_url,
            kind: self.kind.map(JobKind::from),
            deadline: self.deadline,
            requirements: self.requirements,
        };
        (self.creator, fields)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inicia o servidor HTTP.
    Serve {
        /// Endereço de escuta; sobrescreve `listen_addr` da configuração.
        #[arg(long)]
        addr: Option<String>,
    },

    /// Publica um novo job.
    Post(PostArgs),

    /// Um editor assume um job aberto.
    Claim {
        job_id: String,
        editor_id: String,
    },

    /// O editor entrega o vídeo editado.
    Submit {
        job_id: String,
        submission_url: String,
    },

    /// Aprova a entrega e credita o editor.
    Approve { job_id: String },

    /// Lista jobs, mais recentes primeiro.
    List {
        #[arg(long, value_enum)]
        status: Option<StatusArg>,

        #[arg(long)]
        creator: Option<String>,

        #[arg(long)]
        editor: Option<String>,
    },

    /// Mostra um job.
    Show { job_id: String },

    /// Mostra os totais de um usuário.
    Stats { user_id: String },

    /// Tenta novamente os créditos pendentes do ledger.
    Reconcile,

    /// Insere o catálogo de exemplo.
    Seed,

    /// Executa a demonstração do ciclo de vida em memória.
    Demo,
}
