//! Saída de terminal do bounty board com cores.
//!
//! Usa a crate `console` para estilizar status e resultados. O [`Printer`]
//! concentra toda a formatação usada pelos subcomandos da CLI.

use console::Style;

use bounty_board::engine::{Approval, LedgerOutcome, PendingCredit, ReconcileReport};
use bounty_board::ledger::UserStats;
use bounty_board::state_machine::{Job, JobStatus};

/// Formatação colorida de jobs, aprovações e totais do ledger.
pub struct Printer {
    green: Style,
    red: Style,
    yellow: Style,
    cyan: Style,
    blue: Style,
    dim: Style,
    bold: Style,
}

impl Default for Printer {
    fn default() -> Self {
        Self::new()
    }
}

impl Printer {
    pub fn new() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            cyan: Style::new().cyan(),
            blue: Style::new().blue(),
            dim: Style::new().dim(),
            bold: Style::new().bold(),
        }
    }

    /// Estilo associado a cada status do ciclo de vida.
    fn status_style(&self, status: JobStatus) -> &Style {
        match status {
            JobStatus::Open => &self.cyan,
            JobStatus::Claimed => &self.yellow,
            JobStatus::Submitted => &self.blue,
            JobStatus::Approved => &self.green,
        }
    }

    /// Linha de progresso usada pela demonstração.
    pub fn step(&self, message: &str) {
        println!("{} {message}", self.bold.apply_to("▸"));
    }

    /// Exibe todos os campos de um job.
    pub fn job(&self, job: &Job) {
        println!(
            "{}  {}",
            self.status_style(job.status).apply_to(format!("[{}]", job.status)),
            self.bold.apply_to(&job.title)
        );
        println!("  id:          {}", job.id);
        println!("  bounty:      ${}", job.bounty);
        println!("  creator:     {}", job.creator_id);
        if let Some(editor) = &job.editor_id {
            println!("  editor:      {editor}");
        }
        if let Some(kind) = job.kind {
            println!("  type:        {kind}");
        }
        if let Some(deadline) = job.deadline {
            println!("  deadline:    {deadline}");
        }
        println!("  footage:     {}", job.video_url);
        if let Some(url) = &job.submission_url {
            println!("  submission:  {url}");
        }
        if !job.requirements.is_empty() {
            println!("  needs:       {}", job.requirements.join(", "));
        }
        println!(
            "  {}",
            self.dim.apply_to(format!("created {}", job.created_at.to_rfc3339()))
        );
    }

    /// Tabela compacta, uma linha por job.
    pub fn job_table(&self, jobs: &[Job]) {
        if jobs.is_empty() {
            println!("{}", self.dim.apply_to("no jobs"));
            return;
        }
        for job in jobs {
            println!(
                "{:<38} {} {:>9}  {}",
                job.id,
                self.status_style(job.status)
                    .apply_to(format!("{:<9}", job.status.as_str())),
                format!("${}", job.bounty),
                job.title
            );
        }
    }

    /// Resultado de uma aprovação, incluindo o estado do crédito.
    pub fn approval(&self, approval: &Approval) {
        self.job(&approval.job);
        match &approval.ledger {
            LedgerOutcome::Credited => println!(
                "  {} credited ${} to {}",
                self.green.apply_to("✓"),
                approval.payout,
                approval.job.editor_id.as_deref().unwrap_or("-")
            ),
            LedgerOutcome::Pending { reason } => println!(
                "  {} payout ${} queued: {reason}",
                self.yellow.apply_to("↻"),
                approval.payout
            ),
        }
    }

    pub fn stats(&self, user_id: &str, stats: &UserStats) {
        println!("{}", self.bold.apply_to(user_id));
        println!("  earnings:    ${}", stats.total_earnings);
        println!("  completed:   {}", stats.jobs_completed);
        println!("  posted:      {}", stats.jobs_posted);
    }

    pub fn pending(&self, credits: &[PendingCredit]) {
        for credit in credits {
            println!(
                "  {} ${} for {} (job {})",
                self.yellow.apply_to("↻"),
                credit.amount,
                credit.editor_id,
                credit.job_id
            );
        }
    }

    pub fn reconcile(&self, report: &ReconcileReport) {
        if report.settled.is_empty() && report.still_pending.is_empty() {
            println!("{}", self.dim.apply_to("nothing to reconcile"));
            return;
        }
        for credit in &report.settled {
            println!(
                "  {} settled ${} for {} (job {})",
                self.green.apply_to("✓"),
                credit.amount,
                credit.editor_id,
                credit.job_id
            );
        }
        if !report.still_pending.is_empty() {
            println!(
                "  {} {} credit(s) still pending",
                self.red.apply_to("✗"),
                report.still_pending.len()
            );
            self.pending(&report.still_pending);
        }
    }

    /// Mensagem de erro em vermelho para falhas de operação.
    pub fn failure(&self, message: &str) {
        eprintln!("{} {message}", self.red.apply_to("✗"));
    }
}
