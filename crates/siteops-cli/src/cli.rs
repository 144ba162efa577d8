use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use siteops_core::models::{AttendanceStatus, RequestUrgency};
use siteops_core::RecordCategory;

#[derive(Parser)]
#[command(name = "siteops")]
#[command(about = "Capture site records offline and sync them when connected")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to the local outbox database
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the client config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a new field record
    Capture {
        #[command(subcommand)]
        record: CaptureCommands,
    },
    /// List queued records
    Queue {
        /// Only show one category
        #[arg(long, value_enum)]
        category: Option<CategoryArg>,
        /// Hide records that were already synced
        #[arg(long)]
        pending: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show pending counts and connectivity
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push pending records once
    Sync {
        /// Treat the device as offline (nothing is pushed)
        #[arg(long)]
        offline: bool,
    },
    /// Keep syncing in the foreground until interrupted
    Watch {
        /// Seconds between connectivity re-checks
        #[arg(long, default_value = "30", value_name = "SECS")]
        recheck_secs: u64,
    },
    /// Drop old synced records and stale cached responses
    Prune {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the API access token
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum CaptureCommands {
    /// Mark attendance for a worker
    Attendance(AttendanceArgs),
    /// File the daily site report
    DailyReport(DailyReportArgs),
    /// Request materials for a site
    MaterialRequest(MaterialRequestArgs),
}

#[derive(Args)]
pub struct AttendanceArgs {
    #[arg(long, value_name = "ID")]
    pub worker: String,
    #[arg(long, value_name = "ID")]
    pub site: String,
    #[arg(long, value_enum, default_value_t = AttendanceArg::Present)]
    pub status: AttendanceArg,
    /// Check-in time (RFC 3339)
    #[arg(long, value_name = "TIME")]
    pub check_in: Option<String>,
    /// Check-out time (RFC 3339)
    #[arg(long, value_name = "TIME")]
    pub check_out: Option<String>,
    #[arg(long)]
    pub note: Option<String>,
    /// When the record was captured (RFC 3339, defaults to now)
    #[arg(long, value_name = "TIME")]
    pub captured_at: Option<String>,
}

#[derive(Args)]
pub struct DailyReportArgs {
    #[arg(long, value_name = "ID")]
    pub site: String,
    /// Report date, YYYY-MM-DD (defaults to today)
    #[arg(long, value_name = "DATE")]
    pub date: Option<String>,
    /// Summary of the day's work
    pub summary: Vec<String>,
    #[arg(long)]
    pub weather: Option<String>,
    #[arg(long, value_name = "COUNT")]
    pub workers: Option<u32>,
    /// Issue raised on site (repeatable)
    #[arg(long = "issue", value_name = "TEXT")]
    pub issues: Vec<String>,
    /// When the record was captured (RFC 3339, defaults to now)
    #[arg(long, value_name = "TIME")]
    pub captured_at: Option<String>,
}

#[derive(Args)]
pub struct MaterialRequestArgs {
    #[arg(long, value_name = "ID")]
    pub site: String,
    /// Requested item as NAME:QUANTITY[:UNIT] (repeatable)
    #[arg(long = "item", value_name = "ITEM", required = true)]
    pub items: Vec<String>,
    #[arg(long, value_enum, default_value_t = UrgencyArg::Normal)]
    pub urgency: UrgencyArg,
    /// Date needed on site, YYYY-MM-DD
    #[arg(long, value_name = "DATE")]
    pub needed_by: Option<String>,
    #[arg(long)]
    pub note: Option<String>,
    /// When the record was captured (RFC 3339, defaults to now)
    #[arg(long, value_name = "TIME")]
    pub captured_at: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CategoryArg {
    Attendance,
    DailyReport,
    MaterialRequest,
}

impl From<CategoryArg> for RecordCategory {
    fn from(value: CategoryArg) -> Self {
        match value {
            CategoryArg::Attendance => Self::Attendance,
            CategoryArg::DailyReport => Self::DailyReport,
            CategoryArg::MaterialRequest => Self::MaterialRequest,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum AttendanceArg {
    Present,
    Absent,
    HalfDay,
    Leave,
}

impl From<AttendanceArg> for AttendanceStatus {
    fn from(value: AttendanceArg) -> Self {
        match value {
            AttendanceArg::Present => Self::Present,
            AttendanceArg::Absent => Self::Absent,
            AttendanceArg::HalfDay => Self::HalfDay,
            AttendanceArg::Leave => Self::Leave,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum UrgencyArg {
    Low,
    Normal,
    Urgent,
}

impl From<UrgencyArg> for RequestUrgency {
    fn from(value: UrgencyArg) -> Self {
        match value {
            UrgencyArg::Low => Self::Low,
            UrgencyArg::Normal => Self::Normal,
            UrgencyArg::Urgent => Self::Urgent,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store an API access token in the OS keychain
    SetToken {
        #[arg(long, value_name = "TOKEN")]
        token: String,
    },
    /// Show where the access token comes from
    Status,
    /// Remove the stored access token
    Logout,
}
