use std::path::PathBuf;

use crate::db::TimeWindow;
use crate::export::ExportFormat;
use crate::report::GroupBy;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupByArg {
    Model,
    File,
    Function,
    Label,
}

impl From<GroupByArg> for GroupBy {
    fn from(arg: GroupByArg) -> Self {
        match arg {
            GroupByArg::Model => GroupBy::Model,
            GroupByArg::File => GroupBy::File,
            GroupByArg::Function => GroupBy::Function,
            GroupByArg::Label => GroupBy::Label,
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Json => ExportFormat::Json,
        }
    }
}

/// Window used by `report` and `summary` when neither `--days` nor `--all` is given.
pub const DEFAULT_DAYS: u32 = 30;

/// Time window flags shared by `report` and `summary`.
#[derive(clap::Args, Debug, Clone, Copy)]
pub struct WindowArgs {
    /// Include calls from the last N days [default: 30]
    #[arg(long)]
    pub days: Option<u32>,

    /// Include every stored call
    #[arg(long, conflicts_with = "days")]
    pub all: bool,
}

impl WindowArgs {
    pub fn window(&self) -> TimeWindow {
        if self.all {
            TimeWindow::All
        } else {
            TimeWindow::LastDays(self.days.unwrap_or(DEFAULT_DAYS))
        }
    }
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Show a cost breakdown grouped by model, file, function or label
    Report {
        /// Group results by this dimension
        #[arg(long = "by", value_enum, ignore_case = true, default_value_t = GroupByArg::Model)]
        group_by: GroupByArg,

        #[command(flatten)]
        window: WindowArgs,

        /// Only include calls for this model
        #[arg(long)]
        model: Option<String>,

        /// Only include calls with this label
        #[arg(long)]
        label: Option<String>,
    },

    /// Show totals and the top file and model
    Summary {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Export raw call records to CSV or JSON
    Export {
        #[arg(long, value_enum, ignore_case = true, default_value_t = FormatArg::Csv)]
        format: FormatArg,

        /// Output file (default: llm_spend_<timestamp>.<format>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only export calls from the last N days
        #[arg(long)]
        days: Option<u32>,
    },

    /// Delete stored call records
    Clear {
        /// Delete records older than N days. Omit to delete ALL records
        #[arg(long)]
        days: Option<u32>,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// List supported models and their pricing
    Models,
}

#[derive(clap::Parser, Debug)]
#[command(
    name = "llm-spend",
    version,
    about = "Track your AI API costs per file, function, and feature"
)]
pub struct Args {
    /// Spend store file. Defaults to ~/.llm-spend/spend.db
    #[arg(long, global = true, env = "LLM_SPEND_DB_PATH")]
    pub db: Option<PathBuf>,

    /// Emit JSON instead of text tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging on stderr (or set LLM_SPEND_LOG=debug)
    #[arg(long, global = true, env = "LLM_SPEND_DEBUG")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn parse() -> Self {
        <Args as clap::Parser>::parse()
    }
}
