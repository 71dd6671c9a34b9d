use anyhow::{Context, Result, bail};
use chrono::Local;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use llm_spend::cli::{Args, Command};
use llm_spend::db::{RecordFilter, SpendStore, TimeWindow};
use llm_spend::display::{
    Painter, build_models_json, build_report_json, build_summary_json, print_json_output,
    render_models, render_report, render_summary,
};
use llm_spend::export::{ExportFormat, export_to_path};
use llm_spend::pricing::PRICING;
use llm_spend::report::{GroupBy, report, summary};
use llm_spend::utils::default_db_path;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let db_path = match args.db.clone() {
        Some(path) => path,
        None => default_db_path().context("resolve spend store location")?,
    };
    log::debug!("using spend store {}", db_path.display());
    let store = SpendStore::open(db_path);
    let painter = Painter::detect();

    match args.command {
        Command::Report {
            group_by,
            window,
            model,
            label,
        } => {
            let group_by: GroupBy = group_by.into();
            let window = window.window();
            let filter = RecordFilter {
                window,
                model,
                label,
            };
            let rows = report(&store, group_by, &filter).context("read spend store")?;
            if args.json {
                print_json_output(&build_report_json(&rows, group_by, window))?;
            } else if rows.is_empty() {
                println!("{}", painter.dim("No records found for the selected period."));
            } else {
                print!("{}", render_report(&rows, group_by, window, &painter));
            }
        }
        Command::Summary { window } => {
            let window = window.window();
            let filter = RecordFilter {
                window,
                ..RecordFilter::default()
            };
            let totals = summary(&store, &filter).context("read spend store")?;
            if args.json {
                print_json_output(&build_summary_json(&totals, window))?;
            } else {
                print!("{}", render_summary(&totals, window, &painter));
            }
        }
        Command::Export {
            format,
            output,
            days,
        } => {
            let format: ExportFormat = format.into();
            let output = output.unwrap_or_else(|| default_export_path(format));
            let filter = RecordFilter {
                window: days.map(TimeWindow::LastDays).unwrap_or_default(),
                ..RecordFilter::default()
            };
            let count = export_to_path(&store, format, &filter, &output)
                .with_context(|| format!("export to {}", output.display()))?;
            println!(
                "{}",
                painter.cost(&format!("Exported {count} record(s) to {}", output.display()))
            );
        }
        Command::Clear { days, yes } => {
            let message = match days {
                None => "This will delete ALL call records.".to_string(),
                Some(n) => format!("This will delete records older than {n} days."),
            };
            if !yes && !confirm(&message)? {
                bail!("aborted, no records deleted");
            }
            let deleted = store.clear(days).context("clear spend store")?;
            println!("{}", painter.cost(&format!("Deleted {deleted} record(s).")));
        }
        Command::Models => {
            if args.json {
                print_json_output(&build_models_json(PRICING))?;
            } else {
                print!("{}", render_models(PRICING, &painter));
            }
        }
    }
    Ok(())
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let env = env_logger::Env::default().filter_or("LLM_SPEND_LOG", default_level);
    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .init();
}

fn default_export_path(format: ExportFormat) -> PathBuf {
    let ts = Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("llm_spend_{ts}.{}", format.extension()))
}

/// Ask on stderr, read one line from stdin. Only `y` / `yes` confirm.
fn confirm(message: &str) -> Result<bool> {
    eprint!("{message}  Continue? [y/N] ");
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("read confirmation")?;
    let answer = answer.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}
