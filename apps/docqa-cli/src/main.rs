use std::env;
use std::path::PathBuf;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use docqa_core::config::Config;
use docqa_rag::DocQa;

const USAGE: &str = "Usage:
  docqa ingest <file> --id <document_id>
  docqa ask <index_path> <query...>
  docqa search <index_path> <query...> [--limit N]
  docqa cleanup <document_id>";

fn usage_exit(message: &str) -> ! {
    eprintln!("Error: {message}\n\n{USAGE}");
    std::process::exit(2);
}

/// Splits `--flag value` pairs out of `args`, leaving positionals in order.
fn take_flag(args: &mut Vec<String>, flag: &str) -> Option<String> {
    let i = args.iter().position(|a| a == flag)?;
    if i + 1 >= args.len() {
        usage_exit(&format!("{flag} requires a value"));
    }
    let value = args.remove(i + 1);
    args.remove(i);
    Some(value)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        usage_exit("missing command");
    }
    let cmd = args.remove(0);

    let settings = Config::load()?.settings()?;
    let qa = DocQa::from_settings(&settings)?;

    match cmd.as_str() {
        "ingest" => {
            let id = take_flag(&mut args, "--id").unwrap_or_else(|| usage_exit("ingest requires --id"));
            let file = args.first().map(PathBuf::from).unwrap_or_else(|| usage_exit("ingest requires a file"));
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| usage_exit("ingest requires a file"));
            let bytes = tokio::fs::read(&file).await?;

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")?);
            spinner.set_message(format!("ingesting {}", file.display()));
            spinner.enable_steady_tick(Duration::from_millis(120));
            let result = qa.ingest_upload(&id, &filename, bytes).await;
            spinner.finish_and_clear();
            print_json(&result?)?;
        }
        "ask" => {
            if args.len() < 2 {
                usage_exit("ask requires an index path and a query");
            }
            let index_path = PathBuf::from(args.remove(0));
            let answer = qa.answer(&args.join(" "), &index_path).await?;
            print_json(&answer)?;
        }
        "search" => {
            let limit = match take_flag(&mut args, "--limit") {
                Some(l) => l.parse::<usize>().unwrap_or_else(|_| usage_exit("--limit requires a number")),
                None => settings.retrieval.top_k,
            };
            if args.len() < 2 {
                usage_exit("search requires an index path and a query");
            }
            let index_path = PathBuf::from(args.remove(0));
            let hits = qa.search(&args.join(" "), &index_path, limit).await?;
            print_json(&hits)?;
        }
        "cleanup" => {
            let id = args.first().unwrap_or_else(|| usage_exit("cleanup requires a document id"));
            let report = qa.cleanup(id).await?;
            print_json(&report)?;
            if !report.is_complete() {
                std::process::exit(1);
            }
        }
        other => usage_exit(&format!("unknown command '{other}'")),
    }
    Ok(())
}
