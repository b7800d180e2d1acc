//! Tipitaka — admin tool for the Chunk / SubChunk / Sentence corpus database.

use std::fs::File;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;

use tipitaka_core::CorpusConfig;
use tipitaka_store::CorpusStore;

fn resolve_data_dir() -> PathBuf {
    std::env::var("TIPITAKA_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn print_help() {
    println!("Tipitaka — corpus store administration");
    println!();
    println!("Usage: tipitaka <command>");
    println!();
    println!("Commands:");
    println!("  init                     Create the database and schema");
    println!("  stats                    Show row and token counts");
    println!("  validate [db-file]       Audit schema and data quality (read-only)");
    println!("  import <file.jsonl>      Import chunk trees, one JSON object per line");
    println!("  export [file.jsonl]      Export every chunk tree as JSON Lines");
    println!("  wide [chunk-id]          Print the flattened chunk/sub-chunk/sentence join");
    println!("  show <chunk-id>          Print one chunk tree as JSON");
    println!("  delete <chunk-id>        Delete a chunk with all of its parts");
    println!("  help                     Show this help message");
    println!();
    println!("Environment: TIPITAKA_DATA_DIR, TIPITAKA_DB_FILE, TIPITAKA_ORDER_POLICY");
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");
    let arg = args.get(2).map(String::as_str);

    if matches!(command, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let config = CorpusConfig::from_env(resolve_data_dir())?;

    if command == "validate" {
        let db_path = arg
            .map(PathBuf::from)
            .unwrap_or_else(|| config.data_paths.db_file.clone());
        let report = commands::validate(&db_path)?;
        commands::print_report(&report);
        std::process::exit(if report.is_healthy() { 0 } else { 1 });
    }

    let store = CorpusStore::open_with_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;

    match (command, arg) {
        ("init", _) => {
            println!("Database ready at {}", store.db_path().display());
        }
        ("stats", _) => {
            commands::print_stats(&store.stats()?);
        }
        ("import", Some(path)) => {
            let count = commands::import_jsonl(&store, &PathBuf::from(path))?;
            println!("Imported {} chunk trees", count);
        }
        ("export", target) => {
            let path = target
                .map(PathBuf::from)
                .unwrap_or_else(|| commands::default_export_path(&config.data_paths));
            let file = File::create(&path)?;
            let count = commands::export_jsonl(&store, file)?;
            info!("Exported {} chunk trees to {}", count, path.display());
            println!("{}", path.display());
        }
        ("wide", chunk_id) => {
            commands::write_wide_rows(&store, chunk_id, std::io::stdout().lock())?;
        }
        ("show", Some(chunk_id)) => {
            let tree = commands::show_chunk(&store, chunk_id)?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
        ("delete", Some(chunk_id)) => {
            let report = commands::delete_chunk(&store, chunk_id)?;
            println!(
                "Deleted {}: {} sub-chunks, {} sentences",
                chunk_id, report.sub_chunks, report.sentences
            );
        }
        ("import" | "show" | "delete", None) => {
            eprintln!("Missing argument for '{}'. Use 'tipitaka help' for usage.", command);
            std::process::exit(1);
        }
        _ => {
            eprintln!("Unknown command: {}. Use 'tipitaka help' for usage.", command);
            std::process::exit(1);
        }
    }

    Ok(())
}
