use clap::{Parser, Subcommand};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::fs;
use std::sync::{Arc, Mutex};
use tensordb::core::config::{EngineConfig, CONFIG_FILE};
use tensordb::exec::{ExecOptions, ExecOutput, ScriptExecutor};
use tensordb::server::start_server;
use tensordb::TensorDb;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tensordb")]
#[command(version = "0.1")]
#[command(about = "TensorDB: hybrid relational/tensor store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start REPL (default)
    Repl,
    /// Run a script file
    Run {
        /// Path to the script file (.tql)
        file: String,
        /// Keep executing after per-statement errors
        #[arg(long)]
        batch: bool,
    },
    /// Start HTTP server
    Server {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Initialize a data directory and default configuration
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = EngineConfig::load();

    init_tracing(&config);

    match cli.command {
        Some(Commands::Run { file, batch }) => {
            let db = TensorDb::open(config)?;
            run_script_file(db, &file, batch)?;
        }
        Some(Commands::Server { port }) => {
            let port = port.unwrap_or(config.server.http_port);
            let host = config.server.host.clone();
            let db = TensorDb::open(config)?;
            let executor = Arc::new(Mutex::new(ScriptExecutor::new(db)));
            start_server(executor, &host, port).await;
        }
        Some(Commands::Init) => {
            handle_init(&config)?;
        }
        Some(Commands::Repl) | None => {
            let db = TensorDb::open(config)?;
            run_repl(ScriptExecutor::new(db))?;
        }
    }

    Ok(())
}

fn init_tracing(config: &EngineConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn handle_init(config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = &config.storage.data_dir;
    if !data_dir.exists() {
        fs::create_dir_all(data_dir)?;
        println!("Created directory: {}", data_dir.display().to_string().green());
    }

    if !std::path::Path::new(CONFIG_FILE).exists() {
        fs::write(CONFIG_FILE, EngineConfig::default_toml())?;
        println!("Created default configuration: {}", CONFIG_FILE.green());
    } else {
        println!("Configuration file already exists: {}", CONFIG_FILE.yellow());
    }

    println!("{}", "Initialization complete.".bold().blue());
    Ok(())
}

fn run_script_file(
    db: TensorDb,
    file: &str,
    batch: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = fs::read_to_string(file)?;
    let mut executor = ScriptExecutor::new(db);
    let report = executor.run_script(&source, ExecOptions { batch });

    for output in &report.outputs {
        if !matches!(output, ExecOutput::None) {
            println!("{}", output);
        }
    }

    if !report.errors.is_empty() {
        eprintln!("{} {}:", "Errors in".red(), file);
        for diag in &report.errors {
            for line in diag.to_string().lines() {
                eprintln!("  {}", line);
            }
        }
        if batch {
            eprintln!("{} error(s) (batch mode)", report.errors.len());
        } else {
            std::process::exit(1);
        }
    }

    Ok(())
}

fn run_repl(mut executor: ScriptExecutor) -> Result<(), Box<dyn std::error::Error>> {
    let mut rl = DefaultEditor::new()?;
    let history_path = ".tensordb_history";

    if rl.load_history(history_path).is_err() {
        // No history yet
    }

    println!("{}", "TensorDB REPL v0.1".bold().blue());
    println!("Statements end with ';'. Type 'EXIT' or use Ctrl-D to quit.");

    let mut current = String::new();

    loop {
        let prompt = if current.is_empty() { "tdb> " } else { " ..> " };
        let readline = rl.readline(prompt);

        match readline {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                if trimmed.eq_ignore_ascii_case("EXIT") {
                    break;
                }

                rl.add_history_entry(trimmed)?;

                if !current.is_empty() {
                    current.push('\n');
                }
                current.push_str(trimmed);

                if !trimmed.ends_with(';') {
                    continue;
                }

                match executor.execute_line(&current) {
                    Ok(output) => {
                        if !matches!(output, ExecOutput::None) {
                            println!("{}", output);
                        }
                    }
                    Err(e) => {
                        eprintln!("{}: {}", "Error".red(), e);
                    }
                }
                current.clear();
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted");
                current.clear();
                continue;
            }
            Err(ReadlineError::Eof) => {
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    let _ = rl.save_history(history_path);
    Ok(())
}
