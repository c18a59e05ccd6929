//! bulkcp CLI - bulk copy/move for files and storage objects.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use bulkcp::orchestrator::CatWriter;
use bulkcp::{CopyError, CopySession, CopySessionConfig, Locator};
use clap::Parser;
use tokio::io::AsyncWriteExt;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "bulkcp")]
#[command(about = "Bulk copy/move for files and storage objects")]
#[command(version)]
struct Cli {
    /// Source locators followed by one destination ("-" reads or writes a stream)
    #[arg(required = true)]
    paths: Vec<String>,

    /// Recurse into directories and container prefixes
    #[arg(short = 'r', long)]
    recursive: bool,

    /// Copy all object versions, not just the live ones
    #[arg(short = 'A', long)]
    all_versions: bool,

    /// Never replace an existing destination item
    #[arg(short = 'n', long)]
    no_clobber: bool,

    /// Keep going after per-item failures; fail the run at the end
    #[arg(short = 'c', long)]
    continue_on_error: bool,

    /// Route remote-to-remote copies through the local process
    #[arg(short = 'D', long)]
    daisy_chain: bool,

    /// Read source locators one per line from standard input
    #[arg(short = 'I', long)]
    stdin_sources: bool,

    /// Print the version-specific locator of each copied object
    #[arg(short = 'v', long)]
    print_result_url: bool,

    /// Manifest ledger path; enables resume across invocations
    #[arg(short = 'L', long)]
    manifest: Option<PathBuf>,

    /// Preserve source ACLs on copied objects
    #[arg(short = 'p', long)]
    preserve_acl: bool,

    /// Canned ACL applied to written objects
    #[arg(short = 'a', long)]
    canned_acl: Option<String>,

    /// Preserve POSIX metadata (uid/gid/mode/times)
    #[arg(short = 'P', long)]
    preserve_posix: bool,

    /// Storage class for written cloud objects
    #[arg(short = 's', long)]
    storage_class: Option<String>,

    /// Compress these extensions on the wire only (comma separated)
    #[arg(short = 'j', long, value_delimiter = ',')]
    gzip_transport: Option<Vec<String>>,

    /// Compress every file on the wire
    #[arg(short = 'J', long)]
    gzip_transport_all: bool,

    /// Store gzip-compressed content for these extensions (comma separated)
    #[arg(short = 'z', long, value_delimiter = ',')]
    gzip_local: Option<Vec<String>>,

    /// Store gzip-compressed content for every file
    #[arg(short = 'Z', long)]
    gzip_local_all: bool,

    /// Skip objects with unsupported types instead of failing
    #[arg(short = 'U', long)]
    skip_unsupported: bool,

    /// Do not follow or copy symbolic links
    #[arg(short = 'e', long)]
    exclude_symlinks: bool,

    /// Move instead of copy (delete each source after its transfer)
    #[arg(long = "move")]
    perform_move: bool,

    /// Worker pool size; values above 1 enable parallel execution
    #[arg(long, default_value = "1")]
    workers: usize,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,
}

impl Cli {
    fn to_config(&self) -> CopySessionConfig {
        CopySessionConfig {
            recursive: self.recursive,
            all_versions: self.all_versions,
            no_clobber: self.no_clobber,
            continue_on_error: self.continue_on_error,
            daisy_chain: self.daisy_chain,
            read_sources_from_stdin: self.stdin_sources,
            print_result_url: self.print_result_url,
            manifest_path: self.manifest.clone(),
            preserve_acl: self.preserve_acl,
            canned_acl: self.canned_acl.clone(),
            preserve_posix: self.preserve_posix,
            dest_storage_class: self.storage_class.clone(),
            gzip_wire_exts: self.gzip_transport.clone(),
            gzip_wire_all: self.gzip_transport_all,
            gzip_local_exts: self.gzip_local.clone(),
            gzip_local_all: self.gzip_local_all,
            skip_unsupported: self.skip_unsupported,
            perform_move: self.perform_move,
            exclude_symlinks: self.exclude_symlinks,
            workers: self.workers,
        }
    }
}

/// Concatenates local sources to standard output.
struct StdoutCat;

#[async_trait::async_trait]
impl CatWriter for StdoutCat {
    async fn concatenate(&self, sources: &[String]) -> bulkcp::Result<()> {
        let mut stdout = tokio::io::stdout();
        for raw in sources {
            let locator = Locator::parse(raw);
            let path = locator.as_path().ok_or_else(|| {
                CopyError::Config(format!("cannot concatenate non-local source {}", raw))
            })?;
            let mut file = tokio::fs::File::open(path).await?;
            tokio::io::copy(&mut file, &mut stdout).await?;
        }
        stdout.flush().await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CopyError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(CopyError::Config)?;

    let config = cli.to_config();
    let mut session = CopySession::new(config).with_cat_writer(Arc::new(StdoutCat));
    if cli.stdin_sources {
        info!("Reading source locators from standard input");
        session =
            session.with_source_reader(Box::new(tokio::io::BufReader::new(tokio::io::stdin())));
    }

    let result = session.run(&cli.paths).await?;

    if cli.output_json {
        println!("{}", result.to_json()?);
    } else {
        println!(
            "Operation completed over {} objects/{} bytes in {:.2}s.",
            result.objects_copied, result.bytes_transferred, result.elapsed_seconds
        );
        if result.objects_skipped > 0 {
            println!("  Skipped: {}", result.objects_skipped);
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr; stdout is reserved for results and concatenation.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
