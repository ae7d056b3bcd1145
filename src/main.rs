use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bimx::archive::{self, ExtractOptions, MemberFilter, PackOptions};
use bimx::codec::QuickLz;
use bimx::{bxpk, verify, zres, ModelRecord};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bimx", about = "BXPK / ZRES hyper-model bundle tool")]
struct Cli {
    /// Minimum log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a BXPK archive from files ('-' reads standard input)
    Pack {
        /// Archive to write ('-' for standard output)
        #[arg(short, long)]
        output: PathBuf,
        /// Descend into directories
        #[arg(short, long)]
        recursive: bool,
        /// Strip directories from member names
        #[arg(short = 'j', long)]
        flatten: bool,
        #[arg(required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    /// List BXPK members
    List {
        input: PathBuf,
    },
    /// Check every BXPK member against its stored SHA-1
    Verify {
        input: PathBuf,
    },
    /// Extract BXPK members
    Unpack {
        input: PathBuf,
        #[command(flatten)]
        extract: ExtractArgs,
    },
    /// List ZRES members with stored and decompressed sizes
    ZresList {
        input: PathBuf,
    },
    /// Extract ZRES members, plus textures from the export bundle
    ZresUnpack {
        input: PathBuf,
        #[command(flatten)]
        extract: ExtractArgs,
    },
    /// Decode the export bundle of a ZRES archive
    Model {
        input: PathBuf,
        /// Print the decoded structure as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct ExtractArgs {
    /// Destination directory (default: <archive>.d)
    #[arg(short = 'C', long)]
    output_dir: Option<PathBuf>,
    /// Strip directories from member names
    #[arg(short = 'j', long)]
    flatten: bool,
    /// Print selected member names instead of writing them
    #[arg(short, long)]
    list: bool,
    /// Write member contents to standard output instead of files
    #[arg(short = 'o', long)]
    stdout: bool,
    /// Only members matching these globs
    #[arg(short, long, num_args = 1..)]
    include: Vec<String>,
    /// Skip members matching these globs (wins over --include)
    #[arg(short, long, num_args = 1..)]
    exclude: Vec<String>,
}

impl ExtractArgs {
    fn options(&self, input: &Path) -> Result<ExtractOptions> {
        let mut opts = ExtractOptions::for_archive(input);
        if let Some(dir) = &self.output_dir {
            opts.destination = dir.clone();
        }
        opts.flatten = self.flatten;
        opts.list_only = self.list;
        opts.to_stdout = self.stdout;
        opts.filter = MemberFilter::new(&self.include, &self.exclude)
            .context("invalid member pattern")?;
        Ok(opts)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level).with_context(|| format!("bad log level '{level}'"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, recursive, flatten, input } => {
            let inputs = archive::collect_inputs(&input, &PackOptions { recursive, flatten })?;
            if inputs.is_empty() {
                bail!("no input files");
            }
            for (name, path) in &inputs {
                tracing::info!("  packing {} as {name}", path.display());
            }
            let bytes = archive::pack_files(&output, &inputs)
                .with_context(|| format!("writing {}", output.display()))?;
            if output.as_os_str() == archive::STDIO_PATH {
                tracing::info!("wrote {} member(s), {bytes} B to standard output", inputs.len());
            } else {
                println!("Created: {} ({} member(s), {bytes} B)", output.display(), inputs.len());
            }
        }

        // ── BXPK ─────────────────────────────────────────────────────────────
        Commands::List { input } => {
            let buf = read(&input)?;
            let members = bxpk::decode(&buf)?;
            println!("Archive: {} ({} member(s))", input.display(), members.footer().member_count);
            println!("{:>10} {:>10}  {:<40}  Name", "Offset", "Size", "SHA-1");
            for member in members {
                let m = member?;
                println!("{:>10} {:>10}  {:<40}  {}", m.offset, m.data.len(), m.digest, m.name);
            }
        }

        Commands::Verify { input } => {
            let buf = read(&input)?;
            let members = bxpk::decode_all(&buf)?;
            let checks = verify::verify_members(&members);
            for check in &checks {
                match &check.result {
                    Ok(()) => println!("  ok    {}", check.name),
                    Err(e) => println!("  FAIL  {e}"),
                }
            }
            let failed = verify::failures(&checks);
            if failed > 0 {
                bail!("{failed} of {} member(s) failed verification", checks.len());
            }
            println!("All {} member(s) verified", checks.len());
        }

        Commands::Unpack { input, extract } => {
            let buf = read(&input)?;
            let opts = extract.options(&input)?;
            let report = archive::unpack_bxpk(&buf, &opts)?;
            finish_extract(&opts, &report);
        }

        // ── ZRES ─────────────────────────────────────────────────────────────
        Commands::ZresList { input } => {
            let buf = read(&input)?;
            let members = zres::decode(&buf, &QuickLz)?;
            println!("Archive: {} ({} slot(s))", input.display(), members.file_count());
            println!("{:>10} {:>10} {:>10} {:>6}  Name", "Offset", "Stored", "Expanded", "Ratio");
            for member in members {
                let m = member?;
                let (expanded, ratio) = match m.ratio() {
                    Some(r) => (m.data().len().to_string(), format!("{r:.2}")),
                    None    => (String::new(), String::new()),
                };
                println!("{:>10} {:>10} {:>10} {:>6}  {}", m.stored_offset, m.stored_size, expanded, ratio, m.name);
            }
        }

        Commands::ZresUnpack { input, extract } => {
            let buf = read(&input)?;
            let opts = extract.options(&input)?;
            let report = archive::unpack_zres(&buf, &QuickLz, &opts)?;
            finish_extract(&opts, &report);
        }

        // ── Model ────────────────────────────────────────────────────────────
        Commands::Model { input, json } => {
            let buf = read(&input)?;
            let (_, bundle) = zres::read_bundle(&buf, &QuickLz)?;
            let Some(bundle) = bundle else {
                bail!("{} has no {} / {} pair", input.display(), zres::OFFSETS_MEMBER, zres::EXPORT_MEMBER);
            };
            let model = bundle.model()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&model)?);
                return Ok(());
            }
            println!("Model: {}", input.display());
            if let Some(h) = &model.element_header {
                println!("  Element group header {:?}", h.info);
            }
            for record in &model.records {
                match record {
                    ModelRecord::Element(e) => println!(
                        "  element {:>6}  type {:>4}  meshes {:>3}  vertices {:>6}  triangles {:>6}  {}  {}",
                        e.id, e.type_code, e.meshes.len(), e.vertex_count(), e.triangle_count(),
                        e.guid, e.element_tag,
                    ),
                    ModelRecord::Texture(t) => println!(
                        "  texture {:>10} B  {}", t.data.len(), t.name,
                    ),
                }
            }
            println!(
                "  {} element(s), {} texture(s), {} record(s) skipped",
                model.elements().count(), model.textures().count(), model.skipped,
            );
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn read(path: &Path) -> Result<Vec<u8>> {
    archive::read_input(path).with_context(|| format!("reading {}", path.display()))
}

fn finish_extract(opts: &ExtractOptions, report: &archive::ExtractReport) {
    if opts.list_only {
        for name in &report.selected {
            println!("{name}");
        }
    } else if opts.to_stdout {
        tracing::info!("streamed {} member(s) to standard output", report.selected.len());
    } else {
        println!("Unpacked {} file(s) to: {}", report.written.len(), opts.destination.display());
    }
}
