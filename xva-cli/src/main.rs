use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::fs;
use std::path::PathBuf;

use xva_core::archive::create_archive;
use xva_core::chunk::{chunk_image, ChunkObserver, DEFAULT_CHUNK_SIZE};
use xva_core::descriptor::{self, DescriptorConfig};

/// Reference under which the root disk's chunks are stored inside the
/// archive; the descriptor's VBD points at the same ref.
const ROOT_VDI_REF: &str = "Ref:VDI-1-root";

#[derive(Parser)]
#[command(name = "img2xva", version, about = "Create an XVA from a sparse raw image")]
struct Cli {
    /// Path of the raw image
    image: PathBuf,
    /// CPU number of the VM
    #[arg(short, long, default_value_t = 2)]
    cpus: u32,
    /// Memory size of the VM in GiB
    #[arg(short, long, default_value_t = 4)]
    memory: u64,
    /// Chunk size in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u64,
    /// Where to write the XVA (default: <image stem>.xva in the current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Enable verbose mode for debugging
    #[arg(short, long)]
    verbose: bool,
}

struct LogObserver;

impl ChunkObserver for LogObserver {
    fn on_chunk_written(&mut self, index: u64) {
        debug!("wrote chunk {index}");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto)
        .context("init logging")?;

    let image_name = cli
        .image
        .file_stem()
        .context("image path has no file name")?
        .to_string_lossy()
        .into_owned();

    // Staging dir is dropped on every exit path, success or not, so partial
    // output never survives a failed run.
    let staging = tempfile::tempdir().context("create staging dir")?;
    let vdi_dir = staging.path().join(ROOT_VDI_REF);

    info!("Chunking {}...", cli.image.display());
    let chunks = chunk_image(&cli.image, &vdi_dir, cli.chunk_size, &mut LogObserver)?;

    // The staging dir's random suffix keeps repeated imports of the same
    // image distinguishable on the host.
    let staging_suffix = staging
        .path()
        .file_name()
        .map(|n| n.to_string_lossy().trim_start_matches(".tmp").to_owned())
        .unwrap_or_default();

    let cfg = DescriptorConfig {
        vm_name_label: format!("{image_name}-{staging_suffix}"),
        vm_name_description: image_name.clone(),
        memory_bytes: cli.memory * 1024 * 1024 * 1024,
        vcpus: cli.cpus,
        root_vdi_virtual_size_bytes: chunks.virtual_size,
        root_vdi_ref: ROOT_VDI_REF.to_owned(),
    };

    let ova_xml_path = staging.path().join("ova.xml");
    info!("Populating {}...", ova_xml_path.display());
    fs::write(&ova_xml_path, descriptor::render(&cfg)?)
        .with_context(|| format!("write {}", ova_xml_path.display()))?;

    let xva_path = cli.output.unwrap_or_else(|| PathBuf::from(format!("{image_name}.xva")));
    info!("Creating {}...", xva_path.display());
    let mut members = vec![ova_xml_path];
    members.extend(chunks.files.iter().cloned());
    create_archive(&xva_path, staging.path(), &members)?;

    Ok(())
}
