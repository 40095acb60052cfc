use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Bundles the descriptor and chunk files into a gzip tar at `xva_path`,
/// stripping the staging directory prefix from stored member names so the
/// archive root holds `ova.xml` next to the VDI chunk directories.
///
/// Members are stored in the order given; XVA consumers expect `ova.xml`
/// first.
pub fn create_archive(xva_path: &Path, staging_dir: &Path, members: &[PathBuf]) -> Result<()> {
    let transform = format!("s~{}/~~", staging_dir.display());
    let status = Command::new("tar")
        .arg("zchfP")
        .arg(xva_path)
        .arg("--transform")
        .arg(&transform)
        .args(members)
        .status()
        .context("run tar")?;
    if !status.success() {
        bail!("tar exited with {status}");
    }
    Ok(())
}
