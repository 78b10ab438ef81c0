//! `dr nmcopy`, `dr nmmove`, `dr nmsplit`, `dr nmsort`: manifest batch tools.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use dr_core::nm_tools::{self, Relocation};

#[derive(Args, Debug)]
pub struct NmRelocateArgs {
    pub manifest: PathBuf,
    pub dest_dir: PathBuf,
}

impl NmRelocateArgs {
    pub fn run_copy(self) -> Result<()> {
        let relocation = nm_tools::copy(&self.manifest, &self.dest_dir)
            .with_context(|| format!("failed to copy {}", self.manifest.display()))?;
        report("copied", &relocation);
        Ok(())
    }

    pub fn run_move(self) -> Result<()> {
        let relocation = nm_tools::move_to(&self.manifest, &self.dest_dir)
            .with_context(|| format!("failed to move {}", self.manifest.display()))?;
        report("moved", &relocation);
        Ok(())
    }
}

fn report(verb: &str, relocation: &Relocation) {
    println!(
        "{verb} {} file(s) and manifest to {}",
        relocation.files.len(),
        relocation.manifest.display()
    );
}

#[derive(Args, Debug)]
pub struct NmSplitArgs {
    pub manifest: PathBuf,
    /// Upper bound on files per output manifest (a longer batch stays whole).
    pub max_files: usize,
}

impl NmSplitArgs {
    pub fn run(self) -> Result<()> {
        let written = nm_tools::split(&self.manifest, self.max_files)
            .with_context(|| format!("failed to split {}", self.manifest.display()))?;
        for path in &written {
            println!("wrote {}", path.display());
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct NmSortArgs {
    pub manifest: PathBuf,
}

impl NmSortArgs {
    pub fn run(self) -> Result<()> {
        let written = nm_tools::sort(&self.manifest)
            .with_context(|| format!("failed to sort {}", self.manifest.display()))?;
        println!("wrote {}", written.display());
        Ok(())
    }
}
