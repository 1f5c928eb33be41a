//! `init` — write a starter roster.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::config;

pub fn init(path: &Path, force: bool) -> Result<()> {
	if path.exists() && !force {
		bail!(
			"{} already exists (use --force to overwrite)",
			path.display()
		);
	}

	fs::write(path, config::SAMPLE_ROSTER)
		.with_context(|| format!("cannot write {}", path.display()))?;
	println!("wrote sample roster to {}", path.display());
	println!("fill in real account names and credentials, then run: idlefarm run");
	Ok(())
}
