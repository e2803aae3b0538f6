//! `snapm diff ...`: filesystem comparison between two mounted roots.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use uuid::Uuid;

use snapm_fsdiff::{DiffOptions, DiffRoot, DiffTree, FsDiffer};

#[derive(Args)]
pub struct CompareArgs {
    /// Mounted root to compare from
    root_a: PathBuf,
    /// Mounted root to compare to
    root_b: PathBuf,
    /// Skip the on-disk result cache
    #[arg(long)]
    no_cache: bool,
    /// Include unified content diffs for modified files
    #[arg(long)]
    content_diffs: bool,
    /// Render as an indented tree instead of a flat list
    #[arg(long)]
    tree: bool,
    /// Emit machine-readable JSON output
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
pub enum DiffCommands {
    /// Compare two mounted snapshot roots
    Compare(CompareArgs),
}

impl DiffCommands {
    pub async fn run(self) -> Result<()> {
        match self {
            DiffCommands::Compare(args) => Self::compare(args),
        }
    }

    fn compare(args: CompareArgs) -> Result<()> {
        let mut options = DiffOptions::default();
        options.include_content_diffs = args.content_diffs;

        let differ = FsDiffer::new(options)?.with_cache(!args.no_cache);
        let root_a = DiffRoot::new(args.root_a.display().to_string(), args.root_a.clone(), Some(Uuid::new_v4()));
        let root_b = DiffRoot::new(args.root_b.display().to_string(), args.root_b.clone(), Some(Uuid::new_v4()));

        let results = differ.compare_roots(&root_a, &root_b).map_err(|e| anyhow!(e))?;

        if args.json {
            println!("{}", results.json(true)?);
        } else if args.tree {
            print!("{}", DiffTree::build(&results).render());
        } else {
            println!("{}", results.full());
            println!("{}", results.summary());
        }
        Ok(())
    }
}
