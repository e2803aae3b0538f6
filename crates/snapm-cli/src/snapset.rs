//! `snapm snapset ...`: snapshot set lifecycle commands.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use snapm_core::Selection;
use snapm_manager::Manager;
use snapm_provider::Provider;
use snapm_provider_lvm2::{Lvm2CowProvider, Lvm2ThinProvider};
use snapm_provider_stratis::StratisProvider;

fn default_providers() -> Vec<Box<dyn Provider>> {
    vec![Box::new(Lvm2CowProvider::new()), Box::new(Lvm2ThinProvider::new()), Box::new(StratisProvider::new())]
}

fn open_manager() -> Result<Manager> {
    Manager::new(default_providers(), None).map_err(|e| anyhow!(e))
}

#[derive(Serialize)]
struct SnapshotSetJson {
    name: String,
    uuid: String,
    timestamp: i64,
    status: String,
    autoactivate: bool,
    sources: Vec<String>,
}

fn to_json(set: &snapm_core::SnapshotSet) -> SnapshotSetJson {
    SnapshotSetJson {
        name: set.name().to_string(),
        uuid: set.uuid().to_string(),
        timestamp: set.timestamp(),
        status: format!("{:?}", set.status()),
        autoactivate: set.autoactivate(),
        sources: set.sources(),
    }
}

fn print_set(set: &snapm_core::SnapshotSet, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&to_json(set))?);
    } else {
        println!("{} {} ts={} status={:?} sources={:?}", set.name(), set.uuid(), set.timestamp(), set.status(), set.sources());
    }
    Ok(())
}

#[derive(Args)]
pub struct CreateArgs {
    /// Name for the new snapshot set
    name: String,
    /// Sources, each optionally suffixed `:<size-policy>` (e.g. `/var:10%SIZE`)
    #[arg(required = true)]
    sources: Vec<String>,
    /// Suffix the name with the next free index instead of failing on collision
    #[arg(long)]
    autoindex: bool,
    /// Create a boot entry for the new snapshot set's root
    #[arg(long)]
    boot: bool,
    /// Create a revert boot entry for the new snapshot set's root
    #[arg(long)]
    revert: bool,
    /// Default size policy applied to sources with none specified
    #[arg(long)]
    default_size_policy: Option<String>,
    /// Emit machine-readable JSON output
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct SelectionArgs {
    /// Snapshot set name
    #[arg(long)]
    name: Option<String>,
    /// Snapshot set UUID
    #[arg(long)]
    uuid: Option<String>,
    /// Snapshot set basename (matches all autoindexed members)
    #[arg(long)]
    basename: Option<String>,
    /// Emit machine-readable JSON output
    #[arg(long)]
    json: bool,
}

impl SelectionArgs {
    fn selection(&self) -> Result<Selection> {
        if let Some(name) = &self.name {
            return Ok(Selection::by_name(name));
        }
        if let Some(uuid) = &self.uuid {
            let uuid = uuid::Uuid::parse_str(uuid).map_err(|e| anyhow!("invalid uuid: {e}"))?;
            return Ok(Selection::by_uuid(uuid));
        }
        if let Some(basename) = &self.basename {
            return Ok(Selection::by_basename(basename));
        }
        Ok(Selection::new())
    }
}

#[derive(Args)]
pub struct RenameArgs {
    old_name: String,
    new_name: String,
}

#[derive(Args)]
pub struct ResizeArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    uuid: Option<String>,
    /// Sources, each optionally suffixed `:<size-policy>`
    sources: Vec<String>,
    #[arg(long)]
    default_size_policy: Option<String>,
}

#[derive(Args)]
pub struct SplitArgs {
    src_name: String,
    dst_name: Option<String>,
    #[arg(long, value_delimiter = ',')]
    sources: Vec<String>,
}

#[derive(Subcommand)]
pub enum SnapsetCommands {
    /// Create a new snapshot set across one or more sources
    Create(CreateArgs),
    /// List snapshot sets matching a selection
    List(SelectionArgs),
    /// Delete snapshot sets matching a selection
    Delete(SelectionArgs),
    /// Rename a snapshot set
    Rename(RenameArgs),
    /// Resize a snapshot set's size policies
    Resize(ResizeArgs),
    /// Revert a snapshot set's origins to snapshot-time content
    Revert(SelectionArgs),
    /// Activate snapshot sets matching a selection
    Activate(SelectionArgs),
    /// Deactivate snapshot sets matching a selection
    Deactivate(SelectionArgs),
    /// Split sources out of a snapshot set into a new one
    Split(SplitArgs),
}

impl SnapsetCommands {
    pub async fn run(self) -> Result<()> {
        match self {
            SnapsetCommands::Create(args) => Self::create(args),
            SnapsetCommands::List(args) => Self::list(args),
            SnapsetCommands::Delete(args) => Self::delete(args),
            SnapsetCommands::Rename(args) => Self::rename(args),
            SnapsetCommands::Resize(args) => Self::resize(args),
            SnapsetCommands::Revert(args) => Self::revert(args),
            SnapsetCommands::Activate(args) => Self::activate(args),
            SnapsetCommands::Deactivate(args) => Self::deactivate(args),
            SnapsetCommands::Split(args) => Self::split(args),
        }
    }

    fn create(args: CreateArgs) -> Result<()> {
        let mut manager = open_manager()?;
        let timestamp = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0);
        let set = manager
            .create_snapshot_set(&args.name, &args.sources, args.default_size_policy.as_deref(), args.boot, args.revert, args.autoindex, timestamp)
            .map_err(|e| anyhow!(e))?;
        print_set(set, args.json)
    }

    fn list(args: SelectionArgs) -> Result<()> {
        let mut manager = open_manager()?;
        manager.discover_snapshot_sets().map_err(|e| anyhow!(e))?;
        let selection = args.selection()?;
        for set in manager.find_snapshot_sets(&selection) {
            print_set(set, args.json)?;
        }
        Ok(())
    }

    fn delete(args: SelectionArgs) -> Result<()> {
        let mut manager = open_manager()?;
        let selection = args.selection()?;
        let count = manager.delete_snapshot_sets(&selection).map_err(|e| anyhow!(e))?;
        if args.json {
            println!("{}", serde_json::json!({ "deleted": count }));
        } else {
            println!("deleted {count} snapshot set(s)");
        }
        Ok(())
    }

    fn rename(args: RenameArgs) -> Result<()> {
        let mut manager = open_manager()?;
        manager.rename_snapshot_set(&args.old_name, &args.new_name).map_err(|e| anyhow!(e))
    }

    fn resize(args: ResizeArgs) -> Result<()> {
        let mut manager = open_manager()?;
        let uuid = args.uuid.as_deref().map(uuid::Uuid::parse_str).transpose().map_err(|e| anyhow!("invalid uuid: {e}"))?;
        manager
            .resize_snapshot_set(args.name.as_deref(), uuid, &args.sources, args.default_size_policy.as_deref())
            .map_err(|e| anyhow!(e))
    }

    fn revert(args: SelectionArgs) -> Result<()> {
        let mut manager = open_manager()?;
        let uuid = args.uuid.as_deref().map(uuid::Uuid::parse_str).transpose().map_err(|e| anyhow!("invalid uuid: {e}"))?;
        manager.revert_snapshot_set(args.name.as_deref(), uuid).map_err(|e| anyhow!(e))
    }

    fn activate(args: SelectionArgs) -> Result<()> {
        let mut manager = open_manager()?;
        let selection = args.selection()?;
        let count = manager.activate_snapshot_sets(&selection).map_err(|e| anyhow!(e))?;
        println!("activated {count} snapshot set(s)");
        Ok(())
    }

    fn deactivate(args: SelectionArgs) -> Result<()> {
        let mut manager = open_manager()?;
        let selection = args.selection()?;
        let count = manager.deactivate_snapshot_sets(&selection).map_err(|e| anyhow!(e))?;
        println!("deactivated {count} snapshot set(s)");
        Ok(())
    }

    fn split(args: SplitArgs) -> Result<()> {
        let mut manager = open_manager()?;
        manager.split_snapshot_set(&args.src_name, args.dst_name.as_deref(), &args.sources).map_err(|e| anyhow!(e))
    }
}
