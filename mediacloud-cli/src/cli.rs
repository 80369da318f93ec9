use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use core_library::QueryBounds;
use core_migration::BatchKind;
use std::path::PathBuf;

/// Move a media catalog to and from remote object storage
#[derive(Parser, Debug)]
#[command(name = "mediacloud", author, version, about, long_about = None)]
pub struct Args {
    /// JSON configuration file (storage settings, derivative sizes, paths)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Catalog database (overrides the configuration file)
    #[arg(long = "database", value_name = "FILE", global = true)]
    pub database: Option<PathBuf>,

    /// Directory catalog paths are relative to (overrides the configuration file)
    #[arg(long = "upload-root", value_name = "DIR", global = true)]
    pub upload_root: Option<PathBuf>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload originals and derivatives to remote storage
    Import(Selection),

    /// Recompute derivative metadata from the configured sizes
    Regenerate(Selection),

    /// Detach items from remote storage (remote objects are kept)
    Unlink {
        #[command(flatten)]
        selection: Selection,

        /// Do not ask for confirmation
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },

    /// Show batch progress
    Status {
        /// Only this batch kind
        #[arg(value_enum)]
        kind: Option<KindArg>,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask a running batch to stop before its next item
    Cancel {
        #[arg(value_enum)]
        kind: KindArg,
    },
}

/// Which catalog items a run covers
#[derive(ClapArgs, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    /// Process at most N items
    #[arg(long, value_name = "N")]
    pub limit: Option<u32>,

    /// Skip the first N items (ignored without --limit)
    #[arg(long, value_name = "N", conflicts_with = "page")]
    pub offset: Option<u32>,

    /// 1-based page of --limit items
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub page: Option<u32>,
}

impl Selection {
    pub fn bounds(&self) -> QueryBounds {
        let mut bounds = QueryBounds::all();
        if let Some(limit) = self.limit {
            bounds = bounds.with_limit(limit);
        }
        if let Some(offset) = self.offset {
            bounds = bounds.with_offset(offset);
        }
        if let Some(page) = self.page {
            bounds = bounds.with_page(page);
        }
        bounds
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindArg {
    Import,
    #[value(alias = "regenerate")]
    RegenerateThumbnails,
    Unlink,
}

impl From<KindArg> for BatchKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Import => BatchKind::Import,
            KindArg::RegenerateThumbnails => BatchKind::RegenerateThumbnails,
            KindArg::Unlink => BatchKind::Unlink,
        }
    }
}
