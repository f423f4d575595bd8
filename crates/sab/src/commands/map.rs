use std::path::{Path, PathBuf};

use clap::Args;
use miette::{Context, Result};
use sab_core::HashRegistry;
use sab_pack::{extract_france, extract_global, resolver::ResolveSummary};
use tracing::info;

use super::{DictionaryArgs, OutputArgs};
use crate::output::DirectorySink;

/// Game data folder of a map extraction
#[derive(Args)]
pub struct GameFolderArgs {
    /// The folder holding the megapacks, or any file inside it
    #[arg(value_name = "PATH")]
    path: PathBuf,
}

impl GameFolderArgs {
    pub fn folder(&self) -> &Path {
        if self.path.is_file() {
            self.path.parent().unwrap_or(Path::new("."))
        } else {
            &self.path
        }
    }
}

fn extract_map(
    name: &str,
    folder: &GameFolderArgs,
    output: &OutputArgs,
    dictionary: &DictionaryArgs,
    extract: impl FnOnce(&Path, &HashRegistry, &mut DirectorySink) -> sab_pack::error::Result<ResolveSummary>,
) -> Result<()> {
    let registry = dictionary.load()?;
    let mut sink = DirectorySink::new(output.output.join(name), output.overwrite);

    let summary = extract(folder.folder(), &registry, &mut sink)
        .context(format!("extracting {} from {}", name, folder.folder().display()))?;
    let written = sink.finish().context("flushing output")?;

    info!(
        "{}: {} files written, {} packs missing, {} unused entries",
        name, written, summary.missing, summary.unused
    );
    registry.report();
    Ok(())
}

#[derive(Args)]
pub struct GlobalArgs {
    #[command(flatten)]
    folder: GameFolderArgs,

    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    dictionary: DictionaryArgs,
}

impl GlobalArgs {
    pub fn handle(&self) -> Result<()> {
        extract_map("global", &self.folder, &self.output, &self.dictionary, |dir, registry, sink| {
            extract_global(dir, registry, sink)
        })
    }
}

#[derive(Args)]
pub struct FranceArgs {
    #[command(flatten)]
    folder: GameFolderArgs,

    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    dictionary: DictionaryArgs,
}

impl FranceArgs {
    pub fn handle(&self) -> Result<()> {
        extract_map("france", &self.folder, &self.output, &self.dictionary, |dir, registry, sink| {
            extract_france(dir, registry, sink)
        })
    }
}
