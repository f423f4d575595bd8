pub mod archive;
pub mod hash;
pub mod map;
pub mod resource;

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use clap::Args;
use glob::Pattern;
use itertools::Itertools;
use miette::{miette, Context, IntoDiagnostic, Result};
use sab_core::{HashRegistry, StreamCursor};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::output::DirectorySink;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Print the hash of each string
    Hash(hash::HashArgs),
    /// Extract megapacks and kilopacks
    Megapack(archive::MegapackArgs),
    /// Extract loose file packages
    Loosefiles(archive::LooseFilesArgs),
    /// Extract compiled Lua packs
    Luapack(archive::LuaPackArgs),
    /// Extract tile packs
    Tilepack(archive::TilePackArgs),
    /// Extract the dynamic packs of the global map
    Global(map::GlobalArgs),
    /// Extract the dynamic packs of the France map
    France(map::FranceArgs),
    /// Extract animation packs
    Anims(resource::AnimsArgs),
    /// Convert material banks to JSON
    Materials(resource::MaterialsArgs),
    /// Extract shader bundles
    Shaders(resource::ShadersArgs),
    /// Convert textures to DDS
    Texture(resource::TextureArgs),
    /// Convert meshes to JSON
    Mesh(resource::MeshArgs),
}

impl Commands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            Commands::Hash(hash) => hash.handle(),
            Commands::Megapack(megapack) => megapack.handle(),
            Commands::Loosefiles(loosefiles) => loosefiles.handle(),
            Commands::Luapack(luapack) => luapack.handle(),
            Commands::Tilepack(tilepack) => tilepack.handle(),
            Commands::Global(global) => global.handle(),
            Commands::France(france) => france.handle(),
            Commands::Anims(anims) => anims.handle(),
            Commands::Materials(materials) => materials.handle(),
            Commands::Shaders(shaders) => shaders.handle(),
            Commands::Texture(texture) => texture.handle(),
            Commands::Mesh(mesh) => mesh.handle(),
        }
    }
}

/// Where extracted files go
#[derive(Args)]
pub struct OutputArgs {
    /// A target directory, each input gets a subdirectory named after it
    #[arg(short, long, value_name = "DIR", default_value = "output")]
    pub output: PathBuf,

    /// Allow overwriting existing files
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,
}

impl OutputArgs {
    /// Sink for the files extracted from `input`
    pub fn sink_for(&self, input: &Path) -> DirectorySink {
        let stem = input
            .file_stem()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("unnamed"));
        DirectorySink::new(self.output.join(stem), self.overwrite)
    }
}

/// Names of the hashes found in the data
#[derive(Args)]
pub struct DictionaryArgs {
    /// A dictionary file, one name per line
    #[arg(long, value_name = "FILE", env = "SAB_DICTIONARY")]
    pub dictionary: Option<PathBuf>,
}

impl DictionaryArgs {
    pub fn load(&self) -> Result<HashRegistry> {
        match &self.dictionary {
            Some(path) => HashRegistry::load(path)
                .context(format!("loading dictionary {}", path.display())),
            None => {
                warn!("no dictionary given, names are printed as hashes");
                Ok(HashRegistry::new())
            }
        }
    }
}

/// Inputs of a batch subcommand
#[derive(Args)]
pub struct InputArgs {
    /// Input files or directories, directories are searched recursively
    #[arg(required = true, value_name = "PATH")]
    pub inputs: Vec<PathBuf>,
}

impl InputArgs {
    /// Files given directly, plus the files below the given directories whose name
    /// matches one of the glob `patterns`.
    pub fn collect(&self, patterns: &[&str]) -> Result<Vec<PathBuf>> {
        collect_inputs(&self.inputs, patterns)
    }
}

pub fn collect_inputs(inputs: &[PathBuf], patterns: &[&str]) -> Result<Vec<PathBuf>> {
    let patterns = patterns
        .iter()
        .map(|p| Pattern::new(p).into_diagnostic().context(format!("pattern {p:?}")))
        .collect::<Result<Vec<_>>>()?;

    Ok(inputs
        .iter()
        .flat_map(|input| {
            if input.is_file() {
                return vec![input.clone()];
            }
            WalkDir::new(input)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|path| {
                    path.file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| patterns.iter().any(|p| p.matches(name)))
                })
                .collect()
        })
        .sorted()
        .dedup()
        .collect())
}

/// Runs `extract` on every input with its own sink.
///
/// A failing input is logged and the batch moves on; the batch fails if any input did.
pub fn run_batch(
    inputs: &[PathBuf],
    output: &OutputArgs,
    mut extract: impl FnMut(&Path, &mut DirectorySink) -> Result<()>,
) -> Result<()> {
    if inputs.is_empty() {
        return Err(miette!("no input file found"));
    }

    let mut failed = 0;
    for input in inputs {
        info!("processing {}", input.display());
        let mut sink = output.sink_for(input);

        let result = extract(input, &mut sink)
            .and_then(|()| sink.finish().context("flushing output"))
            .context(format!("path: {}", input.display()));

        match result {
            Ok(count) => info!("{}: {} files written", input.display(), count),
            Err(e) => {
                error!("{:?}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(miette!("{} of {} inputs failed", failed, inputs.len()));
    }
    Ok(())
}

/// Opens an input for decoding
pub fn open(path: &Path) -> Result<StreamCursor<BufReader<File>>> {
    let file = File::open(path)
        .into_diagnostic()
        .context(format!("opening {}", path.display()))?;
    Ok(StreamCursor::new(BufReader::new(file)))
}
