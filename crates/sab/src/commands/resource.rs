use clap::Args;
use miette::Result;
use sab_formats::{
    extract_anim_pack, extract_materials, extract_mesh, extract_shaders, extract_texture,
};
use tracing::{debug, info};

use super::{open, run_batch, DictionaryArgs, InputArgs, OutputArgs};

#[derive(Args)]
pub struct AnimsArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    dictionary: DictionaryArgs,
}

impl AnimsArgs {
    pub fn handle(&self) -> Result<()> {
        let registry = self.dictionary.load()?;
        let inputs = self.input.collect(&["*nimations.pack"])?;

        let result = run_batch(&inputs, &self.output, |path, sink| {
            let pack = extract_anim_pack(&mut open(path)?, &registry, sink)?;
            info!(
                "{} animations, {} sequences, {} transitions",
                pack.anims.as_ref().map_or(0, Vec::len),
                pack.sequences.as_ref().map_or(0, Vec::len),
                pack.transitions.as_ref().map_or(0, Vec::len)
            );
            Ok(())
        });
        registry.report();
        result
    }
}

#[derive(Args)]
pub struct MaterialsArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    dictionary: DictionaryArgs,
}

impl MaterialsArgs {
    pub fn handle(&self) -> Result<()> {
        let registry = self.dictionary.load()?;
        let inputs = self.input.collect(&["*.materials"])?;

        let result = run_batch(&inputs, &self.output, |path, sink| {
            let count = extract_materials(&mut open(path)?, &registry, sink)?;
            info!("{} materials", count);
            Ok(())
        });
        registry.report();
        result
    }
}

#[derive(Args)]
pub struct ShadersArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    dictionary: DictionaryArgs,
}

impl ShadersArgs {
    pub fn handle(&self) -> Result<()> {
        let registry = self.dictionary.load()?;
        let inputs = self.input.collect(&["*.shaders"])?;

        let result = run_batch(&inputs, &self.output, |path, sink| {
            let shaders = extract_shaders(&mut open(path)?, &registry, sink)?;
            info!("{} shaders", shaders.len());
            Ok(())
        });
        registry.report();
        result
    }
}

#[derive(Args)]
pub struct TextureArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    output: OutputArgs,
}

impl TextureArgs {
    pub fn handle(&self) -> Result<()> {
        let inputs = self.input.collect(&["*.dtex"])?;
        run_batch(&inputs, &self.output, |path, sink| {
            let name = extract_texture(&mut open(path)?, sink)?;
            debug!("converted {}", name);
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct MeshArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    dictionary: DictionaryArgs,
}

impl MeshArgs {
    pub fn handle(&self) -> Result<()> {
        let registry = self.dictionary.load()?;
        let inputs = self.input.collect(&["*.msh"])?;

        let result = run_batch(&inputs, &self.output, |path, sink| {
            let buffers_path = path.with_extension("dat");
            let mut buffers = if buffers_path.is_file() {
                Some(open(&buffers_path)?)
            } else {
                None
            };

            let name = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("mesh");
            let model = extract_mesh(&mut open(path)?, buffers.as_mut(), name, &registry, sink)?;
            info!(
                "{} nodes, {} primitives",
                model.nodes.len(),
                model.primitives.len()
            );
            Ok(())
        });
        registry.report();
        result
    }
}
