use clap::Args;
use miette::Result;
use sab_pack::{
    loosefiles::extract_loose_files, luapack::extract_lua_pack, megapack::extract_megapack,
    tilepack::extract_tile_pack,
};
use tracing::info;

use super::{open, run_batch, DictionaryArgs, InputArgs, OutputArgs};

#[derive(Args)]
pub struct MegapackArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    dictionary: DictionaryArgs,
}

impl MegapackArgs {
    pub fn handle(&self) -> Result<()> {
        let registry = self.dictionary.load()?;
        let inputs = self
            .input
            .collect(&["*.kilopack", "*.kiloPack", "*.megapack", "*.megaPack"])?;

        let result = run_batch(&inputs, &self.output, |path, sink| {
            let count = extract_megapack(&mut open(path)?, &registry, sink)?;
            info!("{} entries", count);
            Ok(())
        });
        registry.report();
        result
    }
}

#[derive(Args)]
pub struct LooseFilesArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    output: OutputArgs,
}

impl LooseFilesArgs {
    pub fn handle(&self) -> Result<()> {
        let inputs = self.input.collect(&["loosefiles_*.pack"])?;
        run_batch(&inputs, &self.output, |path, sink| {
            extract_loose_files(&mut open(path)?, sink)?;
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct LuaPackArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    output: OutputArgs,
}

impl LuaPackArgs {
    pub fn handle(&self) -> Result<()> {
        let inputs = self.input.collect(&["*.luap"])?;
        run_batch(&inputs, &self.output, |path, sink| {
            extract_lua_pack(&mut open(path)?, sink)?;
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct TilePackArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    dictionary: DictionaryArgs,
}

impl TilePackArgs {
    pub fn handle(&self) -> Result<()> {
        let registry = self.dictionary.load()?;
        let inputs = self
            .input
            .collect(&["*.pack"])?
            .into_iter()
            .filter(|path| {
                !path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("loosefiles_"))
            })
            .collect::<Vec<_>>();

        let result = run_batch(&inputs, &self.output, |path, sink| {
            extract_tile_pack(&mut open(path)?, &registry, sink)?;
            Ok(())
        });
        registry.report();
        result
    }
}
