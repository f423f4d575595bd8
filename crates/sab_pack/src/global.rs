//! Extraction of the packs listed by the global map.
//!
//! The map is read from the loose file package of the folder, or from a standalone
//! `global.map` when there is no such package. Packs are looked up in `dynamic0.megapack`,
//! then `palettes0.megapack` when present, then as `<name>.pack` files.

use std::{
    fs::File,
    io::{BufReader, Cursor},
    path::Path,
};

use sab_core::{HashRegistry, OutputSink, StreamCursor};
use tracing::{info, instrument};

use crate::{
    error::{Error, Result},
    loosefiles::{find_loose_file, read_loose_file},
    map::{read_global_map, DynamicPackDescriptor},
    resolver::{MegaPack, ResolveSummary, ResolverOptions, ResourceResolver, UnusedPolicy},
    workdir::find_file,
};

fn load_global_map(work_dir: &Path) -> Result<Vec<DynamicPackDescriptor>> {
    if let Some(path) = find_file(work_dir, "loosefiles_*.pack")? {
        info!("found loose file package {}", path.display());
        let mut cursor = StreamCursor::new(BufReader::new(File::open(&path)?));

        return match find_loose_file(&mut cursor, "lobal.map")? {
            Some(file) => {
                let data = read_loose_file(&mut cursor, &file)?;
                read_global_map(&mut StreamCursor::new(Cursor::new(data)))
            }
            None => Ok(Vec::new()),
        };
    }

    info!("no loose file package, looking up global.map");
    let path = find_file(work_dir, "*lobal.map")?
        .ok_or_else(|| Error::ResourceNotFound("global.map".to_owned()))?;
    read_global_map(&mut StreamCursor::new(BufReader::new(File::open(&path)?)))
}

/// Extracts every pack of the global map found in `work_dir`.
#[instrument(skip(registry, sink))]
pub fn extract_global(
    work_dir: &Path,
    registry: &HashRegistry,
    sink: &mut impl OutputSink,
) -> Result<ResolveSummary> {
    let packs = load_global_map(work_dir)?;
    if packs.is_empty() {
        return Err(Error::ResourceNotFound("global.map".to_owned()));
    }

    let mut resolver = ResourceResolver::new(
        registry,
        ResolverOptions::builder()
            .working_dir(work_dir)
            .unused_policy(UnusedPolicy::All)
            .build(),
    );

    let dynamic = find_file(work_dir, "*ynamic0.megapack")?
        .ok_or_else(|| Error::ResourceNotFound("dynamic0.megapack".to_owned()))?;
    resolver.add_megapack(MegaPack::open(&dynamic)?);

    if let Some(palettes) = find_file(work_dir, "*alettes0.megapack")? {
        resolver.add_megapack(MegaPack::open(&palettes)?);
    }

    resolver.resolve_all(&packs, sink)
}
