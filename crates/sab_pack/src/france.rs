//! Extraction of the packs listed by the France map.
//!
//! The map and the cinematics table are read from the loose file package of the folder,
//! or from standalone files when there is no such package. Packs are looked up in
//! `mega0.megapack`, then as `<key>.pack` files, then in the cinematics.

use std::{
    fs::File,
    io::{BufReader, Cursor},
    path::Path,
};

use sab_core::{HashRegistry, OutputSink, StreamCursor};
use tracing::{info, instrument};

use crate::{
    error::{Error, Result},
    loosefiles::{read_loose_file, read_loose_files},
    map::{read_france_map, FranceMap},
    resolver::{
        Cinematics, MegaPack, ResolveSummary, ResolverOptions, ResourceResolver, UnusedPolicy,
    },
    workdir::find_file,
};

fn load_from_package(
    path: &Path,
    registry: &HashRegistry,
) -> Result<(FranceMap, Option<Cinematics>)> {
    let mut cursor = StreamCursor::new(BufReader::new(File::open(path)?));
    let mut map = FranceMap::default();
    let mut cinematics = None;

    for file in read_loose_files(&mut cursor)? {
        if file.header.name.ends_with("rance.map") {
            let data = read_loose_file(&mut cursor, &file)?;
            map = read_france_map(&mut StreamCursor::new(Cursor::new(data)), registry)?;
        } else if file.header.name.ends_with("inematics.cinpack") {
            let data = read_loose_file(&mut cursor, &file)?;
            cinematics = Some(Cinematics::from_reader(Cursor::new(data))?);
        }
    }

    Ok((map, cinematics))
}

fn load_from_folder(
    work_dir: &Path,
    registry: &HashRegistry,
) -> Result<(FranceMap, Option<Cinematics>)> {
    let map_path = match find_file(work_dir, "*rance.map")? {
        Some(path) => path,
        None => find_file(work_dir, "FRANCE.map")?
            .ok_or_else(|| Error::ResourceNotFound("france.map".to_owned()))?,
    };
    let map = read_france_map(
        &mut StreamCursor::new(BufReader::new(File::open(&map_path)?)),
        registry,
    )?;

    info!("looking up cinematics.cinpack");
    let cinematics_path = find_file(work_dir, "*inematics.cinpack")?
        .ok_or_else(|| Error::ResourceNotFound("cinematics.cinpack".to_owned()))?;
    let cinematics = Cinematics::from_reader(BufReader::new(File::open(&cinematics_path)?))?;

    Ok((map, Some(cinematics)))
}

/// Extracts every pack of the France map found in `work_dir`.
#[instrument(skip(registry, sink))]
pub fn extract_france(
    work_dir: &Path,
    registry: &HashRegistry,
    sink: &mut impl OutputSink,
) -> Result<ResolveSummary> {
    let (map, cinematics) = match find_file(work_dir, "loosefiles_*.pack")? {
        Some(path) => {
            info!("found loose file package {}", path.display());
            load_from_package(&path, registry)?
        }
        None => {
            info!("no loose file package, looking up france.map");
            load_from_folder(work_dir, registry)?
        }
    };

    if map.packs.is_empty() && map.tiles.is_empty() {
        return Err(Error::ResourceNotFound("france.map".to_owned()));
    }
    info!("{}: {} tiles, {} packs", map.name, map.tiles.len(), map.packs.len());

    let mut resolver = ResourceResolver::new(
        registry,
        ResolverOptions::builder()
            .working_dir(work_dir)
            .unused_policy(UnusedPolicy::PackBlocksOnly)
            .build(),
    );

    let mega = find_file(work_dir, "*ega0.megapack")?
        .ok_or_else(|| Error::ResourceNotFound("mega0.megapack".to_owned()))?;
    resolver.add_megapack(MegaPack::open(&mega)?);

    if let Some(cinematics) = cinematics {
        resolver.set_cinematics(cinematics);
    }

    resolver.resolve_all(&map.packs, sink)
}
