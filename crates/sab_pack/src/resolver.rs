//! Resolution of dynamic packs across megapacks, loose packs and cinematics.
//!
//! A map only names its packs. The bytes live in one of:
//!
//! 1. a megapack indexing the pack's key, in registration order
//! 2. a standalone `.pack` file in the working folder
//! 3. the cinematics table, copied verbatim to `<name>.cin`
//!
//! A pack block found in the first two places starts with `ALBS`, a dummy `u32` and one
//! table of 24 byte [`PackFile`] records per category of the pack's layout. Record offsets
//! are relative to the start of the block.

use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::{Path, PathBuf},
};

use binrw::BinRead;
use bon::Builder;
use sab_core::{extract, HashRegistry, OutputSink, StreamCursor};
use tracing::{debug, info, instrument, warn};

use crate::{
    bind_or_warn,
    cinpack::CinematicTable,
    error::Result,
    map::{Category, DynamicPackDescriptor},
    megapack::{ArchiveIndex, PACK_MAGIC},
    meshpack::extract_mesh_pack,
};

/// Seekable byte source of an archive
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Cursor over any archive stream
pub type ArchiveStream = StreamCursor<Box<dyn ReadSeek>>;

fn archive_stream(reader: impl ReadSeek + 'static) -> ArchiveStream {
    let inner: Box<dyn ReadSeek> = Box::new(reader);
    StreamCursor::new(inner)
}

/// Sub-record of a pack block
#[derive(BinRead, Debug, Copy, Clone, PartialEq, Eq)]
pub struct PackFile {
    /// Hash of the resource
    pub hash0: u32,
    /// Offset of the payload
    pub offset: u32,
    /// Stored size
    pub size: u32,
    /// Size once extracted
    pub uncompressed_size: u32,
    /// Always zero
    pub null: u32,
    /// Secondary hash, zero for most resources
    pub hash1: u32,
}

/// An opened megapack and its index
pub struct MegaPack {
    name: String,
    cursor: ArchiveStream,
    index: ArchiveIndex,
}

impl MegaPack {
    /// Opens a megapack file
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(path.display().to_string(), BufReader::new(file))
    }

    /// Reads the table of a megapack from any stream
    pub fn from_reader(name: impl Into<String>, reader: impl ReadSeek + 'static) -> Result<Self> {
        let mut cursor = archive_stream(reader);
        let index = ArchiveIndex::read(&mut cursor)?;
        Ok(Self {
            name: name.into(),
            cursor,
            index,
        })
    }

    /// Name the megapack was opened with
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of the megapack
    pub fn index(&self) -> &ArchiveIndex {
        &self.index
    }
}

/// An opened cinematics table
pub struct Cinematics {
    cursor: ArchiveStream,
    table: CinematicTable,
}

impl Cinematics {
    /// Reads a cinematics table spanning the whole stream
    pub fn from_reader(reader: impl ReadSeek + 'static) -> Result<Self> {
        let mut cursor = archive_stream(reader);
        let end = cursor.size()?;
        let table = CinematicTable::read(&mut cursor, end)?;
        Ok(Self { cursor, table })
    }

    /// Table of the cinematics
    pub fn table(&self) -> &CinematicTable {
        &self.table
    }
}

/// Which unreferenced megapack entries [`ResourceResolver::report_unused`] reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnusedPolicy {
    /// Every entry
    #[default]
    All,
    /// Entries holding a pack block, other files being consumed by id elsewhere
    PackBlocksOnly,
}

/// Options of a [`ResourceResolver`]
#[derive(Debug, Clone, Builder)]
pub struct ResolverOptions {
    /// Folder searched for standalone `.pack` files
    #[builder(into)]
    pub working_dir: PathBuf,

    /// Unused entry reporting
    #[builder(default)]
    pub unused_policy: UnusedPolicy,
}

/// Where a pack was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// In the megapack registered at this position
    MegaPack(usize),
    /// In a standalone pack file
    LooseFile(PathBuf),
    /// In the cinematics table
    Cinematic,
    /// Nowhere, a warning was logged
    Missing,
}

/// Where the packs of a map were found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    pub megapack: usize,
    pub loose: usize,
    pub cinematics: usize,
    pub missing: usize,
    /// Megapack entries reported as unused
    pub unused: usize,
}

/// Locates the packs of a map and extracts their contents
pub struct ResourceResolver<'a> {
    registry: &'a HashRegistry,
    options: ResolverOptions,
    megapacks: Vec<MegaPack>,
    cinematics: Option<Cinematics>,
}

impl<'a> ResourceResolver<'a> {
    /// Creates a resolver with no archive
    pub fn new(registry: &'a HashRegistry, options: ResolverOptions) -> Self {
        Self {
            registry,
            options,
            megapacks: Vec::new(),
            cinematics: None,
        }
    }

    /// Registers a megapack, searched after the ones registered before it
    pub fn add_megapack(&mut self, megapack: MegaPack) {
        info!("{}: {} entries", megapack.name, megapack.index.len());
        self.megapacks.push(megapack);
    }

    /// Sets the cinematics table searched last
    pub fn set_cinematics(&mut self, cinematics: Cinematics) {
        info!("{} cinematics", cinematics.table.len());
        self.cinematics = Some(cinematics);
    }

    /// Registered megapacks
    pub fn megapacks(&self) -> &[MegaPack] {
        &self.megapacks
    }

    /// Finds the pack of `desc` and extracts it to `sink`.
    ///
    /// A pack found nowhere is logged and reported as [`Resolution::Missing`]. Errors only
    /// come from reading a pack that was found.
    #[instrument(skip_all, fields(pack = %desc.name))]
    pub fn resolve(
        &mut self,
        desc: &DynamicPackDescriptor,
        sink: &mut impl OutputSink,
    ) -> Result<Resolution> {
        for (position, megapack) in self.megapacks.iter_mut().enumerate() {
            if let Some(range) = megapack.index.lookup(desc.key) {
                debug!("found in {} at {:#x}", megapack.name, range.offset);
                megapack.cursor.seek(range.offset)?;
                extract_dynamic_pack(&mut megapack.cursor, desc, self.registry, sink)?;
                return Ok(Resolution::MegaPack(position));
            }
        }

        let path = self.options.working_dir.join(desc.loose_file_name());
        if path.is_file() {
            debug!("found {}", path.display());
            let mut cursor = StreamCursor::new(BufReader::new(File::open(&path)?));
            extract_dynamic_pack(&mut cursor, desc, self.registry, sink)?;
            return Ok(Resolution::LooseFile(path));
        }

        if let Some(cinematics) = self.cinematics.as_mut() {
            if let Some(range) = cinematics.table.lookup(desc.key) {
                cinematics.cursor.seek(range.offset)?;
                let data = cinematics.cursor.read_bytes(range.size as usize)?;
                sink.write_file(&format!("{}.cin", desc.name), &data)?;
                return Ok(Resolution::Cinematic);
            }
        }

        warn!(
            "could not find [{}] {}",
            self.registry.lookup(desc.key),
            desc.name
        );
        Ok(Resolution::Missing)
    }

    /// Resolves every pack in order, then reports the unused megapack entries.
    pub fn resolve_all(
        &mut self,
        descs: &[DynamicPackDescriptor],
        sink: &mut impl OutputSink,
    ) -> Result<ResolveSummary> {
        let mut summary = ResolveSummary::default();
        for desc in descs {
            match self.resolve(desc, sink)? {
                Resolution::MegaPack(_) => summary.megapack += 1,
                Resolution::LooseFile(_) => summary.loose += 1,
                Resolution::Cinematic => summary.cinematics += 1,
                Resolution::Missing => summary.missing += 1,
            }
        }
        summary.unused = self.report_unused()?;

        info!(
            "{} packs: {} in megapacks, {} loose, {} cinematics, {} missing",
            descs.len(),
            summary.megapack,
            summary.loose,
            summary.cinematics,
            summary.missing
        );
        Ok(summary)
    }

    /// Logs the megapack entries no pack resolved to, returning how many were reported.
    pub fn report_unused(&mut self) -> Result<usize> {
        let mut reported = 0;

        for megapack in &mut self.megapacks {
            let unused = megapack
                .index
                .unused()
                .map(|(key, range)| (key, range.offset))
                .collect::<Vec<_>>();

            for (key, offset) in unused {
                let report = match self.options.unused_policy {
                    UnusedPolicy::All => true,
                    UnusedPolicy::PackBlocksOnly => {
                        megapack.cursor.seek(offset)?;
                        let id = megapack.cursor.read_u32()?;
                        let dummy = megapack.cursor.read_u32()?;
                        id == PACK_MAGIC && dummy == 0
                    }
                };

                if report {
                    warn!(
                        "unused resource [{}] in {}",
                        self.registry.lookup(key),
                        megapack.name
                    );
                    reported += 1;
                }
            }
        }

        Ok(reported)
    }
}

fn output_name(
    registry: &HashRegistry,
    desc: &DynamicPackDescriptor,
    file: &PackFile,
    category: Category,
) -> String {
    format!(
        "{}{}.{}",
        desc.output_prefix(),
        registry.lookup(file.hash0),
        category.extension()
    )
}

/// Extracts the pack block at the cursor, as laid out by `desc`.
///
/// Returns the number of sub-records extracted. The cursor's position and origin are
/// restored afterwards.
#[instrument(skip_all, fields(pack = %desc.name))]
pub fn extract_dynamic_pack<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    desc: &DynamicPackDescriptor,
    registry: &HashRegistry,
    sink: &mut impl OutputSink,
) -> Result<usize> {
    cursor.push()?;
    cursor.set_relative_origin()?;
    let extracted = extract_pack_block(cursor, desc, registry, sink);
    cursor.pop()?;
    extracted
}

fn extract_pack_block<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    desc: &DynamicPackDescriptor,
    registry: &HashRegistry,
    sink: &mut impl OutputSink,
) -> Result<usize> {
    cursor.read_magic(PACK_MAGIC)?;
    cursor.read_reserved_u32("pack block dummy")?;

    let mut tables = Vec::new();
    for &category in desc.layout.categories() {
        let files: Vec<PackFile> = cursor.read_records(desc.counts.get(category) as usize)?;
        tables.push((category, files));
    }

    let prefix = desc.output_prefix();
    let texture_magic: &[u8] = if cursor.is_swapped() { b"XETD" } else { b"DTEX" };
    let mut extracted = 0;

    for (category, files) in tables {
        for file in files {
            if file.size == 0 && category != Category::Mesh {
                continue;
            }

            cursor.seek(file.offset as u64)?;
            match category {
                Category::Mesh => {
                    let name = extract_mesh_pack(cursor, &prefix, sink)?;
                    bind_or_warn(registry, file.hash0, &name);
                }
                Category::Physics => {
                    let data = extract(cursor, file.size, file.uncompressed_size)?;
                    sink.write_file(&output_name(registry, desc, &file, category), &data)?;
                }
                Category::Texture => {
                    let data = cursor.read_bytes(file.size as usize)?;
                    sink.new_file(&output_name(registry, desc, &file, category))?;
                    sink.send_data(texture_magic)?;
                    sink.send_data(&data)?;
                }
                Category::Flash
                | Category::Layout
                | Category::Framebuffer
                | Category::ParticleView => {
                    let data = cursor.read_bytes(file.size as usize)?;
                    sink.write_file(&output_name(registry, desc, &file, category), &data)?;
                }
            }
            extracted += 1;
        }
    }

    Ok(extracted)
}
