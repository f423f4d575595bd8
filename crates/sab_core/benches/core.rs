use divan::AllocProfiler;

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

pub mod hash {
    use divan::Bencher;
    use sab_core::{hash_string, HashRegistry};

    fn get_dictionary() -> String {
        (0..10_000)
            .map(|i| format!("levels/france/tile_{i:05}.lay\r\n"))
            .collect()
    }

    #[divan::bench]
    fn hash_name() {
        divan::black_box(hash_string(divan::black_box(
            "characters/sean/sean_body_hi.msh",
        )));
    }

    #[divan::bench]
    fn load_dictionary(bencher: Bencher) {
        bencher
            .with_inputs(get_dictionary)
            .bench_refs(|text| divan::black_box(HashRegistry::from_dictionary(text)));
    }

    #[divan::bench]
    fn lookup(bencher: Bencher) {
        let registry = HashRegistry::from_dictionary(&get_dictionary());
        let id = hash_string("levels/france/tile_00042.lay");
        bencher.bench_local(move || divan::black_box(registry.lookup(id)));
    }
}

pub mod compression {
    use divan::Bencher;
    use flate2::{write::ZlibEncoder, Compression};
    use sab_core::{extract, StreamCursor};
    use std::io::{Cursor, Write};

    fn get_input() -> (Vec<u8>, u32) {
        let plain: Vec<u8> = (0..0x40000u32).map(|i| (i % 251) as u8).collect();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&plain).unwrap();
        (encoder.finish().unwrap(), plain.len() as u32)
    }

    #[divan::bench]
    fn inflate_block(bencher: Bencher) {
        bencher.with_inputs(get_input).bench_refs(|(packed, size)| {
            let compressed = packed.len() as u32;
            let mut cursor = StreamCursor::new(Cursor::new(packed.as_slice()));
            divan::black_box(extract(&mut cursor, compressed, *size).unwrap());
        });
    }
}
