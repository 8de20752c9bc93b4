#![no_main]

use libfuzzer_sys::fuzz_target;
use meshslice::{MeshFormat, loader};

fuzz_target!(|data: &[u8]| {
    // Content sniffing path
    let _ = loader::load_bytes(data, None);

    // Every reader on the same bytes, regardless of what the sniffer picks
    for format in [
        MeshFormat::Stl,
        MeshFormat::Obj,
        MeshFormat::Ply,
        MeshFormat::ThreeMf,
    ] {
        let _ = loader::load_bytes(data, Some(format));
    }
});
