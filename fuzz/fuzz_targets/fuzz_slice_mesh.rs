#![no_main]

use libfuzzer_sys::fuzz_target;
use meshslice::{Slicer, SlicerConfig};

fuzz_target!(|data: &[u8]| {
    // Interpret the input as ASCII OBJ so arbitrary geometry reaches the slicer
    let Ok(mut slicer) = Slicer::new(SlicerConfig::new().with_layer_height(0.5)) else {
        return;
    };
    if slicer.load_mesh_bytes(data, Some(meshslice::MeshFormat::Obj)).is_err() {
        return;
    }
    // Skip inputs that would produce an enormous number of layers or infill lines
    if slicer
        .bounding_box()
        .is_none_or(|b| !b.size.iter().all(|&s| s < 1000.0))
    {
        return;
    }
    let _ = slicer.slice();
    let _ = slicer.statistics();
    let _ = slicer.write_gcode(std::io::sink());
});
