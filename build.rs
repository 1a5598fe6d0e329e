use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let root_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let proto_dir = root_dir.join("src/protos");

    protobuf_codegen::Codegen::new()
        .pure()
        .include(&proto_dir)
        .input(proto_dir.join("hllplus-unique.proto"))
        .cargo_out_dir("protos")
        .run()?;

    Ok(())
}
