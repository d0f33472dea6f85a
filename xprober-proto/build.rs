fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/xprober.proto");
    tonic_build::compile_protos("proto/xprober.proto")?;
    Ok(())
}
