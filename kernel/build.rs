use std::{env, path::PathBuf};

fn main() {
    let target = env::var("TARGET").expect("TARGET not set");
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");
    let kernel_dir = PathBuf::from(manifest_dir);

    // MSIM boots the kernel as a flat ELF at a fixed physical load address;
    // the linker script places text/data/bss accordingly and exports
    // `_kernel_end` for the frame allocator (see mm::frame).
    if target.contains("mips") {
        let linker_script = kernel_dir.join("src/arch/mips/link.ld");
        println!("cargo:rustc-link-arg=-T{}", linker_script.display());
        println!("cargo:rerun-if-changed=src/arch/mips/link.ld");
    }
}
