fn main() {
    #[cfg(feature = "bladerf")]
    {
        println!("cargo:rustc-link-lib=bladeRF");
    }

    println!("cargo:rerun-if-changed=build.rs");
}
