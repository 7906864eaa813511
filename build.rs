fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // ESP-IDF link arguments are only needed for the firmware image; host
    // builds (unit tests, proptest, fuzz) skip them entirely.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
