fn main() {
    #[cfg(feature = "libiio")]
    libiio::generate_bindings();
}

#[cfg(feature = "libiio")]
mod libiio {
    use std::{env, path::PathBuf};

    pub fn generate_bindings() {
        println!("cargo:rustc-link-lib=iio");
        println!("cargo:rerun-if-changed=wrapper.h");

        let bindings = bindgen::Builder::default()
            .header("wrapper.h")
            .allowlist_function("iio_.*")
            .allowlist_type("iio_.*")
            .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
            .generate()
            .expect("Unable to generate libiio bindings");

        let out_path = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
        bindings
            .write_to_file(out_path.join("iio_bindings.rs"))
            .expect("Couldn't write bindings!");
    }
}
