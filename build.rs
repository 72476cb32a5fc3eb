use std::env;

const BACKEND_FEATURES: [&str; 6] = [
    "CARGO_FEATURE_OPENBLAS_STATIC",
    "CARGO_FEATURE_OPENBLAS_SYSTEM",
    "CARGO_FEATURE_NETLIB_STATIC",
    "CARGO_FEATURE_NETLIB_SYSTEM",
    "CARGO_FEATURE_INTEL_MKL_STATIC",
    "CARGO_FEATURE_INTEL_MKL_SYSTEM",
];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // With every LAPACK backend feature disabled, macOS builds take the
    // dgeev/dgetrf/dgesvd symbols from the Accelerate framework.
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let has_backend = BACKEND_FEATURES.iter().any(|f| env::var_os(f).is_some());
    if target_os == "macos" && !has_backend {
        println!("cargo:rustc-link-lib=framework=Accelerate");
    }
}
