fn main() {
    // Oboe is C++; Android builds must link libc++_shared so symbols like
    // __cxa_pure_virtual resolve on every ABI.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("android") {
        println!("cargo:rustc-link-lib=c++_shared");
    }
}
