//! Generates the Swift and Kotlin bindings of `CardKit`.

fn main() {
    uniffi::uniffi_bindgen_main();
}
