/// Returns the Go architecture name (`GOARCH`) of the machine running this process.
///
/// Returns `None` when the host architecture has no Go equivalent.
pub fn host_goarch() -> Option<&'static str> {
  goarch_for(std::env::consts::ARCH, cfg!(target_endian = "little"))
}

/// Maps a Rust `target_arch` value to the matching `GOARCH` value.
///
/// Go encodes endianness in the name for some families, so the caller passes it in.
pub fn goarch_for(arch: &str, little_endian: bool) -> Option<&'static str> {
  match (arch, little_endian) {
    ("x86_64", _) => Some("amd64"),
    ("aarch64", _) => Some("arm64"),
    ("x86", _) => Some("386"),
    ("arm", _) => Some("arm"),
    ("riscv64", _) => Some("riscv64"),
    ("powerpc64", true) => Some("ppc64le"),
    ("powerpc64", false) => Some("ppc64"),
    ("s390x", _) => Some("s390x"),
    ("loongarch64", _) => Some("loong64"),
    ("mips", true) => Some("mipsle"),
    ("mips", false) => Some("mips"),
    ("mips64", true) => Some("mips64le"),
    ("mips64", false) => Some("mips64"),
    ("wasm32", _) => Some("wasm"),
    _ => None,
  }
}
