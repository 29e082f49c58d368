/// Returns the Go kernel name (`GOOS`) of the machine running this process.
///
/// Returns `None` when the host OS has no Go equivalent.
pub fn host_goos() -> Option<&'static str> {
  goos_for(std::env::consts::OS)
}

/// Maps a Rust `target_os` value to the matching `GOOS` value.
pub fn goos_for(os: &str) -> Option<&'static str> {
  match os {
    "linux" => Some("linux"),
    "macos" => Some("darwin"),
    "windows" => Some("windows"),
    "freebsd" => Some("freebsd"),
    "netbsd" => Some("netbsd"),
    "openbsd" => Some("openbsd"),
    "dragonfly" => Some("dragonfly"),
    "solaris" => Some("solaris"),
    "illumos" => Some("illumos"),
    "android" => Some("android"),
    "ios" => Some("ios"),
    _ => None,
  }
}
