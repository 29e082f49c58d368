use gocross_lib::platform::Host;

use crate::output::{print_stat, print_warning};

pub fn cmd_info() {
  let host = Host::current();
  println!("System:");
  print_stat("Host platform", &host.to_string());
  print_stat(
    "Rust target",
    &format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS),
  );
  if host.kernel.is_none() || host.arch.is_none() {
    print_warning("host has no Go equivalent, every build is treated as a cross-compile");
  }
}
