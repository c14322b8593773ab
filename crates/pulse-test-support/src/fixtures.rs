//! Environment checks for integration suites.

use std::path::Path;
use std::process::Command;

/// Returns `true` if a Docker daemon is reachable for integration tests.
#[must_use]
pub fn docker_available() -> bool {
    docker_available_with_host(std::env::var("DOCKER_HOST").ok())
}

fn docker_available_with_host(host: Option<String>) -> bool {
    if let Some(host) = host {
        return host
            .strip_prefix("unix://")
            .is_none_or(|socket| Path::new(socket).exists());
    }

    Path::new("/var/run/docker.sock").exists()
        || Command::new("docker")
            .arg("info")
            .output()
            .is_ok_and(|output| output.status.success())
}
