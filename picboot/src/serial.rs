use anyhow::{Context, Result, bail};

/// Serial ports usable on this host.
///
/// On macOS only the callout devices (`/dev/cu.*`) are listed; opening `/dev/tty.*` waits for
/// carrier detect, which bootloaders never assert.
pub fn available_port_names() -> Result<Vec<String>> {
    let ports = serialport::available_ports().context("Failed to get available ports list")?;
    Ok(ports
        .into_iter()
        .map(|p| p.port_name)
        .filter(|name| !cfg!(target_os = "macos") || !name.starts_with("/dev/tty."))
        .collect())
}

/// Map a user supplied port name to the device that should be opened.
pub fn normalize_port_name(port_name: &str) -> String {
    if cfg!(target_os = "macos") && port_name.starts_with("/dev/tty.") {
        return port_name.replacen("/dev/tty.", "/dev/cu.", 1);
    }
    port_name.to_string()
}

/// Normalize `port_name` and make sure the port exists.
pub fn resolve_port(port_name: &str) -> Result<String> {
    let port_name = normalize_port_name(port_name);
    let available = available_port_names()?;
    if available.iter().any(|p| *p == port_name) {
        return Ok(port_name);
    }
    bail!(
        "The specified port '{}' does not exist. Available ports: {}",
        port_name,
        if available.is_empty() {
            "No available ports".to_string()
        } else {
            available.join(", ")
        }
    )
}
