use std::fs;

/// Files that hold a per-installation machine id.
const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Usually root-only; read when available.
const BOARD_SERIAL_PATH: &str = "/sys/devices/virtual/dmi/id/board_serial";

pub fn machine_identifiers() -> Vec<String> {
    let mut ids = Vec::new();

    if let Some(machine_id) = MACHINE_ID_PATHS
        .iter()
        .filter_map(|path| fs::read_to_string(path).ok())
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
    {
        ids.push(machine_id);
    }

    if let Ok(serial) = fs::read_to_string(BOARD_SERIAL_PATH) {
        ids.push(serial.trim().to_string());
    }

    ids
}
