use std::process::Command;

/// Reads `IOPlatformUUID` from `ioreg -rd1 -c IOPlatformExpertDevice`.
pub fn machine_identifiers() -> Vec<String> {
    let output = match Command::new("ioreg")
        .args(["-rd1", "-c", "IOPlatformExpertDevice"])
        .output()
    {
        Ok(output) => output,
        Err(_) => return Vec::new(),
    };

    let text = String::from_utf8_lossy(&output.stdout);
    text.lines()
        .find(|line| line.contains("IOPlatformUUID"))
        .and_then(|line| line.split('=').nth(1))
        .map(|value| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
        .into_iter()
        .collect()
}
