//! Hardware hint detection module for wav2flac
//!
//! Makes a best-effort guess at the GPU vendor so the encoder invocation can
//! carry matching acceleration flags. Detection never fails: anything that
//! goes wrong yields [`AcceleratorHint::Unknown`].

use serde::{Deserialize, Serialize};
use std::process::Command;

/// Vendor substrings in priority order
const VENDOR_PATTERNS: &[(&str, AcceleratorHint)] = &[
    ("NVIDIA", AcceleratorHint::Nvidia),
    ("AMD", AcceleratorHint::Amd),
    ("ATI", AcceleratorHint::Amd),
    ("Intel", AcceleratorHint::Intel),
];

/// lspci device classes that describe a display adapter
const DISPLAY_CLASSES: &[&str] = &["VGA", "3D controller", "Display controller"];

/// Best-effort accelerator vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceleratorHint {
    Nvidia,
    Amd,
    Intel,
    Unknown,
}

impl AcceleratorHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcceleratorHint::Nvidia => "nvidia",
            AcceleratorHint::Amd => "amd",
            AcceleratorHint::Intel => "intel",
            AcceleratorHint::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AcceleratorHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Find the highest-priority vendor mentioned in `text`
fn match_vendor(text: &str) -> Option<AcceleratorHint> {
    VENDOR_PATTERNS
        .iter()
        .find(|(pattern, _)| contains_word(text, pattern))
        .map(|(_, hint)| *hint)
}

/// Substring match that refuses to match inside a longer alphabetic word,
/// so "ATI" does not fire on "Corporation" or "COMPATIBLE".
fn contains_word(text: &str, word: &str) -> bool {
    text.match_indices(word).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + word.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_alphabetic())
            && !after.is_some_and(|c| c.is_ascii_alphabetic())
    })
}

/// Classify `lspci` output.
///
/// Only display-class lines are considered when any are present; otherwise the
/// whole listing is searched.
pub fn from_device_listing(listing: &str) -> AcceleratorHint {
    let display_lines: Vec<&str> = listing
        .lines()
        .filter(|line| DISPLAY_CLASSES.iter().any(|class| line.contains(class)))
        .collect();

    let matched = if display_lines.is_empty() {
        match_vendor(listing)
    } else {
        // Priority applies across all adapters, not per line
        VENDOR_PATTERNS
            .iter()
            .find(|(pattern, _)| display_lines.iter().any(|line| contains_word(line, pattern)))
            .map(|(_, hint)| *hint)
    };

    matched.unwrap_or(AcceleratorHint::Unknown)
}

/// Classify a list of video controller names; the first recognised adapter wins.
pub fn from_adapter_names<'a, I>(names: I) -> AcceleratorHint
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .find_map(match_vendor)
        .unwrap_or(AcceleratorHint::Unknown)
}

/// Run a command and return its stdout when it exits successfully
fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

/// Detect the accelerator vendor of the host.
///
/// Read-only and stateless, safe to call from any worker.
pub fn detect() -> AcceleratorHint {
    if cfg!(target_os = "linux") {
        command_stdout("lspci", &[])
            .map(|listing| from_device_listing(&listing))
            .unwrap_or(AcceleratorHint::Unknown)
    } else if cfg!(target_os = "windows") {
        command_stdout(
            "powershell",
            &[
                "-NoProfile",
                "-Command",
                "Get-CimInstance Win32_VideoController | ForEach-Object { $_.Name }",
            ],
        )
        .map(|names| from_adapter_names(names.lines()))
        .unwrap_or(AcceleratorHint::Unknown)
    } else {
        AcceleratorHint::Unknown
    }
}
