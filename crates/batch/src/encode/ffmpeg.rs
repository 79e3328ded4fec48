//! FFmpeg encoder module for wav2flac
//!
//! Builds and executes the FFmpeg invocation that turns one WAV file into FLAC,
//! with vendor acceleration hints taken from a fixed table.

use crate::hardware::AcceleratorHint;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Default encoder executable
pub const DEFAULT_ENCODER: &str = "ffmpeg";

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Encoder process exited with non-zero status
    #[error("encoder failed with exit code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    /// Encoder process was terminated by signal
    #[error("encoder was terminated by signal: {stderr}")]
    Terminated { stderr: String },

    /// IO error while starting or waiting for the encoder
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EncodeError {
    /// Captured stderr of a failed run, if the process ran at all
    pub fn stderr(&self) -> Option<&str> {
        match self {
            EncodeError::Failed { stderr, .. } | EncodeError::Terminated { stderr } => {
                Some(stderr.as_str())
            }
            EncodeError::Io(_) => None,
        }
    }
}

/// FLAC compression level accepted by the encoder (0-12)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 12;

    /// Validate a raw level
    pub fn new(level: u8) -> Result<Self, InvalidCompressionLevel> {
        if level <= Self::MAX {
            Ok(Self(level))
        } else {
            Err(InvalidCompressionLevel(level))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(6)
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for CompressionLevel {
    type Error = InvalidCompressionLevel;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::new(level)
    }
}

impl From<CompressionLevel> for u8 {
    fn from(level: CompressionLevel) -> Self {
        level.0
    }
}

/// Rejected compression level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("compression level {0} is outside 0..=12")]
pub struct InvalidCompressionLevel(pub u8);

/// Acceleration settings for one vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorProfile {
    pub hwaccel: &'static str,
    pub hwaccel_output_format: &'static str,
    pub codec: &'static str,
    pub extra_args: &'static [&'static str],
}

const NVIDIA_PROFILE: VendorProfile = VendorProfile {
    hwaccel: "cuda",
    hwaccel_output_format: "cuda",
    codec: "flac",
    extra_args: &["-hwaccel_device", "0"],
};

const AMD_PROFILE: VendorProfile = VendorProfile {
    hwaccel: "d3d11va",
    hwaccel_output_format: "d3d11",
    codec: "flac",
    extra_args: &[],
};

const INTEL_PROFILE: VendorProfile = VendorProfile {
    hwaccel: "qsv",
    hwaccel_output_format: "qsv",
    codec: "flac",
    extra_args: &["-load_plugin", "hevc_hw"],
};

/// Used when the hint is unknown
pub const GENERIC_PROFILE: VendorProfile = VendorProfile {
    hwaccel: "auto",
    hwaccel_output_format: "nv12",
    codec: "flac",
    extra_args: &[],
};

/// Look up the vendor table entry for a hint
pub fn vendor_profile(hint: AcceleratorHint) -> Option<&'static VendorProfile> {
    match hint {
        AcceleratorHint::Nvidia => Some(&NVIDIA_PROFILE),
        AcceleratorHint::Amd => Some(&AMD_PROFILE),
        AcceleratorHint::Intel => Some(&INTEL_PROFILE),
        AcceleratorHint::Unknown => None,
    }
}

/// A fully resolved encoder run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderInvocation {
    /// Encoder executable
    pub program: OsString,
    /// Arguments in execution order
    pub args: Vec<OsString>,
    /// File the encoder is expected to produce
    pub output_path: PathBuf,
}

impl EncoderInvocation {
    /// Build a Command ready for execution
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Arguments as lossy strings, for logging
    pub fn display_args(&self) -> String {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Build the default `ffmpeg` invocation
pub fn build(
    input_path: &Path,
    output_path: &Path,
    level: CompressionLevel,
    hint: AcceleratorHint,
) -> EncoderInvocation {
    build_with_program(OsStr::new(DEFAULT_ENCODER), input_path, output_path, level, hint)
}

/// Build an encoder invocation
///
/// Argument layout:
/// `-hwaccel A -hwaccel_output_format F [extra] -i INPUT -compression_level N -c:a CODEC -y -loglevel error OUTPUT`
///
/// Hardware flags are input options and only take effect before `-i`.
pub fn build_with_program(
    program: &OsStr,
    input_path: &Path,
    output_path: &Path,
    level: CompressionLevel,
    hint: AcceleratorHint,
) -> EncoderInvocation {
    let profile = vendor_profile(hint).unwrap_or(&GENERIC_PROFILE);

    let mut args: Vec<OsString> = vec![
        "-hwaccel".into(),
        profile.hwaccel.into(),
        "-hwaccel_output_format".into(),
        profile.hwaccel_output_format.into(),
    ];
    args.extend(profile.extra_args.iter().map(|arg| OsString::from(*arg)));

    args.push("-i".into());
    args.push(input_path.as_os_str().to_owned());
    args.push("-compression_level".into());
    args.push(level.to_string().into());
    args.push("-c:a".into());
    args.push(profile.codec.into());
    args.push("-y".into());
    args.push("-loglevel".into());
    args.push("error".into());
    args.push(output_path.as_os_str().to_owned());

    EncoderInvocation {
        program: program.to_owned(),
        args,
        output_path: output_path.to_path_buf(),
    }
}

/// Execute an encoder invocation, capturing its output
///
/// # Returns
/// * `Ok(())` - Encoder exited with status 0
/// * `Err(EncodeError)` - Encoder could not start, exited non-zero, or was killed
pub fn run(invocation: &EncoderInvocation) -> Result<(), EncodeError> {
    let output = invocation.to_command().output()?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    match output.status.code() {
        Some(code) => Err(EncodeError::Failed { code, stderr }),
        None => Err(EncodeError::Terminated { stderr }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn args_of(invocation: &EncoderInvocation) -> Vec<String> {
        invocation
            .args
            .iter()
            .filter_map(|arg| arg.to_str().map(String::from))
            .collect()
    }

    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|pair| pair[0] == flag && pair[1] == value)
    }

    fn position(args: &[String], flag: &str) -> usize {
        args.iter().position(|arg| arg == flag).unwrap()
    }

    fn hint_strategy() -> impl Strategy<Value = AcceleratorHint> {
        prop_oneof![
            Just(AcceleratorHint::Nvidia),
            Just(AcceleratorHint::Amd),
            Just(AcceleratorHint::Intel),
            Just(AcceleratorHint::Unknown),
        ]
    }

    #[test]
    fn test_nvidia_invocation_exact() {
        let invocation = build(
            Path::new("/music/a.wav"),
            Path::new("/music/a.flac"),
            CompressionLevel::default(),
            AcceleratorHint::Nvidia,
        );

        assert_eq!(invocation.program, OsString::from("ffmpeg"));
        assert_eq!(
            args_of(&invocation),
            vec![
                "-hwaccel", "cuda", "-hwaccel_output_format", "cuda", "-hwaccel_device", "0",
                "-i", "/music/a.wav", "-compression_level", "6", "-c:a", "flac", "-y",
                "-loglevel", "error", "/music/a.flac",
            ]
        );
        assert_eq!(invocation.output_path, PathBuf::from("/music/a.flac"));
    }

    #[test]
    fn test_intel_extra_params() {
        let invocation = build(
            Path::new("in.wav"),
            Path::new("out.flac"),
            CompressionLevel::new(12).unwrap(),
            AcceleratorHint::Intel,
        );
        let args = args_of(&invocation);
        assert!(has_flag_with_value(&args, "-hwaccel", "qsv"));
        assert!(has_flag_with_value(&args, "-hwaccel_output_format", "qsv"));
        assert!(has_flag_with_value(&args, "-load_plugin", "hevc_hw"));
        assert!(has_flag_with_value(&args, "-compression_level", "12"));
    }

    #[test]
    fn test_amd_has_no_extra_params() {
        let invocation = build(
            Path::new("in.wav"),
            Path::new("out.flac"),
            CompressionLevel::default(),
            AcceleratorHint::Amd,
        );
        let args = args_of(&invocation);
        assert_eq!(&args[..5], &["-hwaccel", "d3d11va", "-hwaccel_output_format", "d3d11", "-i"]);
    }

    #[test]
    fn test_unknown_falls_back_to_auto() {
        let invocation = build(
            Path::new("in.wav"),
            Path::new("out.flac"),
            CompressionLevel::default(),
            AcceleratorHint::Unknown,
        );
        let args = args_of(&invocation);
        assert!(has_flag_with_value(&args, "-hwaccel", "auto"));
        assert!(has_flag_with_value(&args, "-hwaccel_output_format", "nv12"));
        assert!(has_flag_with_value(&args, "-c:a", "flac"));
        assert!(vendor_profile(AcceleratorHint::Unknown).is_none());
    }

    #[test]
    fn test_custom_program() {
        let invocation = build_with_program(
            OsStr::new("/opt/ffmpeg/bin/ffmpeg"),
            Path::new("in.wav"),
            Path::new("out.flac"),
            CompressionLevel::default(),
            AcceleratorHint::Unknown,
        );
        assert_eq!(invocation.to_command().get_program(), OsStr::new("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn test_compression_level_bounds() {
        assert!(CompressionLevel::new(0).is_ok());
        assert!(CompressionLevel::new(12).is_ok());
        assert_eq!(CompressionLevel::new(13), Err(InvalidCompressionLevel(13)));
        assert_eq!(CompressionLevel::default().get(), 6);
    }

    #[test]
    fn test_compression_level_serde_rejects_out_of_range() {
        let ok: CompressionLevel = serde_json::from_str("9").unwrap();
        assert_eq!(ok.get(), 9);
        assert!(serde_json::from_str::<CompressionLevel>("40").is_err());
    }

    #[test]
    fn test_run_missing_program_is_io_error() {
        let invocation = build_with_program(
            OsStr::new("/nonexistent/wav2flac-test-encoder"),
            Path::new("in.wav"),
            Path::new("out.flac"),
            CompressionLevel::default(),
            AcceleratorHint::Unknown,
        );
        assert!(matches!(run(&invocation), Err(EncodeError::Io(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_invocation_ordering(
            input in "[a-zA-Z0-9_/.-]{1,40}",
            output in "[a-zA-Z0-9_/.-]{1,40}",
            level in 0u8..=12,
            hint in hint_strategy(),
        ) {
            let level = CompressionLevel::new(level).unwrap();
            let first = build(Path::new(&input), Path::new(&output), level, hint);
            let second = build(Path::new(&input), Path::new(&output), level, hint);
            prop_assert_eq!(&first, &second);

            let args = args_of(&first);
            let input_flag = position(&args, "-i");

            prop_assert_eq!(&args[input_flag + 1], &input);
            prop_assert!(position(&args, "-hwaccel") < input_flag);
            prop_assert!(position(&args, "-hwaccel_output_format") < input_flag);
            prop_assert!(position(&args, "-y") > input_flag);
            prop_assert!(has_flag_with_value(&args, "-loglevel", "error"));
            prop_assert!(has_flag_with_value(&args, "-compression_level", &level.to_string()));
            prop_assert_eq!(args.last().unwrap(), &output);

            if let Some(profile) = vendor_profile(hint) {
                for extra in profile.extra_args {
                    prop_assert!(position(&args, extra) < input_flag);
                }
            }
        }
    }
}
