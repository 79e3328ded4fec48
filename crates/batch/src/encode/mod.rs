//! Encoding modules for wav2flac

pub mod ffmpeg;

pub use ffmpeg::{
    build, build_with_program, run, vendor_profile, CompressionLevel, EncodeError,
    EncoderInvocation, InvalidCompressionLevel, VendorProfile,
};
